// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 手势序列分类模型
//
// 输入:  [1, N, F] 归一化关键点序列
// 输出:  [1, C] 原始分数 (logits), softmax 由流水线完成

use anyhow::{bail, Result};
use ndarray::{ArrayView2, Axis};

use crate::config::PipelineConfig;
use crate::models::SequenceClassifier;
use crate::{OrtBackend, OrtConfig, OrtEP};

#[derive(Debug, Clone)]
pub struct GestureClassifierConfig {
    pub model: String,
    pub ep: OrtEP,
    pub input_name: String,
    pub output_name: String,
    pub profile: bool,
}

impl Default for GestureClassifierConfig {
    fn default() -> Self {
        Self {
            model: "models/gesture_classifier.onnx".to_string(),
            ep: OrtEP::CPU,
            input_name: "input".to_string(),
            output_name: "output".to_string(),
            profile: false,
        }
    }
}

pub struct GestureClassifier {
    engine: OrtBackend,
    sequence_length: usize,
    features: usize,
    nc: usize,
    profile: bool,
}

impl GestureClassifier {
    pub fn new(config: GestureClassifierConfig, pipeline: &PipelineConfig) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            input_name: config.input_name,
            output_names: vec![config.output_name],
            intra_threads: 1,
        })?;

        Ok(Self {
            engine,
            sequence_length: pipeline.sequence_length,
            features: pipeline.features_per_frame,
            nc: pipeline.num_classes,
            profile: config.profile,
        })
    }
}

impl SequenceClassifier for GestureClassifier {
    fn infer(&mut self, sequence: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        if sequence.dim() != (self.sequence_length, self.features) {
            bail!(
                "classifier expects [{}, {}] input, got {:?}",
                self.sequence_length,
                self.features,
                sequence.dim()
            );
        }

        // [N, F] → [1, N, F]
        let xs = sequence.insert_axis(Axis(0)).to_owned().into_dyn();
        let ys = self.engine.run(xs, self.profile)?;
        let logits: Vec<f32> = match ys.first() {
            Some(y) => y.iter().copied().collect(),
            None => bail!("classifier returned no output"),
        };
        if logits.len() != self.nc {
            bail!("classifier returned {} scores, expected {}", logits.len(), self.nc);
        }
        Ok(logits)
    }

    fn num_classes(&self) -> Option<usize> {
        Some(self.nc)
    }

    fn close(&mut self) {
        self.engine.close();
    }

    fn summary(&self) {
        println!("\n模型摘要:");
        println!("┌─────────────────────────────────────────┐");
        println!("│ Model: Gesture Sequence Classifier      │");
        println!(
            "│ Input: 1 x {:>3} x {:<3}                   │",
            self.sequence_length, self.features
        );
        println!("│ Classes: {:<3}                            │", self.nc);
        println!("└─────────────────────────────────────────┘");
    }
}
