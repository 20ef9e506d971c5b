// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
// 手部关键点模型 (MediaPipe hand_landmark 导出的 ONNX)
//
// 输入:  [1, S, S, 3] RGB, 0-1
// 输出:  landmarks [1, 63] (像素坐标, 相对于 S×S 输入)
//        presence  [1, 1]  (手存在置信度)

use anyhow::{bail, Result};
use image::{imageops::FilterType, DynamicImage, GenericImageView};
use ndarray::{Array, IxDyn};
use tracing::debug;

use crate::config::{PipelineConfig, FEATURES_PER_FRAME};
use crate::landmarks::LandmarkFrame;
use crate::models::LandmarkDetector;
use crate::{OrtBackend, OrtConfig, OrtEP};

#[derive(Debug, Clone)]
pub struct HandLandmarkerConfig {
    pub model: String,
    pub ep: OrtEP,
    pub input_size: u32,
    pub input_name: String,
    pub landmarks_output: String,
    pub presence_output: String,
    /// presence 输出为 logit 时需要先做 sigmoid
    pub presence_is_logit: bool,
    pub profile: bool,
}

impl Default for HandLandmarkerConfig {
    fn default() -> Self {
        Self {
            model: "models/hand_landmark.onnx".to_string(),
            ep: OrtEP::CPU,
            input_size: 224,
            input_name: "input_1".to_string(),
            landmarks_output: "Identity".to_string(),
            presence_output: "Identity_1".to_string(),
            presence_is_logit: false,
            profile: false,
        }
    }
}

pub struct HandLandmarker {
    engine: OrtBackend,
    input_size: u32,
    presence_is_logit: bool,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    /// 上一帧是否检测到手 (决定使用检测阈值还是跟踪阈值)
    tracking: bool,
    profile: bool,
}

impl HandLandmarker {
    pub fn new(config: HandLandmarkerConfig, pipeline: &PipelineConfig) -> Result<Self> {
        let engine = OrtBackend::build(OrtConfig {
            f: config.model,
            ep: config.ep,
            input_name: config.input_name,
            output_names: vec![config.landmarks_output, config.presence_output],
            intra_threads: 1,
        })?;

        Ok(Self {
            engine,
            input_size: config.input_size,
            presence_is_logit: config.presence_is_logit,
            min_detection_confidence: pipeline.min_detection_confidence,
            min_tracking_confidence: pipeline.min_tracking_confidence,
            tracking: false,
            profile: config.profile,
        })
    }

    pub fn preprocess(&self, image: &DynamicImage) -> Array<f32, IxDyn> {
        let size = self.input_size;
        let resized = image.resize_exact(size, size, FilterType::Triangle);
        let mut ys = Array::zeros((1, size as usize, size as usize, 3)).into_dyn();
        for (x, y, rgba) in resized.pixels() {
            let (x, y) = (x as usize, y as usize);
            let [r, g, b, _] = rgba.0;
            ys[[0, y, x, 0]] = (r as f32) / 255.0;
            ys[[0, y, x, 1]] = (g as f32) / 255.0;
            ys[[0, y, x, 2]] = (b as f32) / 255.0;
        }
        ys
    }

    fn threshold(&self) -> f32 {
        if self.tracking {
            self.min_tracking_confidence
        } else {
            self.min_detection_confidence
        }
    }
}

/// 像素坐标 → 单位化坐标 (z 与 x 使用同一尺度)
pub fn decode_landmarks(raw: &[f32], input_size: u32) -> Result<LandmarkFrame> {
    if raw.len() != FEATURES_PER_FRAME {
        bail!(
            "hand landmark output has {} values, expected {}",
            raw.len(),
            FEATURES_PER_FRAME
        );
    }
    if let Some(i) = raw.iter().position(|v| !v.is_finite()) {
        bail!("hand landmark output has non-finite value {} at {}", raw[i], i);
    }
    let s = input_size as f32;
    Ok(LandmarkFrame::from_flat(raw.iter().map(|v| v / s).collect()))
}

pub fn presence_score(raw: f32, is_logit: bool) -> f32 {
    if is_logit {
        1.0 / (1.0 + (-raw).exp())
    } else {
        raw
    }
}

impl LandmarkDetector for HandLandmarker {
    fn detect(&mut self, image: &DynamicImage) -> Result<Option<LandmarkFrame>> {
        let xs = self.preprocess(image);
        let ys = self.engine.run(xs, self.profile)?;
        let (landmarks, presence) = match ys.as_slice() {
            [l, p, ..] => (l, p),
            _ => bail!("hand landmark model returned {} outputs", ys.len()),
        };

        let score = match presence.iter().next() {
            Some(&v) => presence_score(v, self.presence_is_logit),
            None => bail!("hand landmark presence output is empty"),
        };

        if score < self.threshold() {
            debug!(score, threshold = self.threshold(), "no hand");
            self.tracking = false;
            return Ok(None);
        }

        let raw: Vec<f32> = landmarks.iter().copied().collect();
        let frame = decode_landmarks(&raw, self.input_size)?;
        self.tracking = true;
        Ok(Some(frame))
    }

    fn close(&mut self) {
        self.engine.close();
        self.tracking = false;
    }

    fn summary(&self) {
        let (w, h) = (self.input_size, self.input_size);
        println!("\n模型摘要:");
        println!("┌─────────────────────────────────────────┐");
        println!("│ Model: Hand Landmark                    │");
        println!("│ Input: {:>4} x {:<4}                     │", w, h);
        println!("│ Keypoints: 21                           │");
        println!("└─────────────────────────────────────────┘");
    }
}
