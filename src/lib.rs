#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 流水线配置参数
pub mod error; // 配置错误类型
pub mod landmarks; // 手部关键点与归一化
pub mod models; // 检测器/分类器接口与具体实现
pub mod pipeline; // 逐帧处理状态机
pub mod sequence; // 定长帧序列缓冲
pub mod smoother; // 多数投票平滑

#[cfg(feature = "onnx")]
pub mod ort_backend;

pub use crate::config::{Args, PipelineConfig};
pub use crate::error::ConfigError;
pub use crate::landmarks::{Landmark3D, LandmarkFrame, LandmarkNormalizer, NUM_LANDMARKS};
pub use crate::models::{LandmarkDetector, SequenceClassifier};
pub use crate::pipeline::{FrameTiming, GesturePipeline, GestureResult, PipelineState};
pub use crate::sequence::SequenceBuffer;
pub use crate::smoother::PredictionSmoother;

#[cfg(feature = "onnx")]
pub use crate::models::{GestureClassifier, HandLandmarker};
#[cfg(feature = "onnx")]
pub use crate::ort_backend::{OrtBackend, OrtConfig, OrtEP};

/// Numerically stable softmax: the max logit is subtracted before exponentiating.
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    if logits.is_empty() {
        return Vec::new();
    }
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the largest element; ties resolve to the lowest index.
pub fn argmax(xs: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &x) in xs.iter().enumerate() {
        match best {
            Some((_, b)) if x <= b => {}
            _ => best = Some((i, x)),
        }
    }
    best
}

/// 取概率最高的 k 个类别 (降序)
pub fn topk(probs: &[f32], k: usize) -> Vec<(usize, f32)> {
    let mut ranked = probs.iter().copied().enumerate().collect::<Vec<_>>();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}

pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S",
        delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_softmax_uniform() {
        let probs = softmax(&[1.0, 1.0, 1.0]);
        for p in &probs {
            assert_abs_diff_eq!(*p, 1.0 / 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_softmax_overflow_safe() {
        let probs = softmax(&[1000.0, 0.0, 0.0]);
        assert!(probs.iter().all(|p| p.is_finite()));
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-4);
        assert!(probs[0] > 0.999);
    }

    #[test]
    fn test_argmax_tie_lowest_index() {
        assert_eq!(argmax(&[0.2, 0.4, 0.4]), Some((1, 0.4)));
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn test_topk() {
        let top = topk(&[0.1, 0.7, 0.2], 2);
        assert_eq!(top, vec![(1, 0.7), (2, 0.2)]);
    }
}
