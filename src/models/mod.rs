// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 推理协作者统一接口与实现
///
/// # 架构说明
///
/// 流水线只依赖两个黑盒:
/// - **LandmarkDetector**: 图片 → 0 或 1 组 21 个手部关键点
/// - **SequenceClassifier**: [N, F] 特征序列 → C 个原始分数 (logits)
///
/// ## ONNX 实现 (feature `onnx`)
/// - **HandLandmarker**: MediaPipe 手部关键点模型, 文件: `hand_landmarker.rs`
/// - **GestureClassifier**: 时序手势分类模型, 文件: `gesture_classifier.rs`
///
/// ## 使用示例
/// ```ignore
/// use gesture_rs::models::{GestureClassifier, HandLandmarker};
/// use gesture_rs::{GesturePipeline, PipelineConfig};
///
/// let config = PipelineConfig::default();
/// let detector = HandLandmarker::new(detector_cfg, &config)?;
/// let classifier = GestureClassifier::new(classifier_cfg, &config)?;
/// let mut pipeline = GesturePipeline::new(config, detector, classifier);
/// let result = pipeline.process_frame(&image);
/// ```
use anyhow::Result;
use image::DynamicImage;
use ndarray::ArrayView2;

use crate::landmarks::LandmarkFrame;

/// 手部关键点检测器
pub trait LandmarkDetector {
    /// 检测一帧图片
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - 检测到手, 21 个关键点 (单位化图像坐标)
    /// * `Ok(None)` - 本帧无手, 属于正常结果
    /// * `Err(_)` - 模型/会话失败
    fn detect(&mut self, image: &DynamicImage) -> Result<Option<LandmarkFrame>>;

    /// 释放模型资源, 可重复调用
    fn close(&mut self) {}

    /// 打印模型信息
    fn summary(&self) {}
}

/// 手势序列分类器
pub trait SequenceClassifier {
    /// 推理: [N, F] 特征序列 → C 个 logits
    fn infer(&mut self, sequence: ArrayView2<'_, f32>) -> Result<Vec<f32>>;

    /// 模型声明的类别数 (未知时返回 None)
    fn num_classes(&self) -> Option<usize> {
        None
    }

    /// 释放模型资源, 可重复调用
    fn close(&mut self) {}

    /// 打印模型信息
    fn summary(&self) {}
}

impl<T: LandmarkDetector + ?Sized> LandmarkDetector for Box<T> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Option<LandmarkFrame>> {
        (**self).detect(image)
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn summary(&self) {
        (**self).summary()
    }
}

impl<T: SequenceClassifier + ?Sized> SequenceClassifier for Box<T> {
    fn infer(&mut self, sequence: ArrayView2<'_, f32>) -> Result<Vec<f32>> {
        (**self).infer(sequence)
    }

    fn num_classes(&self) -> Option<usize> {
        (**self).num_classes()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn summary(&self) {
        (**self).summary()
    }
}

#[cfg(feature = "onnx")]
pub mod gesture_classifier;
#[cfg(feature = "onnx")]
pub mod hand_landmarker;

#[cfg(feature = "onnx")]
pub use gesture_classifier::{GestureClassifier, GestureClassifierConfig};
#[cfg(feature = "onnx")]
pub use hand_landmarker::{HandLandmarker, HandLandmarkerConfig};
