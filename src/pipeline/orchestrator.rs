// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 流水线编排 (Orchestrator)
//! 职责: 检测器 → 归一化 → SequenceBuffer → 分类器 → softmax → PredictionSmoother → GestureResult

use std::sync::Arc;
use std::time::Instant;

use image::DynamicImage;
use tracing::{debug, info, warn};

use super::{FrameTiming, GestureResult, PipelineState};
use crate::config::PipelineConfig;
use crate::error::ConfigError;
use crate::landmarks::{LandmarkFrame, LandmarkNormalizer};
use crate::models::{LandmarkDetector, SequenceClassifier};
use crate::sequence::SequenceBuffer;
use crate::smoother::PredictionSmoother;
use crate::{argmax, softmax};

fn elapsed_ms(t: Instant) -> f64 {
    t.elapsed().as_secs_f64() * 1000.0
}

/// 运行统计
#[derive(Debug, Clone)]
pub struct PipelineStats {
    pub frames: u64,
    pub no_hand_frames: u64,
    pub error_frames: u64,
    pub buffer_resets: u64,
    pub current_fps: f64,

    count: u64,
    last: Instant,
}

impl Default for PipelineStats {
    fn default() -> Self {
        Self {
            frames: 0,
            no_hand_frames: 0,
            error_frames: 0,
            buffer_resets: 0,
            current_fps: 0.0,
            count: 0,
            last: Instant::now(),
        }
    }
}

impl PipelineStats {
    fn tick(&mut self) {
        self.frames += 1;
        self.count += 1;
        let now = Instant::now();
        if now.duration_since(self.last).as_secs() >= 1 {
            self.current_fps = self.count as f64 / now.duration_since(self.last).as_secs_f64();
            self.count = 0;
            self.last = now;
        }
    }
}

pub struct GesturePipeline<D: LandmarkDetector, C: SequenceClassifier> {
    config: Arc<PipelineConfig>,
    detector: D,
    classifier: C,
    normalizer: LandmarkNormalizer,
    buffer: SequenceBuffer,
    smoother: PredictionSmoother,

    // 跨帧状态
    missed_frames: u32,
    last_landmarks: Option<LandmarkFrame>,
    closed: bool,

    stats: PipelineStats,
}

impl<D: LandmarkDetector, C: SequenceClassifier> GesturePipeline<D, C> {
    /// 创建流水线, 模型句柄的所有权移交给流水线, 在 `close()` 时释放
    pub fn new(
        config: impl Into<Arc<PipelineConfig>>,
        detector: D,
        classifier: C,
    ) -> Result<Self, ConfigError> {
        let config = config.into();
        config.validate()?;

        if let Some(nc) = classifier.num_classes() {
            if nc != config.num_classes {
                return Err(ConfigError::invalid(
                    "num_classes",
                    format!(
                        "classifier reports {} classes, config has {}",
                        nc, config.num_classes
                    ),
                ));
            }
        }

        info!(
            sequence_length = config.sequence_length,
            smoothing_window = config.smoothing_window,
            num_classes = config.num_classes,
            "✅ 手势流水线就绪"
        );

        Ok(Self {
            normalizer: LandmarkNormalizer::from_config(&config),
            buffer: SequenceBuffer::new(config.sequence_length, config.features_per_frame),
            smoother: PredictionSmoother::new(config.smoothing_window),
            config,
            detector,
            classifier,
            missed_frames: 0,
            last_landmarks: None,
            closed: false,
            stats: PipelineStats::default(),
        })
    }

    /// 处理单帧, 总是返回一个结果, 不会把协作者的错误向外抛出
    pub fn process_frame(&mut self, image: &DynamicImage) -> GestureResult {
        let start_total = Instant::now();
        let frame_index = self.stats.frames;
        self.stats.tick();

        if self.closed {
            self.stats.error_frames += 1;
            return GestureResult::failed(
                frame_index,
                self.buffer.fill_ratio(),
                false,
                "pipeline is closed".to_string(),
            );
        }

        // 1. 手部关键点检测
        let t_detect = Instant::now();
        let detection = self.detector.detect(image).and_then(|found| match found {
            Some(landmarks) if !landmarks.is_finite() => {
                anyhow::bail!("non-finite landmark values")
            }
            other => Ok(other),
        });
        let detector_ms = elapsed_ms(t_detect);

        let landmarks = match detection {
            Ok(Some(landmarks)) => landmarks,
            Ok(None) => {
                let result = self.on_missed_frame(frame_index);
                return result.with_timing(FrameTiming {
                    detector_ms,
                    classifier_ms: None,
                    total_ms: elapsed_ms(start_total),
                });
            }
            Err(e) => {
                warn!(frame = frame_index, "❌ 手部检测失败: {:#}", e);
                self.stats.error_frames += 1;
                return GestureResult::failed(
                    frame_index,
                    self.buffer.fill_ratio(),
                    false,
                    format!("detector: {:#}", e),
                )
                .with_timing(FrameTiming {
                    detector_ms,
                    classifier_ms: None,
                    total_ms: elapsed_ms(start_total),
                });
            }
        };

        // 2. 归一化并写入缓冲 (原始关键点保留给外部使用, 如骨架叠加)
        self.missed_frames = 0;
        let features = self.normalizer.normalize_frame(&landmarks);
        self.last_landmarks = Some(landmarks);
        self.buffer.push(features);

        // 3. 缓冲未满: 继续收集
        let tensor = match self.buffer.flattened_snapshot() {
            Some(t) => t,
            None => {
                let progress = self.buffer.fill_ratio();
                debug!(frame = frame_index, progress, "collecting");
                return GestureResult::collecting(frame_index, progress).with_timing(FrameTiming {
                    detector_ms,
                    classifier_ms: None,
                    total_ms: elapsed_ms(start_total),
                });
            }
        };

        // 4. 序列分类
        let t_classify = Instant::now();
        let scores = self.classifier.infer(tensor.view());
        let classifier_ms = elapsed_ms(t_classify);
        let timing = |start_total: Instant| FrameTiming {
            detector_ms,
            classifier_ms: Some(classifier_ms),
            total_ms: elapsed_ms(start_total),
        };

        let (probabilities, instant_class, confidence) =
            match scores.and_then(|logits| self.score(logits)) {
                Ok(scored) => scored,
                Err(e) => {
                    warn!(frame = frame_index, "❌ 手势分类失败: {:#}", e);
                    self.stats.error_frames += 1;
                    return GestureResult::failed(
                        frame_index,
                        self.buffer.fill_ratio(),
                        true,
                        format!("classifier: {:#}", e),
                    )
                    .with_timing(timing(start_total));
                }
            };

        // 5. 平滑: 低置信度不参与投票
        let low_confidence = confidence < self.config.confidence_threshold;
        let (class_index, is_stable) = if low_confidence {
            (instant_class, false)
        } else {
            self.smoother.add_prediction(instant_class);
            let voted = self.smoother.majority_vote().unwrap_or(instant_class);
            (voted, self.smoother.is_stable())
        };

        let result = GestureResult {
            frame_index,
            state: PipelineState::Ready,
            label: Some(self.config.label(class_index)),
            class_index: Some(class_index),
            confidence,
            probabilities,
            hand_detected: true,
            buffer_progress: 1.0,
            is_stable,
            low_confidence,
            error: None,
            timing: timing(start_total),
        };

        if self.stats.frames % 60 == 0 {
            debug!(
                "🎯 手势: {} ({:.2}) | {:.1}ms/帧 | {:.1}fps (检测:{:.1}ms | 分类:{:.1}ms)",
                self.config.label(class_index),
                confidence,
                result.timing.total_ms,
                self.stats.current_fps,
                detector_ms,
                classifier_ms
            );
        }

        result
    }

    /// 本帧无手: 连续丢失超过容忍值时视为手势中断, 清空缓冲与投票历史
    fn on_missed_frame(&mut self, frame_index: u64) -> GestureResult {
        self.stats.no_hand_frames += 1;
        self.missed_frames += 1;
        let progress = self.buffer.fill_ratio();

        if self.missed_frames > self.config.missed_frame_tolerance {
            info!(
                frame = frame_index,
                missed = self.missed_frames,
                "⚠️ 连续丢失手部, 清空序列缓冲"
            );
            self.buffer.clear();
            self.smoother.clear();
            self.missed_frames = 0;
            self.stats.buffer_resets += 1;
        }

        GestureResult::no_hand(frame_index, progress)
    }

    /// logits → (概率, top1 类别, top1 概率)
    fn score(&self, logits: Vec<f32>) -> anyhow::Result<(Vec<f32>, usize, f32)> {
        if logits.len() != self.config.num_classes {
            anyhow::bail!(
                "expected {} scores, got {}",
                self.config.num_classes,
                logits.len()
            );
        }
        if logits.iter().any(|v| !v.is_finite()) {
            anyhow::bail!("non-finite score in {:?}", logits);
        }
        let probabilities = softmax(&logits);
        let (class, confidence) =
            argmax(&probabilities).ok_or_else(|| anyhow::anyhow!("empty probability vector"))?;
        Ok((probabilities, class, confidence))
    }

    /// 开始新的手势会话 (如切换摄像头)
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.smoother.clear();
        self.missed_frames = 0;
        self.last_landmarks = None;
        info!("🔄 流水线已重置");
    }

    /// 释放模型资源, 可重复调用
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.detector.close();
        self.classifier.close();
        self.closed = true;
        info!(
            frames = self.stats.frames,
            errors = self.stats.error_frames,
            "🔒 流水线已关闭"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// 最近一次检测到的原始关键点 (未归一化)
    pub fn last_landmarks(&self) -> Option<&LandmarkFrame> {
        self.last_landmarks.as_ref()
    }

    pub fn missed_frames(&self) -> u32 {
        self.missed_frames
    }

    pub fn buffer(&self) -> &SequenceBuffer {
        &self.buffer
    }

    pub fn smoother(&self) -> &PredictionSmoother {
        &self.smoother
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn summary(&self) {
        self.detector.summary();
        self.classifier.summary();
        self.config.print_summary();
    }
}

impl<D: LandmarkDetector, C: SequenceClassifier> Drop for GesturePipeline<D, C> {
    fn drop(&mut self) {
        self.close();
    }
}
