// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 手势识别流水线 (Gesture Pipeline)
///
/// 每帧: 检测 → 归一化 → 序列缓冲 → 分类 → 平滑 → GestureResult
///
/// 状态每帧重新计算, 不锁存:
/// - NoHand:     本帧无手
/// - Collecting: 有手, 缓冲未满
/// - Ready:      缓冲已满, 本帧执行了分类
/// - Error:      检测器/分类器失败, 状态保持不变
pub mod orchestrator;

use serde::Serialize;

pub use orchestrator::{GesturePipeline, PipelineStats};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineState {
    NoHand,
    Collecting,
    Ready,
    Error,
}

/// 单帧耗时 (毫秒)
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct FrameTiming {
    pub detector_ms: f64,
    pub classifier_ms: Option<f64>, // 未执行分类时为 None
    pub total_ms: f64,
}

/// 流水线输出 (流水线 → 展示层), 每帧一个
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GestureResult {
    pub frame_index: u64,
    pub state: PipelineState,
    pub label: Option<String>,
    pub class_index: Option<usize>,
    pub confidence: f32,         // 瞬时 top1 概率
    pub probabilities: Vec<f32>, // 完整概率分布, 仅 Ready 状态非空
    pub hand_detected: bool,
    pub buffer_progress: f32, // 缓冲填充比例 0-1
    pub is_stable: bool,
    pub low_confidence: bool, // 低于阈值, 未参与投票
    pub error: Option<String>,
    pub timing: FrameTiming,
}

impl GestureResult {
    fn empty(frame_index: u64, state: PipelineState, buffer_progress: f32) -> Self {
        Self {
            frame_index,
            state,
            label: None,
            class_index: None,
            confidence: 0.0,
            probabilities: Vec::new(),
            hand_detected: false,
            buffer_progress,
            is_stable: false,
            low_confidence: false,
            error: None,
            timing: FrameTiming::default(),
        }
    }

    pub(crate) fn no_hand(frame_index: u64, buffer_progress: f32) -> Self {
        Self::empty(frame_index, PipelineState::NoHand, buffer_progress)
    }

    pub(crate) fn collecting(frame_index: u64, buffer_progress: f32) -> Self {
        Self {
            hand_detected: true,
            ..Self::empty(frame_index, PipelineState::Collecting, buffer_progress)
        }
    }

    pub(crate) fn failed(
        frame_index: u64,
        buffer_progress: f32,
        hand_detected: bool,
        error: String,
    ) -> Self {
        Self {
            hand_detected,
            error: Some(error),
            ..Self::empty(frame_index, PipelineState::Error, buffer_progress)
        }
    }

    pub(crate) fn with_timing(mut self, timing: FrameTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn is_error(&self) -> bool {
        self.state == PipelineState::Error
    }

    /// 概率最高的 k 个类别
    pub fn topk(&self, k: usize) -> Vec<(usize, f32)> {
        crate::topk(&self.probabilities, k)
    }
}
