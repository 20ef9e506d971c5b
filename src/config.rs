// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 流水线配置 - 启动时确定, 之后只读
//!
//! 通过构造函数注入每个组件, 没有全局单例。可从JSON文件加载。

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use clap::Parser;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;
use crate::landmarks::NUM_LANDMARKS;

/// 每帧特征数 (21个关键点 × xyz)
pub const FEATURES_PER_FRAME: usize = NUM_LANDMARKS * 3;

/// 手势识别流水线参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    // === 序列缓冲 ===
    pub sequence_length: usize,    // 送入分类器的帧数 N
    pub features_per_frame: usize, // 每帧特征数 F

    // === 分类 ===
    pub num_classes: usize,        // 手势类别数 C
    pub confidence_threshold: f32, // 低于该概率不参与投票

    // === 平滑 ===
    pub smoothing_window: usize, // 多数投票窗口 M

    // === 归一化 ===
    pub min_hand_scale: f32, // 手部尺度下限 (防止除零)
    pub clip_range: f32,     // 裁剪范围 [-clip, clip]

    // === 丢帧容忍 ===
    pub missed_frame_tolerance: u32, // 连续丢失超过该值清空缓冲

    // === 检测器透传参数 ===
    pub min_detection_confidence: f32,
    pub min_tracking_confidence: f32,

    /// 类别索引 → 标签
    pub labels: BTreeMap<usize, String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let labels = ["open_palm", "fist", "pointing"]
            .iter()
            .enumerate()
            .map(|(i, s)| (i, s.to_string()))
            .collect();

        Self {
            sequence_length: 15,
            features_per_frame: FEATURES_PER_FRAME,
            num_classes: 3,
            confidence_threshold: 0.6,
            smoothing_window: 5,
            min_hand_scale: 0.01,
            clip_range: 2.0,
            missed_frame_tolerance: 3,
            min_detection_confidence: 0.5,
            min_tracking_confidence: 0.5,
            labels,
        }
    }
}

impl PipelineConfig {
    /// 检查所有参数约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sequence_length == 0 {
            return Err(ConfigError::invalid("sequence_length", "must be > 0"));
        }
        if self.features_per_frame != FEATURES_PER_FRAME {
            return Err(ConfigError::invalid(
                "features_per_frame",
                format!("must be {} (21 landmarks x 3)", FEATURES_PER_FRAME),
            ));
        }
        if self.num_classes == 0 {
            return Err(ConfigError::invalid("num_classes", "must be > 0"));
        }
        if self.smoothing_window == 0 {
            return Err(ConfigError::invalid("smoothing_window", "must be > 0"));
        }
        unit_range("confidence_threshold", self.confidence_threshold)?;
        unit_range("min_detection_confidence", self.min_detection_confidence)?;
        unit_range("min_tracking_confidence", self.min_tracking_confidence)?;
        positive("min_hand_scale", self.min_hand_scale)?;
        positive("clip_range", self.clip_range)?;
        if let Some(&index) = self.labels.keys().find(|&&i| i >= self.num_classes) {
            return Err(ConfigError::invalid(
                "labels",
                format!("index {} out of range for {} classes", index, self.num_classes),
            ));
        }
        Ok(())
    }

    /// 类别标签, 未配置的索引显示为 `class_<i>`
    pub fn label(&self, index: usize) -> String {
        self.labels
            .get(&index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index))
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// 从JSON文件加载配置 (缺省字段取默认值)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = Self::from_json_str(&fs::read_to_string(path)?)?;
        info!("✅ 配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!(
            sequence_length = self.sequence_length,
            num_classes = self.num_classes,
            confidence_threshold = self.confidence_threshold,
            smoothing_window = self.smoothing_window,
            missed_frame_tolerance = self.missed_frame_tolerance,
            "🎛️  当前流水线配置"
        );
    }
}

fn unit_range(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{} not in [0, 1]", value)))
    }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{} must be > 0", value)))
    }
}

/// 命令行参数
#[derive(Parser, Clone, Debug)]
#[command(author, version, about = "手势识别 - 图片序列离线推理", long_about = None)]
pub struct Args {
    /// 流水线配置文件 (JSON)
    #[arg(long)]
    pub config: Option<String>,

    /// 手部关键点 ONNX 模型
    #[arg(long, default_value = "models/hand_landmark.onnx")]
    pub detector: String,

    /// 手势序列分类 ONNX 模型
    #[arg(long, default_value = "models/gesture_classifier.onnx")]
    pub classifier: String,

    /// 输入图片目录 (按文件名排序作为帧序)
    #[arg(long, required = true)]
    pub source: String,

    /// 使用 CUDA
    #[arg(long)]
    pub cuda: bool,

    /// CUDA 设备号
    #[arg(long, default_value_t = 0)]
    pub device_id: i32,

    /// 以JSON格式逐帧输出结果
    #[arg(long)]
    pub json: bool,

    /// 结果保存路径 (JSON Lines)
    #[arg(long)]
    pub output: Option<String>,

    /// 帧队列长度
    #[arg(long, default_value_t = 8)]
    pub queue: usize,

    /// 队列满时丢弃新帧 (模拟实时相机)
    #[arg(long)]
    pub drop_frames: bool,

    /// 打印每帧耗时
    #[arg(long)]
    pub profile: bool,
}
