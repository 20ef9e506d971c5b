// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 配置错误类型
//!
//! 契约违规 (向量长度错误、容量为0) 直接 panic, 不在这里表示;
//! 检测器/分类器的运行时失败使用 `anyhow::Result`, 由流水线逐帧捕获。

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    /// 字段取值非法
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn invalid<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
