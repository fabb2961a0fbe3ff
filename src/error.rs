// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 流水线错误类型
/// Pipeline error kinds. None of them is fatal to the process.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// 视频无法打开 (路径错误 / 不支持的编码)
    #[error("video source unavailable: {path}: {reason}")]
    SourceUnavailable { path: String, reason: String },

    /// 播放中途解码失败, 跳过本次tick
    #[error("decode error: {0}")]
    Decode(String),

    /// 解码线程还没有送来下一帧, 跳过本次tick (不算失败)
    #[error("next frame not decoded yet")]
    NotReady,

    /// 检测模型执行失败, 丢弃该帧
    #[error("inference error: {0}")]
    Inference(String),

    #[error("config error: {0}")]
    Config(String),
}

impl PipelineError {
    pub fn unavailable(path: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::SourceUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
