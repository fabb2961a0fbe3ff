// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 视频车辆计数流水线
//!
//! ```text
//! FrameSource → CaptureLoop → { 原始画面, FrameMailbox }
//!                                          ↓
//!                                  InferenceWorker → ResultChannel → Dispatcher → 检测画面 + 计数日志
//! ```
pub mod capture; // 采集循环与节拍器
pub mod config; // JSON配置
pub mod detector; // 检测模型接口与实现
pub mod dispatch; // 推理结果回传
pub mod error;
pub mod frame; // 帧类型与等比缩放
pub mod history; // 最近打开的视频
pub mod mailbox; // 单槽帧邮箱
pub mod session; // 打开 / 停止
pub mod source; // 视频输入
pub mod surface; // 显示层接口
pub mod telemetry; // 日志
pub mod worker; // 后台推理线程

pub use crate::capture::{CaptureLoop, CaptureStats, Ticker};
pub use crate::config::AppConfig;
pub use crate::detector::{count_label, BBox, Detection, Detector, Prediction};
pub use crate::dispatch::{result_channel, Dispatcher, InferenceReport, ResultSender};
pub use crate::error::{PipelineError, Result};
pub use crate::frame::{Frame, ViewSize};
pub use crate::mailbox::FrameMailbox;
pub use crate::session::SessionController;
pub use crate::source::{open_source, FrameSource};
pub use crate::surface::{PresentationSurface, RecordingSurface};
pub use crate::worker::{InferenceWorker, WorkerConfig, WorkerHandle};
