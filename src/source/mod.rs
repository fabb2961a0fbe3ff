// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频输入 (Video Input)
///
/// 按需逐帧解码, 支持回到开头循环播放
/// - GifSource:    GIF 动画 (纯Rust, 始终可用)
/// - FfmpegSource: mp4/avi 等视频文件 (需要 `ffmpeg` 功能)
pub mod gif;

#[cfg(feature = "ffmpeg")]
pub mod ffmpeg;

pub use self::gif::GifSource;

#[cfg(feature = "ffmpeg")]
pub use self::ffmpeg::FfmpegSource;

use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use std::path::Path;

/// 顺序帧解码器
pub trait FrameSource {
    /// 读取下一帧; `Ok(None)` 表示到达视频结尾
    fn read_next(&mut self) -> Result<Option<Frame>>;

    /// 回到第一帧
    fn seek_to_start(&mut self) -> Result<()>;

    /// 释放解码资源, 之后的读取都会失败
    fn close(&mut self);

    /// 视频分辨率 (未知时为 None)
    fn dimensions(&self) -> Option<(u32, u32)> {
        None
    }
}

/// 可选择的视频类型 (文件选择框过滤用)
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "avi", "mkv", "mov", "gif"];

/// 按扩展名打开视频文件
pub fn open_source(path: &Path) -> Result<Box<dyn FrameSource>> {
    let display = path.display().to_string();
    if !path.is_file() {
        return Err(PipelineError::unavailable(display, "file not found"));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    if ext == "gif" {
        return Ok(Box::new(GifSource::open(path)?));
    }

    open_with_ffmpeg(path, &display)
}

#[cfg(feature = "ffmpeg")]
fn open_with_ffmpeg(path: &Path, _display: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(FfmpegSource::open(path)?))
}

#[cfg(not(feature = "ffmpeg"))]
fn open_with_ffmpeg(_path: &Path, display: &str) -> Result<Box<dyn FrameSource>> {
    Err(PipelineError::unavailable(
        display,
        "only GIF is supported without the `ffmpeg` feature",
    ))
}
