// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 播放会话控制 (打开 / 停止)
///
/// 一个会话 = 一个打开的视频 + 一个采集循环. 推理线程不属于会话,
/// 停止会话不会打断正在进行的推理, 计数显示也保持不变.
use crate::capture::{CaptureLoop, CaptureStats, Ticker, DEFAULT_INTERVAL};
use crate::error::Result;
use crate::frame::ViewSize;
use crate::mailbox::FrameMailbox;
use crate::source::{open_source, FrameSource};
use crate::surface::PresentationSurface;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

pub struct SessionController {
    mailbox: Arc<FrameMailbox>,
    original_view: ViewSize,
    ticker: Ticker,
    active: Option<CaptureLoop>,
    current: Option<PathBuf>,
}

impl SessionController {
    pub fn new(mailbox: Arc<FrameMailbox>, original_view: ViewSize, interval: Duration) -> Self {
        Self {
            mailbox,
            original_view,
            ticker: Ticker::new(interval),
            active: None,
            current: None,
        }
    }

    pub fn with_defaults(mailbox: Arc<FrameMailbox>) -> Self {
        Self::new(mailbox, ViewSize::new(640, 480), DEFAULT_INTERVAL)
    }

    /// 打开视频文件并开始播放; 打不开时保持当前状态
    pub fn open(&mut self, path: &Path) -> Result<()> {
        let source = open_source(path).map_err(|e| {
            warn!("⚠️ {}", e);
            e
        })?;
        self.open_with(source);
        self.current = Some(path.to_path_buf());
        info!("▶️ 开始播放: {}", path.display());
        Ok(())
    }

    /// 使用已经打开的视频开始新会话
    pub fn open_with(&mut self, source: Box<dyn FrameSource>) {
        if let Some(mut old) = self.active.take() {
            old.halt();
        }
        // 旧视频的待处理帧不再有意义
        self.mailbox.clear();
        self.active = Some(CaptureLoop::new(
            source,
            Arc::clone(&self.mailbox),
            self.original_view,
        ));
        self.current = None;
        self.ticker.reset();
    }

    /// 停止播放, 可重复调用
    pub fn stop(&mut self, surface: &mut dyn PresentationSurface) {
        self.mailbox.clear();
        match self.active.take() {
            Some(mut capture) => {
                capture.stop(surface);
                info!("⏹️ 停止播放");
            }
            None => {
                surface.clear_original();
                surface.clear_annotated();
            }
        }
        self.current = None;
    }

    /// 由显示循环每帧调用, 到期时执行一次采集
    pub fn tick(&mut self, surface: &mut dyn PresentationSurface) -> bool {
        self.tick_at(Instant::now(), surface)
    }

    pub fn tick_at(&mut self, now: Instant, surface: &mut dyn PresentationSurface) -> bool {
        let Some(capture) = self.active.as_mut() else {
            return false;
        };
        if !self.ticker.poll(now) {
            return false;
        }
        capture.tick(surface)
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn stats(&self) -> Option<CaptureStats> {
        self.active.as_ref().map(|c| c.stats())
    }
}
