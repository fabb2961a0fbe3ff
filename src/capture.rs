// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 采集循环 (显示线程)
///
/// 每个 tick: 读帧 → 显示原始画面 → 尝试放入邮箱
/// ```text
/// FrameSource ──read──▶ CaptureLoop ──show──▶ 原始画面
///                            │
///                        try_put
///                            ▼
///                       FrameMailbox ──▶ InferenceWorker
/// ```
use crate::error::PipelineError;
use crate::frame::{scale_to_fit, Frame, ViewSize};
use crate::mailbox::FrameMailbox;
use crate::source::FrameSource;
use crate::surface::PresentationSurface;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// 默认采集周期
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(30);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub ticks: u64,
    pub shown: u64,
    pub offered: u64,
    /// 推理线程忙, 邮箱未空
    pub skipped_busy: u64,
    pub rewinds: u64,
    pub failed_reads: u64,
    /// 解码跟不上采集节拍
    pub starved: u64,
}

pub struct CaptureLoop {
    source: Box<dyn FrameSource>,
    mailbox: Arc<FrameMailbox>,
    view: ViewSize,
    running: bool,
    stats: CaptureStats,
}

impl CaptureLoop {
    pub fn new(source: Box<dyn FrameSource>, mailbox: Arc<FrameMailbox>, view: ViewSize) -> Self {
        Self {
            source,
            mailbox,
            view,
            running: true,
            stats: CaptureStats::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn stats(&self) -> CaptureStats {
        self.stats
    }

    /// 执行一次采集; 返回本次是否显示了新帧
    pub fn tick(&mut self, surface: &mut dyn PresentationSurface) -> bool {
        if !self.running {
            return false;
        }
        self.stats.ticks += 1;

        let Some(frame) = self.next_frame() else {
            return false;
        };

        let shown = scale_to_fit(frame.image(), self.view);
        surface.show_original(&shown);
        self.stats.shown += 1;

        let id = frame.id();
        if self.mailbox.try_put(frame) {
            self.stats.offered += 1;
        } else {
            self.stats.skipped_busy += 1;
            debug!("邮箱已满, 跳过帧 #{}", id);
        }
        true
    }

    /// 读取下一帧, 到结尾时回到开头再读一次
    fn next_frame(&mut self) -> Option<Frame> {
        match self.source.read_next() {
            Ok(Some(frame)) => return Some(frame),
            Ok(None) => {}
            Err(e) => {
                self.skip_read(e);
                return None;
            }
        }

        if let Err(e) = self.source.seek_to_start() {
            self.stats.failed_reads += 1;
            warn!("⚠️ 回到视频开头失败: {}", e);
            return None;
        }
        self.stats.rewinds += 1;
        debug!("🔁 视频循环播放");

        match self.source.read_next() {
            Ok(Some(frame)) => Some(frame),
            Ok(None) => {
                self.stats.failed_reads += 1;
                warn!("⚠️ 视频没有可读的帧");
                None
            }
            Err(e) => {
                self.skip_read(e);
                None
            }
        }
    }

    fn skip_read(&mut self, e: PipelineError) {
        if let PipelineError::NotReady = e {
            self.stats.starved += 1;
            return;
        }
        self.stats.failed_reads += 1;
        warn!("⚠️ 读帧失败, 跳过本次: {}", e);
    }

    /// 停止采集并关闭视频, 画面保持不变
    pub fn halt(&mut self) {
        if self.running {
            self.running = false;
            self.source.close();
        }
    }

    /// 停止采集: 关闭视频并清空两个画面
    pub fn stop(&mut self, surface: &mut dyn PresentationSurface) {
        self.halt();
        surface.clear_original();
        surface.clear_annotated();
    }
}

/// 固定周期节拍器, 由显示循环逐帧轮询
///
/// At most one tick is reported per poll. After a stall the schedule
/// restarts from `now` instead of bursting the missed ticks.
#[derive(Clone, Debug)]
pub struct Ticker {
    period: Duration,
    next_due: Option<Instant>,
}

impl Ticker {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_millis(1)),
            next_due: None,
        }
    }

    pub fn reset(&mut self) {
        self.next_due = None;
    }

    pub fn poll(&mut self, now: Instant) -> bool {
        match self.next_due {
            None => {
                self.next_due = Some(now + self.period);
                true
            }
            Some(due) if now >= due => {
                let next = due + self.period;
                // 落后超过一个周期时重新对齐
                self.next_due = Some(if next <= now { now + self.period } else { next });
                true
            }
            Some(_) => false,
        }
    }
}

impl Default for Ticker {
    fn default() -> Self {
        Self::new(DEFAULT_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::surface::RecordingSurface;
    use image::RgbImage;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// 单帧视频, 每次读到结尾都需要回放
    struct OneFrameSource {
        reads: Arc<AtomicUsize>,
        at_end: bool,
        next_id: u64,
    }

    impl FrameSource for OneFrameSource {
        fn read_next(&mut self) -> Result<Option<Frame>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            if self.at_end {
                return Ok(None);
            }
            self.at_end = true;
            self.next_id += 1;
            Ok(Some(Frame::new(self.next_id, RgbImage::new(64, 32))))
        }

        fn seek_to_start(&mut self) -> Result<()> {
            self.at_end = false;
            Ok(())
        }

        fn close(&mut self) {}
    }

    /// 前 `fail` 次读取失败
    struct FlakySource {
        fail: usize,
        next_id: u64,
    }

    impl FrameSource for FlakySource {
        fn read_next(&mut self) -> Result<Option<Frame>> {
            if self.fail > 0 {
                self.fail -= 1;
                return Err(PipelineError::Decode("corrupt packet".into()));
            }
            self.next_id += 1;
            Ok(Some(Frame::new(self.next_id, RgbImage::new(8, 8))))
        }

        fn seek_to_start(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    struct EmptySource;

    impl FrameSource for EmptySource {
        fn read_next(&mut self) -> Result<Option<Frame>> {
            Ok(None)
        }

        fn seek_to_start(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    /// 到结尾后无法回到开头
    struct BrokenSeekSource;

    impl FrameSource for BrokenSeekSource {
        fn read_next(&mut self) -> Result<Option<Frame>> {
            Ok(None)
        }

        fn seek_to_start(&mut self) -> Result<()> {
            Err(PipelineError::Decode("cannot reopen".into()))
        }

        fn close(&mut self) {}
    }

    /// 前 `pending` 次读取时解码线程还没有出帧
    struct WarmingSource {
        pending: usize,
    }

    impl FrameSource for WarmingSource {
        fn read_next(&mut self) -> Result<Option<Frame>> {
            if self.pending > 0 {
                self.pending -= 1;
                return Err(PipelineError::NotReady);
            }
            Ok(Some(Frame::new(1, RgbImage::new(8, 8))))
        }

        fn seek_to_start(&mut self) -> Result<()> {
            Ok(())
        }

        fn close(&mut self) {}
    }

    fn one_frame() -> (Box<dyn FrameSource>, Arc<AtomicUsize>) {
        let reads = Arc::new(AtomicUsize::new(0));
        let src = OneFrameSource {
            reads: Arc::clone(&reads),
            at_end: false,
            next_id: 0,
        };
        (Box::new(src), reads)
    }

    #[test]
    fn test_one_frame_video_loops() {
        let (src, reads) = one_frame();
        let mailbox = Arc::new(FrameMailbox::new());
        let mut capture = CaptureLoop::new(src, Arc::clone(&mailbox), ViewSize::new(32, 32));
        let mut surface = RecordingSurface::new();

        let n = 10;
        for _ in 0..n {
            mailbox.clear();
            assert!(capture.tick(&mut surface));
        }

        assert_eq!(surface.original_shown, n);
        assert!(reads.load(Ordering::SeqCst) >= n);
        let stats = capture.stats();
        assert_eq!(stats.shown, n as u64);
        assert_eq!(stats.rewinds, n as u64 - 1);
        // 显示图像按比例缩放
        assert_eq!(surface.original.as_ref().map(|i| i.dimensions()), Some((32, 16)));
    }

    #[test]
    fn test_busy_mailbox_is_not_overwritten() {
        let (src, _) = one_frame();
        let mailbox = Arc::new(FrameMailbox::new());
        let mut capture = CaptureLoop::new(src, Arc::clone(&mailbox), ViewSize::new(64, 32));
        let mut surface = RecordingSurface::new();

        for _ in 0..5 {
            capture.tick(&mut surface);
            assert!(mailbox.len() <= 1);
        }

        assert_eq!(mailbox.pending_id(), Some(1));
        let stats = capture.stats();
        assert_eq!(stats.offered, 1);
        assert_eq!(stats.skipped_busy, 4);
        assert_eq!(surface.original_shown, 5);
    }

    #[test]
    fn test_decode_error_skips_tick() {
        let src = Box::new(FlakySource { fail: 2, next_id: 0 });
        let mailbox = Arc::new(FrameMailbox::new());
        let mut capture = CaptureLoop::new(src, Arc::clone(&mailbox), ViewSize::new(8, 8));
        let mut surface = RecordingSurface::new();

        assert!(!capture.tick(&mut surface));
        assert!(!capture.tick(&mut surface));
        assert_eq!(surface.original_shown, 0);
        assert!(mailbox.is_empty());

        assert!(capture.tick(&mut surface));
        assert_eq!(surface.original_shown, 1);
        assert_eq!(capture.stats().failed_reads, 2);
    }

    #[test]
    fn test_empty_video_is_noop() {
        let mailbox = Arc::new(FrameMailbox::new());
        let mut capture = CaptureLoop::new(Box::new(EmptySource), mailbox, ViewSize::new(8, 8));
        let mut surface = RecordingSurface::new();
        assert!(!capture.tick(&mut surface));
        assert_eq!(surface.original_shown, 0);
    }

    #[test]
    fn test_failed_rewind_skips_tick() {
        let mailbox = Arc::new(FrameMailbox::new());
        let mut capture =
            CaptureLoop::new(Box::new(BrokenSeekSource), Arc::clone(&mailbox), ViewSize::new(8, 8));
        let mut surface = RecordingSurface::new();

        assert!(!capture.tick(&mut surface));
        let stats = capture.stats();
        assert_eq!(stats.failed_reads, 1);
        assert_eq!(stats.rewinds, 0);
        assert_eq!(surface.original_shown, 0);
        assert!(mailbox.is_empty());
        assert!(capture.is_running());

        // 下一次tick照常尝试
        assert!(!capture.tick(&mut surface));
        assert_eq!(capture.stats().failed_reads, 2);
    }

    #[test]
    fn test_slow_decoder_skips_quietly() {
        let mailbox = Arc::new(FrameMailbox::new());
        let src = Box::new(WarmingSource { pending: 2 });
        let mut capture = CaptureLoop::new(src, Arc::clone(&mailbox), ViewSize::new(8, 8));
        let mut surface = RecordingSurface::new();

        assert!(!capture.tick(&mut surface));
        assert!(!capture.tick(&mut surface));
        assert!(capture.tick(&mut surface));

        let stats = capture.stats();
        assert_eq!(stats.starved, 2);
        assert_eq!(stats.failed_reads, 0);
        assert_eq!(stats.rewinds, 0);
        assert_eq!(surface.original_shown, 1);
        assert_eq!(mailbox.pending_id(), Some(1));
    }

    #[test]
    fn test_stopped_loop_does_nothing() {
        let (src, reads) = one_frame();
        let mailbox = Arc::new(FrameMailbox::new());
        let mut capture = CaptureLoop::new(src, mailbox, ViewSize::new(8, 8));
        let mut surface = RecordingSurface::new();

        capture.tick(&mut surface);
        capture.stop(&mut surface);
        let before = reads.load(Ordering::SeqCst);

        assert!(!capture.tick(&mut surface));
        assert!(!capture.is_running());
        assert_eq!(reads.load(Ordering::SeqCst), before);
        assert!(surface.is_cleared());
    }

    #[test]
    fn test_ticker_period() {
        let t0 = Instant::now();
        let mut ticker = Ticker::new(Duration::from_millis(30));

        assert!(ticker.poll(t0));
        assert!(!ticker.poll(t0 + Duration::from_millis(10)));
        assert!(ticker.poll(t0 + Duration::from_millis(30)));
        assert!(!ticker.poll(t0 + Duration::from_millis(45)));
        assert!(ticker.poll(t0 + Duration::from_millis(61)));
    }

    #[test]
    fn test_ticker_does_not_burst_after_stall() {
        let t0 = Instant::now();
        let mut ticker = Ticker::new(Duration::from_millis(30));
        assert!(ticker.poll(t0));

        let late = t0 + Duration::from_millis(500);
        assert!(ticker.poll(late));
        assert!(!ticker.poll(late + Duration::from_millis(1)));
        assert!(ticker.poll(late + Duration::from_millis(30)));
    }
}
