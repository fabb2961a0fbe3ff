// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 单槽帧邮箱 (采集线程 → 推理线程)
/// Single-slot frame mailbox between the capture loop and the inference worker.
///
/// `try_put` never replaces a pending frame: when the worker is busy the
/// capture loop simply drops its candidate. This is the only backpressure
/// in the pipeline.
use crate::frame::Frame;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Default)]
struct Slot {
    frame: Option<Frame>,
    closed: bool,
}

#[derive(Default)]
pub struct FrameMailbox {
    slot: Mutex<Slot>,
    ready: Condvar,
}

impl FrameMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 邮箱为空时放入并返回 true, 否则不做任何修改返回 false
    pub fn try_put(&self, frame: Frame) -> bool {
        let mut slot = self.lock();
        if slot.closed || slot.frame.is_some() {
            return false;
        }
        slot.frame = Some(frame);
        drop(slot);
        self.ready.notify_one();
        true
    }

    /// 取出帧, 为空时阻塞等待; 仅在邮箱关闭后返回 None
    pub fn take_blocking(&self) -> Option<Frame> {
        let mut slot = self.lock();
        loop {
            if let Some(frame) = slot.frame.take() {
                return Some(frame);
            }
            if slot.closed {
                return None;
            }
            slot = self
                .ready
                .wait(slot)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// 与 `take_blocking` 相同, 但最多等待 `timeout`
    pub fn take_timeout(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.lock();
        loop {
            if let Some(frame) = slot.frame.take() {
                return Some(frame);
            }
            if slot.closed {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .ready
                .wait_timeout(slot, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            slot = guard;
        }
    }

    /// 清空待处理帧 (会话停止时调用), 返回被丢弃的帧
    pub fn clear(&self) -> Option<Frame> {
        self.lock().frame.take()
    }

    /// 永久关闭: 丢弃待处理帧并唤醒所有等待者
    pub fn close(&self) {
        let mut slot = self.lock();
        slot.closed = true;
        slot.frame = None;
        drop(slot);
        self.ready.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_empty(&self) -> bool {
        self.lock().frame.is_none()
    }

    pub fn len(&self) -> usize {
        usize::from(!self.is_empty())
    }

    /// 待处理帧的序号
    pub fn pending_id(&self) -> Option<u64> {
        self.lock().frame.as_ref().map(Frame::id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;
    use std::sync::Arc;
    use std::thread;

    fn frame(id: u64) -> Frame {
        Frame::new(id, RgbImage::new(2, 2))
    }

    #[test]
    fn test_put_into_empty_mailbox() {
        let mb = FrameMailbox::new();
        assert!(mb.is_empty());
        assert!(mb.try_put(frame(1)));
        assert_eq!(mb.len(), 1);
        assert_eq!(mb.pending_id(), Some(1));
    }

    #[test]
    fn test_busy_mailbox_rejects_without_overwrite() {
        let mb = FrameMailbox::new();
        assert!(mb.try_put(frame(1)));
        assert!(!mb.try_put(frame(2)));
        assert!(!mb.try_put(frame(3)));
        assert_eq!(mb.pending_id(), Some(1));
        assert_eq!(mb.len(), 1);
    }

    #[test]
    fn test_take_then_put_succeeds() {
        let mb = FrameMailbox::new();
        assert!(mb.try_put(frame(1)));
        let taken = mb.take_blocking().map(|f| f.id());
        assert_eq!(taken, Some(1));
        assert!(mb.is_empty());
        assert!(mb.try_put(frame(2)));
        assert_eq!(mb.pending_id(), Some(2));
    }

    #[test]
    fn test_size_never_exceeds_one() {
        let mb = FrameMailbox::new();
        // 伪随机的 put/take 序列
        let mut state: u32 = 0x2545_f491;
        for id in 0..1000u64 {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            if state % 3 == 0 {
                mb.take_timeout(Duration::ZERO);
            } else {
                mb.try_put(frame(id));
            }
            assert!(mb.len() <= 1);
        }
    }

    #[test]
    fn test_take_timeout_on_empty_returns_none() {
        let mb = FrameMailbox::new();
        let start = Instant::now();
        assert!(mb.take_timeout(Duration::from_millis(20)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn test_take_blocking_wakes_on_put() {
        let mb = Arc::new(FrameMailbox::new());
        let consumer = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || mb.take_blocking().map(|f| f.id()))
        };
        thread::sleep(Duration::from_millis(20));
        assert!(mb.try_put(frame(42)));
        assert_eq!(consumer.join().ok().flatten(), Some(42));
    }

    #[test]
    fn test_close_releases_blocked_taker() {
        let mb = Arc::new(FrameMailbox::new());
        let consumer = {
            let mb = Arc::clone(&mb);
            thread::spawn(move || mb.take_blocking().is_none())
        };
        thread::sleep(Duration::from_millis(20));
        mb.close();
        assert!(consumer.join().unwrap_or(false));
        assert!(mb.is_closed());
        assert!(!mb.try_put(frame(1)));
    }

    #[test]
    fn test_clear_returns_pending_frame() {
        let mb = FrameMailbox::new();
        assert!(mb.clear().is_none());
        mb.try_put(frame(5));
        assert_eq!(mb.clear().map(|f| f.id()), Some(5));
        assert!(mb.is_empty());
    }
}
