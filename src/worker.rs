// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 后台推理线程
/// Process-lifetime inference worker.
///
/// 循环: 取帧 → 检测 → 统计目标类别 → 发送结果 → 冷却
///
/// A failed `predict` drops the frame and goes straight back to waiting;
/// no report is sent and the running count is left as it was. Stopping a
/// session never interrupts an in-flight `predict`.
use crate::detector::{count_label, Detector};
use crate::dispatch::{InferenceReport, ResultSender};
use crate::frame::{scale_to_fit, ViewSize};
use crate::mailbox::FrameMailbox;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

#[derive(Clone, Debug)]
pub struct WorkerConfig {
    /// 计数的类别名
    pub target_label: String,
    /// 每次推理后的冷却时间
    pub cooldown: Duration,
    /// 空闲时检查邮箱的间隔
    pub idle_poll: Duration,
    pub annotated_view: ViewSize,
    /// 冷却结束后丢弃冷却期间放入的帧
    pub fresh_after_cooldown: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            target_label: "car".to_string(),
            cooldown: Duration::from_secs(1),
            idle_poll: Duration::from_millis(10),
            annotated_view: ViewSize::new(640, 480),
            fresh_after_cooldown: true,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerCycles {
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Shared {
    stop: AtomicBool,
    completed: AtomicU64,
    failed: AtomicU64,
}

pub struct InferenceWorker<D: Detector> {
    mailbox: Arc<FrameMailbox>,
    detector: D,
    sender: ResultSender,
    config: WorkerConfig,
    shared: Arc<Shared>,
    count: usize,
}

impl<D: Detector + 'static> InferenceWorker<D> {
    /// 启动推理线程 (每个进程一次)
    pub fn spawn(
        mailbox: Arc<FrameMailbox>,
        detector: D,
        sender: ResultSender,
        config: WorkerConfig,
    ) -> std::io::Result<WorkerHandle> {
        let shared = Arc::new(Shared::default());
        let worker = InferenceWorker {
            mailbox: Arc::clone(&mailbox),
            detector,
            sender,
            config,
            shared: Arc::clone(&shared),
            count: 0,
        };

        let thread = std::thread::Builder::new()
            .name("inference".to_string())
            .spawn(move || worker.run())?;

        Ok(WorkerHandle {
            thread: Some(thread),
            shared,
            mailbox,
        })
    }
}

impl<D: Detector> InferenceWorker<D> {
    fn run(mut self) {
        info!("🧠 推理线程启动 (目标类别: {})", self.config.target_label);

        while !self.shared.stop.load(Ordering::Relaxed) {
            let Some(frame) = self.mailbox.take_timeout(self.config.idle_poll) else {
                if self.mailbox.is_closed() {
                    break;
                }
                continue;
            };

            let started = Instant::now();
            let prediction = match self.detector.predict(&frame) {
                Ok(p) => p,
                Err(e) => {
                    self.shared.failed.fetch_add(1, Ordering::Relaxed);
                    error!("❌ 帧 #{} 推理失败: {}", frame.id(), e);
                    continue;
                }
            };

            self.count = count_label(&prediction.detections, &self.config.target_label);
            let annotated = scale_to_fit(&prediction.annotated, self.config.annotated_view);
            let elapsed = started.elapsed().as_millis() as u64;
            self.shared.completed.fetch_add(1, Ordering::Relaxed);
            debug!(
                "帧 #{}: {} 个 {}, {} ms",
                frame.id(),
                self.count,
                self.config.target_label,
                elapsed
            );

            let report = InferenceReport::new(frame.id(), self.count, annotated, elapsed);
            if !self.sender.send(report) {
                info!("显示端已关闭, 推理线程退出");
                break;
            }

            self.cool_down();
            if self.config.fresh_after_cooldown {
                self.mailbox.clear();
            }
        }

        info!("🛑 推理线程结束");
    }

    /// 冷却等待, 期间仍响应退出请求
    fn cool_down(&self) {
        let deadline = Instant::now() + self.config.cooldown;
        let step = self.config.idle_poll.max(Duration::from_millis(1));
        loop {
            if self.shared.stop.load(Ordering::Relaxed) {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(step.min(deadline - now));
        }
    }
}

pub struct WorkerHandle {
    thread: Option<JoinHandle<()>>,
    shared: Arc<Shared>,
    mailbox: Arc<FrameMailbox>,
}

impl WorkerHandle {
    pub fn cycles(&self) -> WorkerCycles {
        WorkerCycles {
            completed: self.shared.completed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, |t| t.is_finished())
    }

    /// 请求退出并等待线程结束; 正在进行的推理会先完成
    pub fn shutdown(&mut self) {
        self.shared.stop.store(true, Ordering::Relaxed);
        self.mailbox.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("❌ 推理线程异常退出");
            }
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}
