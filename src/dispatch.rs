// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 推理结果回传 (推理线程 → 显示线程)
///
/// 每个推理周期只发送一条 `InferenceReport`, 计数与检测画面打包在一起,
/// 显示端不会看到"新计数 + 旧画面"的中间状态.
use crate::surface::PresentationSurface;
use crossbeam_channel::{unbounded, Receiver, Sender};
use image::RgbImage;

/// 日志行前缀
pub const DEFAULT_LOG_PREFIX: &str = "当前通过车辆:";

#[derive(Clone, Debug)]
pub struct InferenceReport {
    pub frame_id: u64,
    pub count: usize,
    /// 十进制计数文本, 如 "3"
    pub count_text: String,
    /// 已缩放到检测画面大小
    pub annotated: RgbImage,
    pub inference_ms: u64,
}

impl InferenceReport {
    pub fn new(frame_id: u64, count: usize, annotated: RgbImage, inference_ms: u64) -> Self {
        Self {
            frame_id,
            count,
            count_text: count.to_string(),
            annotated,
            inference_ms,
        }
    }
}

/// 推理线程持有的发送端
#[derive(Clone)]
pub struct ResultSender {
    tx: Sender<InferenceReport>,
}

impl ResultSender {
    /// 显示端已经退出时返回 false
    pub fn send(&self, report: InferenceReport) -> bool {
        self.tx.send(report).is_ok()
    }
}

/// 显示线程持有的接收端
pub struct Dispatcher {
    rx: Receiver<InferenceReport>,
    log_prefix: String,
    last_count: Option<usize>,
    last_inference_ms: Option<u64>,
}

/// 创建无界 FIFO 结果通道
pub fn result_channel() -> (ResultSender, Dispatcher) {
    let (tx, rx) = unbounded();
    (
        ResultSender { tx },
        Dispatcher {
            rx,
            log_prefix: DEFAULT_LOG_PREFIX.to_string(),
            last_count: None,
            last_inference_ms: None,
        },
    )
}

impl Dispatcher {
    pub fn with_log_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.log_prefix = prefix.into();
        self
    }

    pub fn log_prefix(&self) -> &str {
        &self.log_prefix
    }

    /// 按到达顺序应用所有待处理的结果, 返回处理条数
    pub fn pump(&mut self, surface: &mut dyn PresentationSurface) -> usize {
        let mut applied = 0;
        for report in self.rx.try_iter() {
            surface.append_log_line(&format!("{}{}", self.log_prefix, report.count_text));
            surface.show_annotated(&report.annotated);
            self.last_count = Some(report.count);
            self.last_inference_ms = Some(report.inference_ms);
            applied += 1;
        }
        applied
    }

    pub fn last_count(&self) -> Option<usize> {
        self.last_count
    }

    pub fn last_inference_ms(&self) -> Option<u64> {
        self.last_inference_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::RecordingSurface;

    #[test]
    fn test_pump_preserves_order() {
        let (tx, mut dispatcher) = result_channel();
        for (i, count) in [3usize, 0, 7].into_iter().enumerate() {
            assert!(tx.send(InferenceReport::new(i as u64, count, RgbImage::new(4, 2), 5)));
        }

        let mut surface = RecordingSurface::new();
        assert_eq!(dispatcher.pump(&mut surface), 3);
        assert_eq!(
            surface.log,
            vec!["当前通过车辆:3", "当前通过车辆:0", "当前通过车辆:7"]
        );
        assert_eq!(surface.annotated_shown, 3);
        assert_eq!(dispatcher.last_count(), Some(7));
    }

    #[test]
    fn test_pump_empty_channel() {
        let (_tx, mut dispatcher) = result_channel();
        let mut surface = RecordingSurface::new();
        assert_eq!(dispatcher.pump(&mut surface), 0);
        assert!(surface.log.is_empty());
        assert_eq!(dispatcher.last_count(), None);
    }

    #[test]
    fn test_custom_prefix() {
        let (tx, dispatcher) = result_channel();
        let mut dispatcher = dispatcher.with_log_prefix("cars: ");
        tx.send(InferenceReport::new(1, 12, RgbImage::new(1, 1), 40));

        let mut surface = RecordingSurface::new();
        dispatcher.pump(&mut surface);
        assert_eq!(surface.log, vec!["cars: 12"]);
        assert_eq!(dispatcher.last_inference_ms(), Some(40));
    }

    #[test]
    fn test_send_after_dispatcher_dropped() {
        let (tx, dispatcher) = result_channel();
        drop(dispatcher);
        assert!(!tx.send(InferenceReport::new(1, 1, RgbImage::new(1, 1), 1)));
    }
}
