// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 显示层接口
/// Presentation surface boundary. Every method is called from the single
/// presentation (UI) thread only.
use image::RgbImage;

pub trait PresentationSurface {
    /// 左侧原始画面
    fn show_original(&mut self, image: &RgbImage);
    /// 右侧检测结果画面
    fn show_annotated(&mut self, image: &RgbImage);
    /// 日志窗口追加一行
    fn append_log_line(&mut self, text: &str);
    fn clear_original(&mut self);
    fn clear_annotated(&mut self);
}

/// 无窗口的显示层: 记录所有调用
///
/// Keeps the latest image of each view and every log line. Handy for
/// headless runs and for asserting on what the pipeline displayed.
#[derive(Default, Debug)]
pub struct RecordingSurface {
    pub original: Option<RgbImage>,
    pub annotated: Option<RgbImage>,
    pub log: Vec<String>,
    pub original_shown: usize,
    pub annotated_shown: usize,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cleared(&self) -> bool {
        self.original.is_none() && self.annotated.is_none()
    }
}

impl PresentationSurface for RecordingSurface {
    fn show_original(&mut self, image: &RgbImage) {
        self.original = Some(image.clone());
        self.original_shown += 1;
    }

    fn show_annotated(&mut self, image: &RgbImage) {
        self.annotated = Some(image.clone());
        self.annotated_shown += 1;
    }

    fn append_log_line(&mut self, text: &str) {
        self.log.push(text.to_string());
    }

    fn clear_original(&mut self) {
        self.original = None;
    }

    fn clear_annotated(&mut self) {
        self.annotated = None;
    }
}
