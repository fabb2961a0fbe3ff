// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测模型接口
///
/// 推理线程只依赖 `Detector` trait:
/// ```text
/// Frame → predict → { detections, annotated }
/// ```
/// - Yolov8Detector: ONNX Runtime 后端 (需要 `onnx` 功能)
/// - Annotator:      检测框/标签绘制
pub mod annotate;

#[cfg(feature = "onnx")]
pub mod yolov8;

pub use annotate::Annotator;

#[cfg(feature = "onnx")]
pub use yolov8::{Yolov8Config, Yolov8Detector};

use crate::error::Result;
use crate::frame::Frame;
use image::RgbImage;

/// 检测框 (原图像素坐标)
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub fn from_xywh(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self {
            x1: x,
            y1: y,
            x2: x + w,
            y2: y + h,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = w * h;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// 单个检测结果
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub label: String,
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BBox,
}

/// 一次推理的输出: 检测列表 + 绘制好的结果图
#[derive(Clone, Debug)]
pub struct Prediction {
    pub detections: Vec<Detection>,
    pub annotated: RgbImage,
}

/// 逐帧目标检测
///
/// Implementations may be slow; they are only ever called from the
/// inference worker thread, one frame at a time.
pub trait Detector: Send {
    fn predict(&mut self, frame: &Frame) -> Result<Prediction>;
}

impl<D: Detector + ?Sized> Detector for Box<D> {
    fn predict(&mut self, frame: &Frame) -> Result<Prediction> {
        (**self).predict(frame)
    }
}

/// 统计指定类别的数量
pub fn count_label(detections: &[Detection], label: &str) -> usize {
    detections.iter().filter(|d| d.label == label).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn det(label: &str) -> Detection {
        Detection {
            label: label.to_string(),
            class_id: 0,
            confidence: 0.9,
            bbox: BBox::default(),
        }
    }

    #[test]
    fn test_count_label_exact_match() {
        let dets = vec![det("car"), det("truck"), det("car"), det("Car"), det("car ")];
        assert_eq!(count_label(&dets, "car"), 2);
        assert_eq!(count_label(&dets, "bus"), 0);
        assert_eq!(count_label(&[], "car"), 0);
    }

    #[test]
    fn test_iou() {
        let a = BBox::from_xywh(0.0, 0.0, 10.0, 10.0);
        let b = BBox::from_xywh(5.0, 0.0, 10.0, 10.0);
        assert!((a.iou(&b) - 50.0 / 150.0).abs() < 1e-6);
        assert_eq!(a.iou(&BBox::from_xywh(20.0, 20.0, 5.0, 5.0)), 0.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
    }
}
