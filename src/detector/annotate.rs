// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 检测结果绘制 (边框 + 类别标签)
use super::Detection;
use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

const PALETTE: [(u8, u8, u8); 12] = [
    (255, 0, 0),     // 红色
    (0, 255, 0),     // 绿色
    (0, 0, 255),     // 蓝色
    (255, 255, 0),   // 黄色
    (255, 0, 255),   // 品红
    (0, 255, 255),   // 青色
    (255, 128, 0),   // 橙色
    (255, 0, 128),   // 粉红
    (128, 255, 0),   // 黄绿
    (0, 128, 255),   // 天蓝
    (255, 255, 255), // 白色
    (128, 0, 255),   // 紫色
];

pub fn color_for(class_id: usize) -> Rgb<u8> {
    let (r, g, b) = PALETTE[class_id % PALETTE.len()];
    Rgb([r, g, b])
}

#[derive(Clone)]
pub struct Annotator {
    line_width: u32,
    font: Option<FontArc>,
    font_size: f32,
}

impl Annotator {
    pub fn new(line_width: u32) -> Self {
        Self {
            line_width: line_width.max(1),
            font: None,
            font_size: 16.0,
        }
    }

    /// 加载标签字体 (ttf/ttc); 没有字体时只画框
    pub fn with_font_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("parse font {}", path.display()))?;
        self.font = Some(font);
        Ok(self)
    }

    pub fn plot(&self, image: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut canvas = image.clone();
        let (w, h) = canvas.dimensions();
        if w == 0 || h == 0 {
            return canvas;
        }

        for det in detections {
            let Some(rect) = clip(det, w, h) else {
                continue;
            };
            let color = color_for(det.class_id);

            for i in 0..self.line_width {
                let inset = i as i32;
                let rw = rect.width() as i32 - 2 * inset;
                let rh = rect.height() as i32 - 2 * inset;
                if rw <= 0 || rh <= 0 {
                    break;
                }
                draw_hollow_rect_mut(
                    &mut canvas,
                    Rect::at(rect.left() + inset, rect.top() + inset).of_size(rw as u32, rh as u32),
                    color,
                );
            }

            if let Some(font) = &self.font {
                let text = format!("{} {:.2}", det.label, det.confidence);
                let scale = PxScale::from(self.font_size);
                let (tw, th) = text_size(scale, font, &text);
                let ty = (rect.top() - th as i32 - 2).max(0);
                draw_filled_rect_mut(
                    &mut canvas,
                    Rect::at(rect.left(), ty).of_size(tw.max(1) + 4, th.max(1) + 2),
                    color,
                );
                draw_text_mut(
                    &mut canvas,
                    Rgb([0, 0, 0]),
                    rect.left() + 2,
                    ty,
                    scale,
                    font,
                    &text,
                );
            }
        }

        canvas
    }
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new(1)
    }
}

/// 裁剪到图像范围内; 完全在图外的框返回 None
fn clip(det: &Detection, w: u32, h: u32) -> Option<Rect> {
    let b = &det.bbox;
    let x1 = b.x1.max(0.0).min(w as f32 - 1.0) as i32;
    let y1 = b.y1.max(0.0).min(h as f32 - 1.0) as i32;
    let x2 = b.x2.max(0.0).min(w as f32 - 1.0) as i32;
    let y2 = b.y2.max(0.0).min(h as f32 - 1.0) as i32;
    if b.x2 < 0.0 || b.y2 < 0.0 || b.x1 > w as f32 || b.y1 > h as f32 {
        return None;
    }
    let rw = (x2 - x1 + 1).max(1) as u32;
    let rh = (y2 - y1 + 1).max(1) as u32;
    Some(Rect::at(x1, y1).of_size(rw, rh))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::BBox;

    fn det(class_id: usize, x: f32, y: f32, w: f32, h: f32) -> Detection {
        Detection {
            label: "car".to_string(),
            class_id,
            confidence: 0.8,
            bbox: BBox::from_xywh(x, y, w, h),
        }
    }

    #[test]
    fn test_plot_draws_border_only() {
        let img = RgbImage::new(40, 30);
        let out = Annotator::new(1).plot(&img, &[det(2, 10.0, 5.0, 20.0, 10.0)]);

        assert_eq!(out.get_pixel(10, 5), &color_for(2));
        assert_eq!(out.get_pixel(30, 15), &color_for(2));
        // 框内与框外保持原样
        assert_eq!(out.get_pixel(20, 10), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(2, 2), &Rgb([0, 0, 0]));
        // 原图未被修改
        assert_eq!(img.get_pixel(10, 5), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_thick_lines() {
        let img = RgbImage::new(40, 30);
        let out = Annotator::new(3).plot(&img, &[det(0, 10.0, 5.0, 20.0, 20.0)]);
        assert_eq!(out.get_pixel(12, 15), &color_for(0));
        assert_eq!(out.get_pixel(13, 15), &Rgb([0, 0, 0]));
    }

    #[test]
    fn test_boxes_outside_are_clipped() {
        let img = RgbImage::new(20, 20);
        let dets = [
            det(1, -50.0, -50.0, 10.0, 10.0),
            det(1, 15.0, 15.0, 100.0, 100.0),
            det(1, 100.0, 100.0, 5.0, 5.0),
        ];
        let out = Annotator::new(2).plot(&img, &dets);
        assert_eq!(out.get_pixel(19, 19), &color_for(1));
        assert_eq!(out.dimensions(), (20, 20));
    }

    #[test]
    fn test_palette_cycles() {
        assert_eq!(color_for(0), color_for(PALETTE.len()));
        assert_ne!(color_for(0), color_for(1));
    }

    #[test]
    fn test_missing_font_is_error() {
        assert!(Annotator::new(1).with_font_file("/no/such/font.ttf").is_err());
    }
}
