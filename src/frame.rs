// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频帧与等比缩放
/// Frame type shared by every pipeline stage, plus scale-to-fit helpers.
use fast_image_resize as fr;
use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 一帧RGB图像 (交接后只读)
///
/// Cloning is cheap: the pixel buffer sits behind an `Arc` and is never
/// mutated once a frame leaves the stage that produced it.
#[derive(Clone, Debug)]
pub struct Frame {
    id: u64,
    image: Arc<RgbImage>,
}

impl Frame {
    pub fn new(id: u64, image: RgbImage) -> Self {
        Self {
            id,
            image: Arc::new(image),
        }
    }

    /// 从交错RGB字节创建, 长度不匹配时返回 None
    pub fn from_rgb(id: u64, width: u32, height: u32, rgb: Vec<u8>) -> Option<Self> {
        RgbImage::from_raw(width, height, rgb).map(|img| Self::new(id, img))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}

/// 显示区域尺寸 (像素)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewSize {
    pub width: u32,
    pub height: u32,
}

impl ViewSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// 等比缩放后的尺寸 (KeepAspectRatio), 允许放大
pub fn fit_within(src: (u32, u32), view: ViewSize) -> (u32, u32) {
    let (w0, h0) = src;
    if w0 == 0 || h0 == 0 || view.width == 0 || view.height == 0 {
        return (0, 0);
    }

    let r = (view.width as f64 / w0 as f64).min(view.height as f64 / h0 as f64);
    let w = ((w0 as f64 * r).round() as u32).clamp(1, view.width);
    let h = ((h0 as f64 * r).round() as u32).clamp(1, view.height);
    (w, h)
}

/// 将图像缩放到显示区域内, 保持宽高比
pub fn scale_to_fit(src: &RgbImage, view: ViewSize) -> RgbImage {
    let (w, h) = fit_within(src.dimensions(), view);
    if (w, h) == src.dimensions() {
        return src.clone();
    }
    if w == 0 || h == 0 {
        return RgbImage::new(0, 0);
    }

    match resize_rgb(src, w, h) {
        Some(img) => img,
        // fast_image_resize 拒绝的输入退回到 image 的 Triangle 算法
        None => imageops::resize(src, w, h, imageops::FilterType::Triangle),
    }
}

pub(crate) fn resize_rgb(src: &RgbImage, w: u32, h: u32) -> Option<RgbImage> {
    let src_image =
        fr::images::ImageRef::new(src.width(), src.height(), src.as_raw(), fr::PixelType::U8x3)
            .ok()?;
    let mut dst_image = fr::images::Image::new(w, h, fr::PixelType::U8x3);

    let mut resizer = fr::Resizer::new();
    resizer
        .resize(
            &src_image,
            &mut dst_image,
            &fr::ResizeOptions::new()
                .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Bilinear)),
        )
        .ok()?;

    RgbImage::from_raw(w, h, dst_image.buffer().to_vec())
}
