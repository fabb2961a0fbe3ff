// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 检测模型 (ONNX Runtime)
// 包含: 模型加载、预处理、推理、后处理

use super::{Annotator, BBox, Detection, Detector, Prediction};
use crate::error::{PipelineError, Result};
use crate::frame::{resize_rgb, Frame};
use anyhow::Context;
use image::{imageops, RgbImage};
use ndarray::{s, Array, ArrayView2, Axis, Ix4};
use once_cell::sync::Lazy;
use ort::session::Session;
use ort::value::Tensor;
use regex::Regex;
use std::cmp::Ordering;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info, warn};

const CXYWH_OFFSET: usize = 4;
const PAD_VALUE: f32 = 144.0 / 255.0;

/// 模型元数据中的类别表, 形如 `{0: 'car', 1: 'truck'}`
static NAMES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\d+)\s*:\s*['"]([^'"]*)['"]"#).expect("valid names regex")
});

#[derive(Clone, Debug)]
pub struct Yolov8Config {
    pub model: PathBuf,
    pub conf: f32,
    pub iou: f32,
    /// 正方形输入边长
    pub input_size: u32,
    /// 覆盖模型自带的类别名
    pub names: Option<Vec<String>>,
    pub line_width: u32,
    pub font: Option<PathBuf>,
    pub profile: bool,
}

impl Default for Yolov8Config {
    fn default() -> Self {
        Self {
            model: PathBuf::from("models/best.onnx"),
            conf: 0.25,
            iou: 0.45,
            input_size: 640,
            names: None,
            line_width: 1,
            font: None,
            profile: false,
        }
    }
}

pub struct Yolov8Detector {
    session: Session,
    names: Vec<String>,
    conf: f32,
    iou: f32,
    input_size: u32,
    annotator: Annotator,
    profile: bool,
}

impl Yolov8Detector {
    /// 加载模型; 只在启动时调用一次
    pub fn load(config: Yolov8Config) -> anyhow::Result<Self> {
        let session = Session::builder()
            .context("failed to create ORT session builder")?
            .commit_from_file(&config.model)
            .with_context(|| format!("failed to load model {}", config.model.display()))?;

        let names = match config.names {
            Some(names) => names,
            None => model_names(&session).unwrap_or_else(|| {
                warn!("⚠️ 模型未携带类别名, 使用类别序号");
                Vec::new()
            }),
        };

        let mut annotator = Annotator::new(config.line_width);
        if let Some(font) = &config.font {
            annotator = match annotator.clone().with_font_file(font) {
                Ok(a) => a,
                Err(e) => {
                    warn!("⚠️ 标签字体加载失败, 只绘制边框: {:#}", e);
                    annotator
                }
            };
        }

        info!(
            "✅ 模型加载: {} ({} 类, 输入 {}x{})",
            config.model.display(),
            names.len(),
            config.input_size,
            config.input_size
        );

        Ok(Self {
            session,
            names,
            conf: config.conf,
            iou: config.iou,
            input_size: config.input_size,
            annotator,
            profile: config.profile,
        })
    }

    fn infer(&mut self, image: &RgbImage) -> anyhow::Result<Vec<Detection>> {
        let t_pre = Instant::now();
        let (input, ratio) = letterbox(image, self.input_size);
        let side = self.input_size as usize;
        let shape = [1usize, 3, side, side];
        let (data, _) = input.into_raw_vec_and_offset();
        let tensor = Tensor::from_array((shape, data.into_boxed_slice()))
            .context("failed to create input tensor")?;
        if self.profile {
            debug!("[Model Preprocess]: {:?}", t_pre.elapsed());
        }

        let t_run = Instant::now();
        let outputs = self
            .session
            .run(ort::inputs!["images" => tensor])
            .context("YOLOv8 inference failed")?;
        let (shape, data) = outputs["output0"]
            .try_extract_tensor::<f32>()
            .context("failed to extract output tensor")?;
        if self.profile {
            debug!("[Model Inference]: {:?}", t_run.elapsed());
        }

        // [1, 4 + nc, anchors]
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
        let (rows, cols) = match dims.as_slice() {
            [1, rows, cols] => (*rows, *cols),
            [rows, cols] => (*rows, *cols),
            other => anyhow::bail!("unexpected output shape {:?}", other),
        };
        let preds = ArrayView2::from_shape((rows, cols), data).context("output shape mismatch")?;

        let t_post = Instant::now();
        let ys = decode_output(
            preds,
            &self.names,
            self.conf,
            self.iou,
            ratio,
            (image.width() as f32, image.height() as f32),
        );
        if self.profile {
            debug!("[Model Postprocess]: {:?}", t_post.elapsed());
        }
        Ok(ys)
    }
}

impl Detector for Yolov8Detector {
    fn predict(&mut self, frame: &Frame) -> Result<Prediction> {
        let detections = self
            .infer(frame.image())
            .map_err(|e| PipelineError::Inference(format!("{:#}", e)))?;
        let annotated = self.annotator.plot(frame.image(), &detections);
        Ok(Prediction {
            detections,
            annotated,
        })
    }
}

fn model_names(session: &Session) -> Option<Vec<String>> {
    let meta = session.metadata().ok()?;
    let raw = meta.custom("names").ok().flatten()?;
    let names = parse_names(&raw);
    if names.is_empty() {
        None
    } else {
        Some(names)
    }
}

/// 解析 `{0: 'car', 1: 'truck'}` 形式的类别表, 按序号排列
pub fn parse_names(raw: &str) -> Vec<String> {
    let mut pairs: Vec<(usize, String)> = NAMES_RE
        .captures_iter(raw)
        .filter_map(|c| Some((c[1].parse().ok()?, c[2].to_string())))
        .collect();
    pairs.sort_by_key(|(id, _)| *id);
    pairs.into_iter().map(|(_, name)| name).collect()
}

fn scale_wh(w0: f32, h0: f32, w1: f32, h1: f32) -> (f32, f32, f32) {
    let r = (w1 / w0).min(h1 / h0);
    (r, (w0 * r).round(), (h0 * r).round())
}

/// 等比缩放到左上角, 其余部分填充灰色; 返回 NCHW 张量与缩放比例
pub fn letterbox(image: &RgbImage, size: u32) -> (Array<f32, Ix4>, f32) {
    let mut ys = Array::from_elem((1, 3, size as usize, size as usize), PAD_VALUE);
    let (w0, h0) = image.dimensions();
    if w0 == 0 || h0 == 0 || size == 0 {
        return (ys, 1.0);
    }

    let (ratio, w_new, h_new) = scale_wh(w0 as f32, h0 as f32, size as f32, size as f32);
    let (w_new, h_new) = ((w_new as u32).clamp(1, size), (h_new as u32).clamp(1, size));
    let resized = resize_rgb(image, w_new, h_new).unwrap_or_else(|| {
        imageops::resize(image, w_new, h_new, imageops::FilterType::Triangle)
    });

    for (x, y, rgb) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        let [r, g, b] = rgb.0;
        ys[[0, 0, y, x]] = r as f32 / 255.0;
        ys[[0, 1, y, x]] = g as f32 / 255.0;
        ys[[0, 2, y, x]] = b as f32 / 255.0;
    }

    (ys, ratio)
}

/// 输出解码: [4 + nc, anchors] → 置信度过滤 → NMS → 原图坐标
pub fn decode_output(
    preds: ArrayView2<f32>,
    names: &[String],
    conf: f32,
    iou: f32,
    ratio: f32,
    (width_original, height_original): (f32, f32),
) -> Vec<Detection> {
    if preds.nrows() <= CXYWH_OFFSET || ratio <= 0.0 {
        return Vec::new();
    }

    let mut data: Vec<Detection> = Vec::new();
    for pred in preds.axis_iter(Axis(1)) {
        let bbox = pred.slice(s![0..CXYWH_OFFSET]);
        let clss = pred.slice(s![CXYWH_OFFSET..]);

        let Some((id, &confidence)) = clss
            .iter()
            .enumerate()
            .reduce(|max, x| if x.1 > max.1 { x } else { max })
        else {
            continue;
        };

        if confidence < conf {
            continue;
        }

        let cx = bbox[0] / ratio;
        let cy = bbox[1] / ratio;
        let w = bbox[2] / ratio;
        let h = bbox[3] / ratio;
        data.push(Detection {
            label: names.get(id).cloned().unwrap_or_else(|| id.to_string()),
            class_id: id,
            confidence,
            bbox: BBox {
                x1: (cx - w / 2.).clamp(0.0, width_original),
                y1: (cy - h / 2.).clamp(0.0, height_original),
                x2: (cx + w / 2.).clamp(0.0, width_original),
                y2: (cy + h / 2.).clamp(0.0, height_original),
            },
        });
    }

    non_max_suppression(&mut data, iou);
    data
}

/// 按置信度排序后贪心抑制重叠框 (与类别无关)
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| {
        b2.confidence
            .partial_cmp(&b1.confidence)
            .unwrap_or(Ordering::Equal)
    });

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            if xs[prev_index].bbox.iou(&xs[index].bbox) > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn names() -> Vec<String> {
        vec!["car".to_string(), "truck".to_string()]
    }

    /// 每列: cx, cy, w, h, score(car), score(truck)
    fn preds(columns: &[[f32; 6]]) -> Array2<f32> {
        let mut a = Array2::zeros((6, columns.len()));
        for (j, col) in columns.iter().enumerate() {
            for (i, v) in col.iter().enumerate() {
                a[[i, j]] = *v;
            }
        }
        a
    }

    #[test]
    fn test_parse_names() {
        let raw = "{0: 'car', 2: \"bus\", 1: 'traffic light'}";
        assert_eq!(parse_names(raw), vec!["car", "traffic light", "bus"]);
        assert!(parse_names("").is_empty());
    }

    #[test]
    fn test_decode_filters_low_confidence() {
        let p = preds(&[
            [100.0, 100.0, 20.0, 20.0, 0.9, 0.1],
            [300.0, 300.0, 20.0, 20.0, 0.1, 0.2],
        ]);
        let ys = decode_output(p.view(), &names(), 0.25, 0.45, 1.0, (640.0, 640.0));
        assert_eq!(ys.len(), 1);
        assert_eq!(ys[0].label, "car");
        assert_eq!(ys[0].bbox, BBox::from_xywh(90.0, 90.0, 20.0, 20.0));
    }

    #[test]
    fn test_decode_nms_keeps_best() {
        let p = preds(&[
            [100.0, 100.0, 40.0, 40.0, 0.6, 0.0],
            [102.0, 100.0, 40.0, 40.0, 0.8, 0.0],
            [400.0, 400.0, 40.0, 40.0, 0.0, 0.7],
        ]);
        let ys = decode_output(p.view(), &names(), 0.25, 0.45, 1.0, (640.0, 640.0));
        assert_eq!(ys.len(), 2);
        assert!((ys[0].confidence - 0.8).abs() < 1e-6);
        assert_eq!(ys[1].label, "truck");
        assert_eq!(crate::detector::count_label(&ys, "car"), 1);
    }

    #[test]
    fn test_decode_rescales_and_clamps() {
        // 原图 1280x720 → 640 输入, ratio = 0.5
        let p = preds(&[[630.0, 10.0, 40.0, 40.0, 0.9, 0.0]]);
        let ys = decode_output(p.view(), &names(), 0.25, 0.45, 0.5, (1280.0, 720.0));
        let b = ys[0].bbox;
        assert_eq!((b.x1, b.x2), (1220.0, 1280.0));
        assert_eq!((b.y1, b.y2), (0.0, 60.0));
    }

    #[test]
    fn test_unknown_class_uses_index() {
        let p = preds(&[[10.0, 10.0, 4.0, 4.0, 0.0, 0.9]]);
        let ys = decode_output(p.view(), &[], 0.25, 0.45, 1.0, (64.0, 64.0));
        assert_eq!(ys[0].label, "1");
    }

    #[test]
    fn test_letterbox_pads_bottom() {
        let img = RgbImage::from_pixel(128, 64, image::Rgb([255, 0, 0]));
        let (t, ratio) = letterbox(&img, 64);
        assert_eq!(t.shape(), &[1, 3, 64, 64]);
        assert!((ratio - 0.5).abs() < 1e-6);
        assert!((t[[0, 0, 10, 10]] - 1.0).abs() < 1e-3);
        assert!((t[[0, 0, 40, 10]] - PAD_VALUE).abs() < 1e-6);
    }
}
