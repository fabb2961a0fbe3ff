// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! 应用配置 - 通过JSON文件调整参数

use crate::dispatch::DEFAULT_LOG_PREFIX;
use crate::error::PipelineError;
use crate::frame::ViewSize;
use crate::worker::WorkerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{error, info, warn};

pub const DEFAULT_CONFIG_FILE: &str = "traffic_counter.json";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    // === 采集 ===
    pub capture_interval_ms: u64, // 采集周期
    pub original_view: ViewSize,  // 原始画面区域

    // === 推理线程 ===
    pub cooldown_ms: u64,           // 推理后冷却
    pub idle_poll_ms: u64,          // 空闲轮询间隔
    pub fresh_after_cooldown: bool, // 冷却后丢弃旧帧
    pub target_label: String,       // 计数类别
    pub log_prefix: String,         // 日志行前缀
    pub annotated_view: ViewSize,   // 检测画面区域

    // === 检测模型 ===
    pub model_path: PathBuf,
    pub conf_threshold: f32, // 检测置信度阈值
    pub iou_threshold: f32,  // NMS IOU阈值
    pub input_size: u32,     // 模型输入边长
    pub line_width: u32,     // 检测框线宽
    pub font_path: Option<PathBuf>,

    // === 界面 ===
    pub history_file: PathBuf,
    pub history_limit: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            capture_interval_ms: 30,
            original_view: ViewSize::new(640, 480),

            cooldown_ms: 1000,
            idle_poll_ms: 10,
            fresh_after_cooldown: true,
            target_label: "car".to_string(),
            log_prefix: DEFAULT_LOG_PREFIX.to_string(),
            annotated_view: ViewSize::new(640, 480),

            model_path: PathBuf::from("models/best.onnx"),
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            input_size: 640,
            line_width: 1,
            font_path: None,

            history_file: PathBuf::from("recent_videos.txt"),
            history_limit: 10,
        }
    }
}

impl AppConfig {
    /// 从JSON文件加载配置; 文件不存在时写入默认配置, 解析失败时使用默认值
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match Self::from_json(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件无效: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在, 创建默认配置...");
                let config = Self::default();
                config.save(path);
                config
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PipelineError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| PipelineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) {
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = fs::write(path, json) {
                    error!("❌ 保存配置失败: {}", e);
                } else {
                    info!("💾 配置已保存到 {}", path.display());
                }
            }
            Err(e) => error!("❌ 序列化配置失败: {}", e),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        let bad = |msg: &str| Err(PipelineError::Config(msg.to_string()));
        if self.capture_interval_ms == 0 {
            return bad("capture_interval_ms must be > 0");
        }
        if self.target_label.trim().is_empty() {
            return bad("target_label must not be empty");
        }
        if !(0.0..=1.0).contains(&self.conf_threshold) {
            return bad("conf_threshold must be within [0, 1]");
        }
        if !(0.0..=1.0).contains(&self.iou_threshold) {
            return bad("iou_threshold must be within [0, 1]");
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            return bad("input_size must be a positive multiple of 32");
        }
        for view in [self.original_view, self.annotated_view] {
            if view.width == 0 || view.height == 0 {
                return bad("view sizes must be non-zero");
            }
        }
        Ok(())
    }

    pub fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            target_label: self.target_label.clone(),
            cooldown: Duration::from_millis(self.cooldown_ms),
            idle_poll: Duration::from_millis(self.idle_poll_ms.max(1)),
            annotated_view: self.annotated_view,
            fresh_after_cooldown: self.fresh_after_cooldown,
        }
    }

    #[cfg(feature = "onnx")]
    pub fn detector_config(&self) -> crate::detector::Yolov8Config {
        crate::detector::Yolov8Config {
            model: self.model_path.clone(),
            conf: self.conf_threshold,
            iou: self.iou_threshold,
            input_size: self.input_size,
            names: None,
            line_width: self.line_width,
            font: self.font_path.clone(),
            profile: false,
        }
    }

    /// 打印当前配置
    pub fn print_summary(&self) {
        info!("🎛️ 当前配置:");
        info!("  采集周期: {} ms", self.capture_interval_ms);
        info!("  推理冷却: {} ms", self.cooldown_ms);
        info!("  计数类别: {}", self.target_label);
        info!("  模型: {}", self.model_path.display());
        info!(
            "  置信度/IOU: {:.2} / {:.2}",
            self.conf_threshold, self.iou_threshold
        );
    }
}
