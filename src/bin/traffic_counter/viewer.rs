// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 桌面显示层 (macroquad + egui)
///
/// ```text
/// ┌──────────── 路径 / 打开 / 停止 / 计数 ────────────┐
/// │    原始画面         │        检测画面             │
/// ├───────────────────── 日志 ────────────────────────┤
/// ```
use egui_macroquad::egui;
use image::buffer::ConvertBuffer;
use image::{RgbImage, RgbaImage};
use macroquad::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use traffic_counter::config::AppConfig;
use traffic_counter::dispatch::Dispatcher;
use traffic_counter::history::RecentVideos;
use traffic_counter::source::VIDEO_EXTENSIONS;
use traffic_counter::surface::PresentationSurface;

const TOP_BAR_HEIGHT: f32 = 44.0;
const LOG_HEIGHT: f32 = 170.0;
const MAX_LOG_LINES: usize = 500;
const UI_FONT: &str = "assets/font/msyh.ttc";

/// 本帧用户操作
#[derive(Default)]
pub struct ViewerActions {
    pub open: Option<PathBuf>,
    pub stop: bool,
}

pub struct Viewer {
    original: Option<Texture2D>,
    annotated: Option<Texture2D>,
    log: Vec<String>,
    path_input: String,
    recent: RecentVideos,
}

impl Viewer {
    pub fn new(config: &AppConfig) -> Self {
        load_ui_font();

        let recent = RecentVideos::load(&config.history_file, config.history_limit);
        let path_input = recent.entries().first().cloned().unwrap_or_default();

        Self {
            original: None,
            annotated: None,
            log: Vec::new(),
            path_input,
            recent,
        }
    }

    pub fn remember(&mut self, path: &std::path::Path) {
        self.recent.touch(path);
        self.path_input = path.display().to_string();
    }

    /// 绘制两个画面
    pub fn draw(&self) {
        clear_background(Color::from_rgba(20, 20, 30, 255));

        let top = TOP_BAR_HEIGHT;
        let height = (screen_height() - TOP_BAR_HEIGHT - LOG_HEIGHT).max(0.0);
        let half = screen_width() / 2.0;

        for (i, texture) in [&self.original, &self.annotated].into_iter().enumerate() {
            let left = half * i as f32;
            draw_rectangle_lines(left + 2.0, top + 2.0, half - 4.0, height - 4.0, 1.0, DARKGRAY);

            let Some(texture) = texture else {
                continue;
            };
            // 画面已按视图大小缩放, 这里只在区域内再等比适配一次
            let scale = (half / texture.width())
                .min(height / texture.height())
                .min(1.0);
            let w = texture.width() * scale;
            let h = texture.height() * scale;
            draw_texture_ex(
                texture,
                left + (half - w) / 2.0,
                top + (height - h) / 2.0,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(w, h)),
                    ..Default::default()
                },
            );
        }
    }

    /// 绘制控制栏与日志窗口, 返回用户操作
    pub fn draw_egui(&mut self, dispatcher: &Dispatcher, playing: bool) -> ViewerActions {
        let mut actions = ViewerActions::default();

        egui_macroquad::ui(|ctx| {
            egui::TopBottomPanel::top("controls")
                .exact_height(TOP_BAR_HEIGHT)
                .show(ctx, |ui| {
                    ui.horizontal_centered(|ui| {
                        ui.label("视频:");

                        egui::ComboBox::from_id_salt("recent_videos")
                            .selected_text("最近打开...")
                            .show_ui(ui, |ui| {
                                for entry in self.recent.entries() {
                                    if ui.selectable_label(self.path_input == *entry, entry).clicked() {
                                        self.path_input = entry.clone();
                                        actions.open = Some(PathBuf::from(entry));
                                    }
                                }
                            });

                        let hint = format!("视频文件 ({})", VIDEO_EXTENSIONS.join(" "));
                        let text = ui.add(
                            egui::TextEdit::singleline(&mut self.path_input)
                                .desired_width(360.0)
                                .hint_text(hint),
                        );
                        let entered =
                            text.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));

                        if (ui.button("▶ 打开").clicked() || entered)
                            && !self.path_input.trim().is_empty()
                        {
                            actions.open = Some(PathBuf::from(self.path_input.trim()));
                        }
                        if ui.add_enabled(playing, egui::Button::new("⏹ 停止")).clicked() {
                            actions.stop = true;
                        }

                        ui.separator();
                        match dispatcher.last_count() {
                            Some(count) => ui.label(format!("{}{}", dispatcher.log_prefix(), count)),
                            None => ui.label(format!("{}-", dispatcher.log_prefix())),
                        };
                        if let Some(ms) = dispatcher.last_inference_ms() {
                            ui.weak(format!("{} ms", ms));
                        }
                    });
                });

            egui::TopBottomPanel::bottom("log")
                .exact_height(LOG_HEIGHT)
                .show(ctx, |ui| {
                    egui::ScrollArea::vertical()
                        .stick_to_bottom(true)
                        .auto_shrink([false, false])
                        .show(ui, |ui| {
                            for line in &self.log {
                                ui.monospace(line);
                            }
                        });
                });
        });

        egui_macroquad::draw();
        actions
    }
}

fn texture_from(image: &RgbImage) -> Option<Texture2D> {
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 || w > u16::MAX as u32 || h > u16::MAX as u32 {
        return None;
    }
    let rgba: RgbaImage = image.convert();
    let texture = Texture2D::from_rgba8(w as u16, h as u16, &rgba);
    texture.set_filter(FilterMode::Linear);
    Some(texture)
}

/// 只在尺寸变化时重建纹理, 否则更新像素
fn upload(slot: &mut Option<Texture2D>, image: &RgbImage) {
    let (w, h) = image.dimensions();
    if let Some(tex) = slot.as_ref() {
        if tex.width() == w as f32 && tex.height() == h as f32 {
            let rgba: RgbaImage = image.convert();
            tex.update(&Image {
                bytes: rgba.into_raw(),
                width: w as u16,
                height: h as u16,
            });
            return;
        }
    }
    *slot = texture_from(image);
}

impl PresentationSurface for Viewer {
    fn show_original(&mut self, image: &RgbImage) {
        upload(&mut self.original, image);
    }

    fn show_annotated(&mut self, image: &RgbImage) {
        upload(&mut self.annotated, image);
    }

    fn append_log_line(&mut self, text: &str) {
        self.log.push(text.to_string());
        if self.log.len() > MAX_LOG_LINES {
            let excess = self.log.len() - MAX_LOG_LINES;
            self.log.drain(..excess);
        }
    }

    fn clear_original(&mut self) {
        self.original = None;
    }

    fn clear_annotated(&mut self) {
        self.annotated = None;
    }
}

/// egui 默认字体不含中文, 加载微软雅黑
fn load_ui_font() {
    let bytes = match std::fs::read(UI_FONT) {
        Ok(bytes) => bytes,
        Err(_) => {
            warn!("⚠️ 未找到中文字体文件: {}", UI_FONT);
            return;
        }
    };

    egui_macroquad::cfg(|ctx| {
        let mut fonts = egui::FontDefinitions::default();
        fonts
            .font_data
            .insert("msyh".to_owned(), Arc::new(egui::FontData::from_owned(bytes.clone())));
        for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
            fonts
                .families
                .entry(family)
                .or_default()
                .insert(0, "msyh".to_owned());
        }
        ctx.set_fonts(fonts);
    });
    info!("✅ 中文字体加载成功");
}
