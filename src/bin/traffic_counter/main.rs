// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// 视频车辆计数 - macroquad 桌面程序
///
/// 主程序入口 - 直接运行: cargo run --bin traffic-counter --features onnx,ffmpeg --release
mod viewer;

use anyhow::Context;
use clap::Parser;
use macroquad::prelude::*;
use macroquad::window::Conf;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use traffic_counter::config::{AppConfig, DEFAULT_CONFIG_FILE};
use traffic_counter::detector::Yolov8Detector;
use traffic_counter::dispatch::result_channel;
use traffic_counter::mailbox::FrameMailbox;
use traffic_counter::session::SessionController;
use traffic_counter::surface::PresentationSurface;
use traffic_counter::telemetry;
use traffic_counter::worker::InferenceWorker;
use viewer::Viewer;

#[derive(Parser, Debug)]
#[command(author, version, about = "视频车辆计数 (YOLOv8)", long_about = None)]
struct Args {
    /// JSON配置文件
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// ONNX模型 (覆盖配置文件)
    #[arg(short, long)]
    model: Option<PathBuf>,

    /// 启动后立即播放的视频
    #[arg(short, long)]
    video: Option<PathBuf>,

    /// 计数类别 (覆盖配置文件)
    #[arg(short, long)]
    target: Option<String>,

    /// 检测框标签字体
    #[arg(long)]
    font: Option<PathBuf>,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "车辆计数".to_owned(),
        window_width: 1320,
        window_height: 760,
        high_dpi: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    telemetry::init();
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("❌ {:#}", e);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = AppConfig::load(&args.config);
    if let Some(model) = args.model {
        config.model_path = model;
    }
    if let Some(target) = args.target {
        config.target_label = target;
    }
    if let Some(font) = args.font {
        config.font_path = Some(font);
    }
    config.validate()?;
    config.print_summary();

    // 模型只在启动时加载一次
    let detector = Yolov8Detector::load(config.detector_config())?;

    let mailbox = Arc::new(FrameMailbox::new());
    let (sender, dispatcher) = result_channel();
    let mut dispatcher = dispatcher.with_log_prefix(config.log_prefix.clone());
    let mut worker = InferenceWorker::spawn(
        Arc::clone(&mailbox),
        detector,
        sender,
        config.worker_config(),
    )
    .context("failed to start inference thread")?;

    let mut session = SessionController::new(
        Arc::clone(&mailbox),
        config.original_view,
        config.capture_interval(),
    );
    let mut viewer = Viewer::new(&config);

    if let Some(video) = args.video {
        open_video(&mut session, &mut viewer, &video);
    }

    prevent_quit();
    loop {
        if is_quit_requested() {
            break;
        }

        session.tick(&mut viewer);
        dispatcher.pump(&mut viewer);

        viewer.draw();
        let actions = viewer.draw_egui(&dispatcher, session.is_active());
        if let Some(path) = actions.open {
            open_video(&mut session, &mut viewer, &path);
        }
        if actions.stop {
            session.stop(&mut viewer);
        }

        next_frame().await;
    }

    info!("👋 窗口关闭, 正在退出...");
    session.stop(&mut viewer);
    worker.shutdown();
    let cycles = worker.cycles();
    info!(
        "推理统计: 完成 {} 次, 失败 {} 次",
        cycles.completed, cycles.failed
    );
    Ok(())
}

fn open_video(session: &mut SessionController, viewer: &mut Viewer, path: &Path) {
    match session.open(path) {
        Ok(()) => viewer.remember(path),
        Err(e) => viewer.append_log_line(&format!("⚠️ {}", e)),
    }
}
