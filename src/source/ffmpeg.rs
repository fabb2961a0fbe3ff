// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// FFmpeg 视频文件解码器
/// FFmpeg-backed file decoder (mp4/avi/...).
///
/// ez-ffmpeg 是推送式的: 解码线程通过帧过滤器把RGB帧写入容量为2的通道,
/// 通道满时阻塞, 因此解码速度跟随采集节拍. 停止时丢弃接收端,
/// 过滤器下一次发送失败即结束解码.
///
/// Reads never wait on the decoder thread: an empty channel is reported as
/// `PipelineError::NotReady` and the capture tick is skipped. Rewinding
/// starts a fresh decoder and returns at once.
use super::FrameSource;
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Frame as AvFrame, Input};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

enum DecodeEvent {
    Frame { width: u32, height: u32, rgb: Vec<u8> },
    /// FFmpeg 无法打开或启动
    Failed(String),
    End,
}

struct Decoder {
    rx: Receiver<DecodeEvent>,
    stop: Arc<AtomicBool>,
    /// 输入打开结果, 只有首次打开时等待
    ready: Receiver<std::result::Result<(), String>>,
}

/// 解码过滤器: rgb24 AVFrame → 紧凑RGB字节
struct RgbSink {
    tx: Sender<DecodeEvent>,
    stop: Arc<AtomicBool>,
    dropped_frames: usize,
}

impl FrameFilter for RgbSink {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> std::result::Result<(), String> {
        debug!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: AvFrame,
        _ctx: &FrameFilterContext,
    ) -> std::result::Result<Option<AvFrame>, String> {
        if self.stop.load(Ordering::Relaxed) {
            return Err("decoder stopped".to_string());
        }

        unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.dropped_frames += 1;
                return Ok(None);
            }

            let w = (*frame.as_ptr()).width as u32;
            let h = (*frame.as_ptr()).height as u32;
            let data = (*frame.as_ptr()).data[0];
            let stride = (*frame.as_ptr()).linesize[0] as usize;
            let row_len = w as usize * 3;

            if w == 0 || h == 0 || data.is_null() || stride < row_len {
                self.dropped_frames += 1;
                return Ok(None);
            }

            // 去掉行对齐填充
            let mut rgb = Vec::with_capacity(row_len * h as usize);
            for y in 0..h as usize {
                let row = std::slice::from_raw_parts(data.add(y * stride), row_len);
                rgb.extend_from_slice(row);
            }

            self.tx
                .send(DecodeEvent::Frame {
                    width: w,
                    height: h,
                    rgb,
                })
                .map_err(|_| "frame receiver dropped".to_string())?;
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        if self.dropped_frames > 0 {
            warn!("⚠️ 解码丢弃 {} 帧", self.dropped_frames);
        }
        let _ = self.tx.try_send(DecodeEvent::End);
        debug!("✅ 解码线程退出");
    }
}

/// 启动解码线程 (立即返回)
fn spawn_decoder(path: &Path) -> std::io::Result<Decoder> {
    let (tx, rx) = bounded(2);
    let (ready_tx, ready_rx) = bounded::<std::result::Result<(), String>>(1);
    let stop = Arc::new(AtomicBool::new(false));

    let status_tx = tx.clone();
    let sink = RgbSink {
        tx,
        stop: Arc::clone(&stop),
        dropped_frames: 0,
    };
    let input = path.to_string_lossy().into_owned();

    std::thread::Builder::new()
        .name("ffmpeg-decode".to_string())
        .spawn(move || {
            let fail = |reason: String| {
                let _ = status_tx.try_send(DecodeEvent::Failed(reason.clone()));
                let _ = ready_tx.try_send(Err(reason));
            };

            let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
            let pipe = pipe.filter("rgb", Box::new(sink));
            let out = create_null_output().add_frame_pipeline(pipe);

            let ctx = match FfmpegContext::builder()
                .input(Input::new(input.as_str()))
                .filter_descs(["format=rgb24"].into())
                .output(out)
                .build()
            {
                Ok(ctx) => ctx,
                Err(e) => return fail(format!("构建失败: {}", e)),
            };

            let sch = match ctx.start() {
                Ok(sch) => sch,
                Err(e) => return fail(format!("启动失败: {}", e)),
            };

            let _ = ready_tx.try_send(Ok(()));
            drop(status_tx);
            let _ = sch.wait();
        })?;

    Ok(Decoder {
        rx,
        stop,
        ready: ready_rx,
    })
}

pub struct FfmpegSource {
    path: PathBuf,
    rx: Option<Receiver<DecodeEvent>>,
    stop: Arc<AtomicBool>,
    dims: Option<(u32, u32)>,
    next_id: u64,
}

impl FfmpegSource {
    /// 打开视频; 等待 FFmpeg 确认输入可解码后返回
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let unavailable = |reason: String| PipelineError::unavailable(path.display().to_string(), reason);

        let decoder = spawn_decoder(&path).map_err(|e| unavailable(e.to_string()))?;
        match decoder.ready.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => return Err(unavailable(reason)),
            Err(_) => return Err(unavailable("decoder thread exited".to_string())),
        }

        info!("🎬 视频打开: {}", path.display());
        Ok(Self {
            path,
            rx: Some(decoder.rx),
            stop: decoder.stop,
            dims: None,
            next_id: 0,
        })
    }

    fn stop_decoder(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // 丢弃接收端, 阻塞中的发送随之失败
        self.rx = None;
    }
}

impl FrameSource for FfmpegSource {
    fn read_next(&mut self) -> Result<Option<Frame>> {
        let rx = self
            .rx
            .as_ref()
            .ok_or_else(|| PipelineError::Decode("source closed".to_string()))?;

        match rx.try_recv() {
            Ok(DecodeEvent::Frame { width, height, rgb }) => {
                self.next_id += 1;
                self.dims = Some((width, height));
                Frame::from_rgb(self.next_id, width, height, rgb)
                    .map(Some)
                    .ok_or_else(|| PipelineError::Decode("frame size mismatch".to_string()))
            }
            Ok(DecodeEvent::Failed(reason)) => {
                self.stop_decoder();
                Err(PipelineError::Decode(reason))
            }
            Ok(DecodeEvent::End) | Err(TryRecvError::Disconnected) => Ok(None),
            Err(TryRecvError::Empty) => Err(PipelineError::NotReady),
        }
    }

    fn seek_to_start(&mut self) -> Result<()> {
        if self.rx.is_none() {
            return Err(PipelineError::Decode("source closed".to_string()));
        }
        self.stop_decoder();

        // 新解码线程在后台打开文件, 期间读取返回 NotReady
        let decoder = spawn_decoder(&self.path).map_err(|e| PipelineError::Decode(e.to_string()))?;
        self.rx = Some(decoder.rx);
        self.stop = decoder.stop;
        Ok(())
    }

    fn close(&mut self) {
        if self.rx.is_some() {
            self.stop_decoder();
            info!("⏹️ 视频关闭: {}", self.path.display());
        }
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        self.dims
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.close();
    }
}
