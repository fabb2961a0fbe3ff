// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

/// GIF 动画解码器
use super::FrameSource;
use crate::error::{PipelineError, Result};
use crate::frame::Frame;
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, Frames, ImageDecoder};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

pub struct GifSource {
    path: PathBuf,
    frames: Option<Frames<'static>>,
    dims: (u32, u32),
    next_id: u64,
}

impl GifSource {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (frames, dims) = decode(&path)
            .map_err(|reason| PipelineError::unavailable(path.display().to_string(), reason))?;

        tracing::debug!("🎞️ GIF打开: {} ({}x{})", path.display(), dims.0, dims.1);
        Ok(Self {
            path,
            frames: Some(frames),
            dims,
            next_id: 0,
        })
    }
}

fn decode(path: &Path) -> std::result::Result<(Frames<'static>, (u32, u32)), String> {
    let file = File::open(path).map_err(|e| e.to_string())?;
    let decoder = GifDecoder::new(BufReader::new(file)).map_err(|e| e.to_string())?;
    let dims = decoder.dimensions();
    Ok((decoder.into_frames(), dims))
}

impl FrameSource for GifSource {
    fn read_next(&mut self) -> Result<Option<Frame>> {
        let frames = self
            .frames
            .as_mut()
            .ok_or_else(|| PipelineError::Decode("source closed".to_string()))?;

        match frames.next() {
            None => Ok(None),
            Some(Err(e)) => Err(PipelineError::Decode(e.to_string())),
            Some(Ok(frame)) => {
                let rgb = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();
                self.next_id += 1;
                Ok(Some(Frame::new(self.next_id, rgb)))
            }
        }
    }

    fn seek_to_start(&mut self) -> Result<()> {
        if self.frames.is_none() {
            return Err(PipelineError::Decode("source closed".to_string()));
        }
        let (frames, _) = decode(&self.path).map_err(PipelineError::Decode)?;
        self.frames = Some(frames);
        Ok(())
    }

    fn close(&mut self) {
        self.frames = None;
    }

    fn dimensions(&self) -> Option<(u32, u32)> {
        Some(self.dims)
    }
}
