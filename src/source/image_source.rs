//! Still-image source.

use crate::error::StageError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::stage::{FrameRenderer, Geometry, RenderSize};
use anyhow::{Context, Result};
use std::path::Path;
use std::time::Instant;
use tracing::info;

/// Emits the same picture every tick, scaled to the render size.
pub struct ImageSource {
    name: String,
    original: VideoFrame,
    scaled: Option<VideoFrame>,
    size: RenderSize,
    start: Instant,
}

impl ImageSource {
    /// Loads any format the `image` crate can decode.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .with_context(|| format!("Failed to load image {:?}", path))?
            .to_rgba8();
        info!("Loaded image source {:?} ({}x{})", path, img.width(), img.height());

        let frame = VideoFrame::from_data(img.width(), img.height(), PixelFormat::Rgba, img.into_raw());
        Ok(Self::from_frame(path.display().to_string(), frame))
    }

    pub fn from_frame(name: impl Into<String>, frame: VideoFrame) -> Self {
        Self {
            name: name.into(),
            original: frame,
            scaled: None,
            size: RenderSize::default(),
            start: Instant::now(),
        }
    }
}

impl FrameRenderer for ImageSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, geometry: Geometry) {
        if geometry.size != self.size {
            self.size = geometry.size;
            self.scaled = None;
        }
    }

    fn render(&mut self, _input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
        if self.scaled.is_none() {
            let scaled = if self.size.is_empty() {
                self.original.to_rgba()
            } else {
                self.original.resized(self.size.width, self.size.height)?
            };
            self.scaled = Some(scaled);
        }

        let timestamp_us = self.start.elapsed().as_micros() as u64;
        Ok(self.scaled.clone().map(|frame| frame.with_timestamp(timestamp_us)))
    }

    fn release(&mut self) {
        self.scaled = None;
    }
}
