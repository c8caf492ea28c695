//! Animated test pattern, rendered on the CPU.

use crate::error::StageError;
use crate::frame::{PixelFormat, VideoFrame};
use crate::stage::{FrameRenderer, Geometry, RenderSize};
use std::time::Instant;

/// Scrolling RGB gradient at the current render size.
pub struct PatternSource {
    size: RenderSize,
    frame_index: u64,
    start: Instant,
}

impl PatternSource {
    pub fn new() -> Self {
        Self {
            size: RenderSize::default(),
            frame_index: 0,
            start: Instant::now(),
        }
    }

    fn draw(&self) -> VideoFrame {
        let RenderSize { width, height } = self.size;
        let mut frame = VideoFrame::new(width, height, PixelFormat::Rgba);
        let shift = (self.frame_index % 256) as u32;

        for (i, pixel) in frame.data.chunks_exact_mut(4).enumerate() {
            let x = i as u32 % width;
            let y = i as u32 / width;
            pixel[0] = ((x * 255 / width.max(1) + shift) % 256) as u8;
            pixel[1] = (y * 255 / height.max(1)) as u8;
            pixel[2] = (255 - shift) as u8;
            pixel[3] = 255;
        }
        frame
    }
}

impl Default for PatternSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameRenderer for PatternSource {
    fn name(&self) -> &str {
        "pattern"
    }

    fn configure(&mut self, geometry: Geometry) {
        self.size = geometry.size;
    }

    fn render(&mut self, _input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
        if self.size.is_empty() {
            return Ok(None);
        }

        let frame = self.draw().with_timestamp(self.start.elapsed().as_micros() as u64);
        self.frame_index += 1;
        Ok(Some(frame))
    }
}
