//! CPU filter stages.
//!
//! GPU shader passes live in [`crate::shader`]; these cover the cheap
//! per-pixel cases and let any closure act as a filter.

use crate::error::StageError;
use crate::frame::VideoFrame;
use crate::stage::FrameRenderer;

/// Adapts a closure into a filter renderer.
pub struct FnFilter<F> {
    name: String,
    apply: F,
}

impl<F> FnFilter<F>
where
    F: FnMut(&VideoFrame) -> Result<VideoFrame, StageError> + Send,
{
    pub fn new(name: impl Into<String>, apply: F) -> Self {
        Self {
            name: name.into(),
            apply,
        }
    }
}

impl<F> FrameRenderer for FnFilter<F>
where
    F: FnMut(&VideoFrame) -> Result<VideoFrame, StageError> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn render(&mut self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
        let input = input.ok_or(StageError::MissingInput)?;
        (self.apply)(input).map(Some)
    }
}

/// Inverts the colour channels, leaving alpha alone.
#[derive(Debug, Default)]
pub struct Invert;

impl FrameRenderer for Invert {
    fn name(&self) -> &str {
        "invert"
    }

    fn render(&mut self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
        let mut frame = input.ok_or(StageError::MissingInput)?.to_rgba();
        for pixel in frame.data.chunks_exact_mut(4) {
            for channel in &mut pixel[..3] {
                *channel = 255 - *channel;
            }
        }
        Ok(Some(frame))
    }
}

/// Rec. 709 luma grayscale.
#[derive(Debug, Default)]
pub struct Grayscale;

impl FrameRenderer for Grayscale {
    fn name(&self) -> &str {
        "grayscale"
    }

    fn render(&mut self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
        let mut frame = input.ok_or(StageError::MissingInput)?.to_rgba();
        for pixel in frame.data.chunks_exact_mut(4) {
            let luma = 0.2126 * pixel[0] as f32 + 0.7152 * pixel[1] as f32 + 0.0722 * pixel[2] as f32;
            let luma = luma.round().clamp(0.0, 255.0) as u8;
            pixel[..3].fill(luma);
        }
        Ok(Some(frame))
    }
}
