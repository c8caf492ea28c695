//! Sinks that hold on to rendered frames for the host.

use crate::error::StageError;
use crate::frame::VideoFrame;
use crate::stage::{FrameRenderer, Geometry, Rotation};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct SlotShared {
    latest: Mutex<Option<VideoFrame>>,
    frames: AtomicU64,
}

/// Keeps the most recent frame it was given, rotated by the stage's
/// accumulated rotation. The frame outlives a surface teardown so the host
/// can still read it afterwards.
///
/// Clones share the same slot, so one clone can be handed to a stage
/// while the host keeps another to read from.
#[derive(Clone)]
pub struct FrameSlot {
    name: String,
    rotation: Rotation,
    shared: Arc<SlotShared>,
}

impl FrameSlot {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rotation: Rotation::NONE,
            shared: Arc::default(),
        }
    }

    /// Latest frame, if any arrived yet.
    pub fn latest(&self) -> Option<VideoFrame> {
        self.shared.latest.lock().clone()
    }

    /// Takes the latest frame out of the slot.
    pub fn take(&self) -> Option<VideoFrame> {
        self.shared.latest.lock().take()
    }

    pub fn frames(&self) -> u64 {
        self.shared.frames.load(Ordering::Relaxed)
    }
}

impl FrameRenderer for FrameSlot {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, geometry: Geometry) {
        self.rotation = geometry.rotation;
    }

    fn render(&mut self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
        let input = input.ok_or(StageError::MissingInput)?;
        let frame = match self.rotation.quarter_turns() {
            0 => input.clone(),
            turns => input.rotated(turns)?,
        };
        *self.shared.latest.lock() = Some(frame);
        self.shared.frames.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }
}
