//! Render stages: the nodes of the pipeline graph.
//!
//! A [`Stage`] owns the graph-facing state of a node (its downstream
//! targets, its render size and rotation) and wraps a [`FrameRenderer`]
//! that does the actual pixel work. Edges between stages are non-owning;
//! ownership of every stage lives with the [`RenderPipeline`](crate::pipeline::RenderPipeline).

mod geometry;

pub use geometry::{Geometry, RenderSize, Rotation};

use crate::error::StageError;
use crate::frame::VideoFrame;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Shared handle to a stage.
pub type StageHandle = Arc<Stage>;

/// Unique stage identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StageId(u64);

impl StageId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Stage({})", self.0)
    }
}

/// Position a stage may occupy in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRole {
    /// Produces frames; has no upstream.
    Source,
    /// Transforms a frame and fans it out.
    Filter,
    /// Fixed terminal stage of the main chain.
    EndPoint,
    /// Extra terminal stage hanging off any chain stage.
    Output,
}

/// The pixel work behind a stage.
///
/// Sources are called with `None` and return the frame they produce.
/// Filters transform their input. Sinks consume it and return `None`.
/// All methods run on the render thread.
pub trait FrameRenderer: Send {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Called before the next frame whenever the stage's geometry changed.
    fn configure(&mut self, _geometry: Geometry) {}

    /// Render one frame.
    fn render(&mut self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError>;

    /// Release GPU-side resources. Must be safe to call before the first
    /// frame; a later `render` is expected to re-acquire what it needs.
    fn release(&mut self) {}
}

#[derive(Default)]
struct GeometryState {
    current: Geometry,
    dirty: bool,
}

/// A node in the render graph.
pub struct Stage {
    id: StageId,
    role: StageRole,
    name: String,
    targets: Mutex<Vec<Weak<Stage>>>,
    geometry: Mutex<GeometryState>,
    renderer: Mutex<Box<dyn FrameRenderer>>,
    live: AtomicBool,
}

impl Stage {
    /// Wraps a renderer in a new stage with the given role.
    pub fn new(role: StageRole, renderer: impl FrameRenderer + 'static) -> StageHandle {
        Self::from_boxed(role, Box::new(renderer))
    }

    pub fn from_boxed(role: StageRole, renderer: Box<dyn FrameRenderer>) -> StageHandle {
        Arc::new(Self {
            id: StageId::next(),
            role,
            name: renderer.name().to_string(),
            targets: Mutex::new(Vec::new()),
            geometry: Mutex::new(GeometryState::default()),
            renderer: Mutex::new(renderer),
            live: AtomicBool::new(true),
        })
    }

    pub fn source(renderer: impl FrameRenderer + 'static) -> StageHandle {
        Self::new(StageRole::Source, renderer)
    }

    pub fn filter(renderer: impl FrameRenderer + 'static) -> StageHandle {
        Self::new(StageRole::Filter, renderer)
    }

    pub fn output(renderer: impl FrameRenderer + 'static) -> StageHandle {
        Self::new(StageRole::Output, renderer)
    }

    pub fn id(&self) -> StageId {
        self.id
    }

    pub fn role(&self) -> StageRole {
        self.role
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Adds a downstream edge. Self-edges and duplicates are ignored.
    pub fn add_target(&self, target: &StageHandle) -> bool {
        if target.id == self.id {
            return false;
        }
        let mut targets = self.targets.lock();
        targets.retain(|t| t.strong_count() > 0);
        if targets.iter().any(|t| Self::points_to(t, target)) {
            return false;
        }
        targets.push(Arc::downgrade(target));
        true
    }

    /// Removes a downstream edge, returning whether it existed.
    pub fn remove_target(&self, target: &Stage) -> bool {
        let mut targets = self.targets.lock();
        let before = targets.len();
        targets.retain(|t| t.strong_count() > 0 && !Self::points_to(t, target));
        targets.len() != before
    }

    pub fn clear_targets(&self) {
        self.targets.lock().clear();
    }

    pub fn has_target(&self, target: &Stage) -> bool {
        self.targets.lock().iter().any(|t| Self::points_to(t, target))
    }

    /// Live downstream targets, in insertion order.
    pub fn targets(&self) -> Vec<StageHandle> {
        self.targets.lock().iter().filter_map(Weak::upgrade).collect()
    }

    pub fn set_render_size(&self, width: u32, height: u32) {
        let mut geometry = self.geometry.lock();
        let size = RenderSize::new(width, height);
        if geometry.current.size != size {
            geometry.current.size = size;
            geometry.dirty = true;
        }
    }

    /// Rotates further by `rotation`, on top of what was already applied.
    pub fn set_rotation(&self, rotation: Rotation) {
        let mut geometry = self.geometry.lock();
        geometry.current.rotation = geometry.current.rotation.then(rotation);
        geometry.dirty = true;
    }

    pub fn reset_rotation(&self) {
        let mut geometry = self.geometry.lock();
        if geometry.current.rotation != Rotation::NONE {
            geometry.current.rotation = Rotation::NONE;
            geometry.dirty = true;
        }
    }

    pub fn render_size(&self) -> RenderSize {
        self.geometry.lock().current.size
    }

    pub fn rotation(&self) -> Rotation {
        self.geometry.lock().current.rotation
    }

    /// Renders one frame, applying any pending geometry first.
    pub fn render(&self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
        let pending = {
            let mut geometry = self.geometry.lock();
            std::mem::take(&mut geometry.dirty).then_some(geometry.current)
        };

        let mut renderer = self.renderer.lock();
        self.live.store(true, Ordering::SeqCst);
        if let Some(geometry) = pending {
            renderer.configure(geometry);
        }
        renderer.render(input)
    }

    /// Releases the renderer's resources. Repeated calls are no-ops until
    /// the stage renders again.
    pub fn destroy(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            tracing::debug!("Destroying {} ({})", self.id, self.name);
            self.renderer.lock().release();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        !self.live.load(Ordering::SeqCst)
    }

    fn points_to(edge: &Weak<Stage>, stage: &Stage) -> bool {
        std::ptr::eq(edge.as_ptr(), stage)
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("id", &self.id)
            .field("role", &self.role)
            .field("name", &self.name)
            .finish()
    }
}
