//! Shaderchain: a live-editable chain of image filter stages.
//!
//! Frames flow from one source through an ordered list of filters into an
//! end point, with extra outputs tapping the chain along the way. The chain
//! can be rewired while a render thread keeps ticking.

pub mod config;
pub mod error;
pub mod filter;
pub mod frame;
pub mod output;
pub mod pipeline;
pub mod shader;
pub mod source;
pub mod stage;
pub mod surface;
pub mod utils;

pub use error::StageError;
pub use frame::{PixelFormat, VideoFrame};
pub use pipeline::RenderPipeline;
pub use stage::{FrameRenderer, Stage, StageHandle, StageRole};
pub use surface::{RenderLoop, SurfaceCallbacks};
