//! Stage error type.

/// Failure of a single stage while rendering a frame.
///
/// A failing stage does not stop the render loop: the frame is dropped for
/// that branch of the graph and the tick carries on.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("Stage expected an input frame")]
    MissingInput,

    #[error("Frame data does not match {width}x{height}")]
    FrameSize { width: u32, height: u32 },

    #[error("GPU error: {0}")]
    Gpu(String),
}
