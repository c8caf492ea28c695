//! Source stages that originate a frame every tick.

mod image_source;
mod pattern;

pub use image_source::ImageSource;
pub use pattern::PatternSource;
