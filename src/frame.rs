//! Video frame types passed between pipeline stages.

use crate::error::StageError;
use bytemuck::{Pod, Zeroable};
use image::imageops;
use image::RgbaImage;

/// Supported pixel formats for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// RGB with 8 bits per channel (24 bits per pixel)
    Rgb,
    /// RGBA with 8 bits per channel (32 bits per pixel)
    Rgba,
}

impl PixelFormat {
    /// Returns the number of bytes per pixel.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// A video frame containing image data.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel format of the frame data
    pub format: PixelFormat,
    /// Timestamp in microseconds (if available)
    pub timestamp_us: Option<u64>,
    /// Raw pixel data
    pub data: Vec<u8>,
}

impl VideoFrame {
    /// Creates a new zeroed video frame with the given dimensions and format.
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        let size = (width as usize) * (height as usize) * format.bytes_per_pixel();
        Self {
            width,
            height,
            format,
            timestamp_us: None,
            data: vec![0; size],
        }
    }

    /// Creates a video frame from existing data.
    pub fn from_data(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            format,
            timestamp_us: None,
            data,
        }
    }

    /// Builder-style timestamp setter.
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = Some(timestamp_us);
        self
    }

    /// Number of bytes the pixel data must hold for this geometry.
    pub fn expected_len(&self) -> usize {
        (self.width as usize) * (self.height as usize) * self.format.bytes_per_pixel()
    }

    /// Converts this frame to RGBA format.
    pub fn to_rgba(&self) -> VideoFrame {
        if self.format == PixelFormat::Rgba {
            return self.clone();
        }

        let pixel_count = (self.width as usize) * (self.height as usize);
        let mut rgba_data = vec![0u8; pixel_count * 4];
        for (dst, src) in rgba_data.chunks_exact_mut(4).zip(self.data.chunks_exact(3)) {
            dst[..3].copy_from_slice(src);
            dst[3] = 255;
        }

        VideoFrame {
            width: self.width,
            height: self.height,
            format: PixelFormat::Rgba,
            timestamp_us: self.timestamp_us,
            data: rgba_data,
        }
    }

    /// Rotates the frame clockwise by `quarter_turns` * 90 degrees.
    /// Negative values rotate counter-clockwise. Always returns RGBA.
    pub fn rotated(&self, quarter_turns: i8) -> Result<VideoFrame, StageError> {
        let turns = quarter_turns.rem_euclid(4);
        let rgba = self.to_rgba();
        if turns == 0 {
            return Ok(rgba);
        }

        let img = rgba.into_image()?;
        let rotated = match turns {
            1 => imageops::rotate90(&img),
            2 => imageops::rotate180(&img),
            _ => imageops::rotate270(&img),
        };

        Ok(VideoFrame {
            width: rotated.width(),
            height: rotated.height(),
            format: PixelFormat::Rgba,
            timestamp_us: self.timestamp_us,
            data: rotated.into_raw(),
        })
    }

    /// Resizes the frame to exactly `width`x`height`. Always converts to RGBA.
    pub fn resized(&self, width: u32, height: u32) -> Result<VideoFrame, StageError> {
        let rgba = self.to_rgba();
        if rgba.width == width && rgba.height == height {
            return Ok(rgba);
        }

        let resize_start = std::time::Instant::now();
        let timestamp_us = rgba.timestamp_us;
        let img = rgba.into_image()?;
        let resized = imageops::resize(&img, width.max(1), height.max(1), imageops::FilterType::Triangle);
        tracing::debug!("    [Perf] resize to {}x{}: {:?}", width, height, resize_start.elapsed());

        Ok(VideoFrame {
            width: resized.width(),
            height: resized.height(),
            format: PixelFormat::Rgba,
            timestamp_us,
            data: resized.into_raw(),
        })
    }

    /// Wraps RGBA data as an `image` buffer.
    fn into_image(self) -> Result<RgbaImage, StageError> {
        let (width, height) = (self.width, self.height);
        RgbaImage::from_raw(width, height, self.data).ok_or(StageError::FrameSize { width, height })
    }
}

/// Vertex for rendering a full-screen quad.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
    pub tex_coords: [f32; 2],
}

impl QuadVertex {
    /// Vertices for a full-screen quad.
    pub const VERTICES: &'static [QuadVertex] = &[
        QuadVertex { position: [-1.0, -1.0], tex_coords: [0.0, 1.0] },
        QuadVertex { position: [1.0, -1.0], tex_coords: [1.0, 1.0] },
        QuadVertex { position: [1.0, 1.0], tex_coords: [1.0, 0.0] },
        QuadVertex { position: [-1.0, 1.0], tex_coords: [0.0, 0.0] },
    ];

    /// Indices for the quad (two triangles).
    pub const INDICES: &'static [u16] = &[0, 1, 2, 2, 3, 0];

    /// Returns the vertex buffer layout.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }
}
