//! Single fragment-shader pass as a filter stage.

use super::{GpuContext, ShaderSource};
use crate::error::StageError;
use crate::frame::{PixelFormat, QuadVertex, VideoFrame};
use crate::stage::{FrameRenderer, Geometry, RenderSize};
use anyhow::Result;
use std::borrow::Cow;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};
use wgpu::util::DeviceExt;

/// Default vertex shader in WGSL.
const VERTEX_SHADER: &str = r#"
struct VertexInput {
    @location(0) position: vec2<f32>,
    @location(1) tex_coords: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) tex_coords: vec2<f32>,
}

@vertex
fn vs_main(in: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = vec4<f32>(in.position, 0.0, 1.0);
    out.tex_coords = in.tex_coords;
    return out;
}
"#;

/// Uniforms passed to the shader at binding 2.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Uniforms {
    pub time: f32,
    pub width: f32,
    pub height: f32,
    pub seed: f32,
}

/// Size-independent GPU objects: pipeline, quad buffers, sampler, uniforms.
struct PassResources {
    render_pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    uniform_buffer: wgpu::Buffer,
    sampler: wgpu::Sampler,
}

/// Textures and buffers tied to one input/output size.
struct FrameTargets {
    input_size: RenderSize,
    output_size: RenderSize,
    input_texture: wgpu::Texture,
    output_texture: wgpu::Texture,
    readback_buffer: wgpu::Buffer,
    padded_bytes_per_row: u32,
    bind_group: wgpu::BindGroup,
}

/// Runs one fragment shader over every frame it receives.
///
/// Only the shader text is prepared up front. GPU objects are created on
/// the render thread at the first frame and dropped again by `release`.
pub struct ShaderFilter {
    name: String,
    context: Arc<GpuContext>,
    fragment_wgsl: String,
    entry_point: &'static str,
    output_size: RenderSize,
    start: Instant,
    pass: Option<PassResources>,
    targets: Option<FrameTargets>,
}

impl ShaderFilter {
    /// Validates the shader; fails on GLSL/WGSL errors without touching the GPU.
    pub fn new(context: Arc<GpuContext>, source: &ShaderSource) -> Result<Self> {
        let (fragment_wgsl, entry_point) = source.to_wgsl()?;
        let name = source.label();
        info!("Prepared shader filter {}", name);

        Ok(Self {
            name,
            context,
            fragment_wgsl,
            entry_point,
            output_size: RenderSize::default(),
            start: Instant::now(),
            pass: None,
            targets: None,
        })
    }

    fn create_pass(&self) -> PassResources {
        let device = &self.context.device;

        let vertex_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Vertex Shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(VERTEX_SHADER)),
        });
        let fragment_module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(&format!("Fragment Shader {}", self.name)),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(self.fragment_wgsl.as_str())),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(&format!("Render Pipeline {}", self.name)),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &vertex_module,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &fragment_module,
                entry_point: Some(self.entry_point),
                targets: &[Some(wgpu::ColorTargetState {
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Vertex Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::VERTICES),
            usage: wgpu::BufferUsages::VERTEX,
        });

        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Index Buffer"),
            contents: bytemuck::cast_slice(QuadVertex::INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Uniform Buffer"),
            contents: bytemuck::cast_slice(&[Uniforms { time: 0.0, width: 0.0, height: 0.0, seed: 0.0 }]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Texture Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        PassResources {
            render_pipeline,
            bind_group_layout,
            vertex_buffer,
            index_buffer,
            uniform_buffer,
            sampler,
        }
    }

    fn create_targets(&self, pass: &PassResources, input_size: RenderSize, output_size: RenderSize) -> FrameTargets {
        let device = &self.context.device;
        debug!("Creating GPU targets for {} (input {}, output {})", self.name, input_size, output_size);

        let input_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Input Texture"),
            size: wgpu::Extent3d { width: input_size.width, height: input_size.height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        let output_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Output Texture"),
            size: wgpu::Extent3d { width: output_size.width, height: output_size.height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        // Buffer copies need 256-byte aligned rows.
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = (output_size.width * 4).div_ceil(align) * align;
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: padded_bytes_per_row as wgpu::BufferAddress * output_size.height as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let input_view = input_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Bind Group"),
            layout: &pass.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: wgpu::BindingResource::TextureView(&input_view) },
                wgpu::BindGroupEntry { binding: 1, resource: wgpu::BindingResource::Sampler(&pass.sampler) },
                wgpu::BindGroupEntry { binding: 2, resource: pass.uniform_buffer.as_entire_binding() },
            ],
        });

        FrameTargets {
            input_size,
            output_size,
            input_texture,
            output_texture,
            readback_buffer,
            padded_bytes_per_row,
            bind_group,
        }
    }

    fn draw(&self, pass: &PassResources, targets: &FrameTargets, input: &VideoFrame) -> Result<Vec<u8>, StageError> {
        let device = &self.context.device;
        let queue = &self.context.queue;
        let RenderSize { width, height } = targets.output_size;

        let uniforms = Uniforms {
            time: self.start.elapsed().as_secs_f32(),
            width: width as f32,
            height: height as f32,
            seed: rand::random::<f32>(),
        };
        queue.write_buffer(&pass.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        queue.write_texture(
            wgpu::TexelCopyTextureInfo { texture: &targets.input_texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            &input.data,
            wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(input.width * 4), rows_per_image: Some(input.height) },
            wgpu::Extent3d { width: input.width, height: input.height, depth_or_array_layers: 1 },
        );

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Render Encoder") });
        {
            let output_view = targets.output_texture.create_view(&wgpu::TextureViewDescriptor::default());
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &output_view,
                    resolve_target: None,
                    ops: wgpu::Operations { load: wgpu::LoadOp::Clear(wgpu::Color::BLACK), store: wgpu::StoreOp::Store },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
                multiview_mask: None,
            });

            render_pass.set_pipeline(&pass.render_pipeline);
            render_pass.set_bind_group(0, &targets.bind_group, &[]);
            render_pass.set_vertex_buffer(0, pass.vertex_buffer.slice(..));
            render_pass.set_index_buffer(pass.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..QuadVertex::INDICES.len() as u32, 0, 0..1);
        }

        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo { texture: &targets.output_texture, mip_level: 0, origin: wgpu::Origin3d::ZERO, aspect: wgpu::TextureAspect::All },
            wgpu::TexelCopyBufferInfo {
                buffer: &targets.readback_buffer,
                layout: wgpu::TexelCopyBufferLayout { offset: 0, bytes_per_row: Some(targets.padded_bytes_per_row), rows_per_image: Some(height) },
            },
            wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = targets.readback_buffer.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        device
            .poll(wgpu::PollType::Wait { submission_index: None, timeout: None })
            .map_err(|e| StageError::Gpu(format!("{:?}", e)))?;
        receiver
            .recv()
            .map_err(|e| StageError::Gpu(e.to_string()))?
            .map_err(|e| StageError::Gpu(e.to_string()))?;

        let row_bytes = (width * 4) as usize;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        {
            let mapped = buffer_slice.get_mapped_range();
            for row in mapped.chunks(targets.padded_bytes_per_row as usize).take(height as usize) {
                pixels.extend_from_slice(&row[..row_bytes]);
            }
        }
        targets.readback_buffer.unmap();
        Ok(pixels)
    }
}

impl FrameRenderer for ShaderFilter {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, geometry: Geometry) {
        self.output_size = geometry.size;
    }

    fn render(&mut self, input: Option<&VideoFrame>) -> Result<Option<VideoFrame>, StageError> {
        let input = input.ok_or(StageError::MissingInput)?.to_rgba();
        if input.data.len() != input.expected_len() {
            return Err(StageError::FrameSize { width: input.width, height: input.height });
        }

        let input_size = RenderSize::new(input.width, input.height);
        if input_size.is_empty() {
            return Ok(None);
        }
        let output_size = if self.output_size.is_empty() { input_size } else { self.output_size };

        let pass = match self.pass.take() {
            Some(pass) => pass,
            None => self.create_pass(),
        };
        let targets = match self.targets.take() {
            Some(t) if t.input_size == input_size && t.output_size == output_size => t,
            _ => self.create_targets(&pass, input_size, output_size),
        };

        let result = self.draw(&pass, &targets, &input);
        self.pass = Some(pass);
        self.targets = Some(targets);

        let pixels = result?;
        let mut frame = VideoFrame::from_data(output_size.width, output_size.height, PixelFormat::Rgba, pixels);
        frame.timestamp_us = input.timestamp_us;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.pass.is_some() || self.targets.is_some() {
            debug!("Releasing GPU resources of {}", self.name);
        }
        self.targets = None;
        self.pass = None;
    }
}
