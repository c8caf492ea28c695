//! Shaderchain CLI: renders a filter chain offscreen and reloads it live.

use anyhow::{Context, Result};
use clap::Parser;
use shaderchain::config::{apply_config, Config, ConfigWatcher, FilterConfig, SourceConfig, StageFactory};
use shaderchain::output::FrameSlot;
use shaderchain::surface::{LoopConfig, RenderLoop};
use shaderchain::RenderPipeline;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// Live-editable GPU filter chain.
#[derive(Parser, Debug)]
#[command(name = "shaderchain")]
#[command(about = "Render a chain of image filters and edit it while it runs")]
struct Args {
    /// Pipeline config (YAML); watched for changes
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Path to GLSL or WGSL fragment shader file(s)
    #[arg(short, long, num_args = 1..)]
    shader: Vec<PathBuf>,

    /// Still image to use as the source instead of the test pattern
    #[arg(long)]
    image: Option<PathBuf>,

    /// Frame width
    #[arg(long, default_value = "1280")]
    width: u32,

    /// Frame height
    #[arg(long, default_value = "720")]
    height: u32,

    /// Target frames per second
    #[arg(long, default_value = "30")]
    fps: u32,

    /// Quarter turns clockwise applied to the output
    #[arg(long, default_value = "0", allow_hyphen_values = true)]
    rotation: i32,

    /// Stop after this many frames (0 runs until Ctrl-C)
    #[arg(long, default_value = "0")]
    frames: u64,

    /// Write the last presented frame to this PNG on exit
    #[arg(long)]
    snapshot: Option<PathBuf>,
}

impl Args {
    /// Config equivalent of the command line flags.
    fn to_config(&self) -> Config {
        let source = match &self.image {
            Some(path) => SourceConfig::Image { path: path.clone() },
            None => SourceConfig::Pattern,
        };
        let filters = self
            .shader
            .iter()
            .map(|path| {
                let is_wgsl = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"));
                if is_wgsl {
                    FilterConfig::Wgsl { path: path.clone() }
                } else {
                    FilterConfig::Glsl { path: path.clone() }
                }
            })
            .collect();

        Config {
            width: self.width,
            height: self.height,
            fps: self.fps,
            rotation: self.rotation,
            source,
            filters,
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    info!("Starting Shaderchain...");

    let mut watcher = match &args.config {
        Some(path) => Some(ConfigWatcher::new(path)?),
        None => None,
    };
    let config = match &watcher {
        Some(watcher) => watcher.current().clone(),
        None => args.to_config(),
    };

    let screen = FrameSlot::new("screen");
    let pipeline = Arc::new(RenderPipeline::new(screen.clone()));
    let mut factory = StageFactory::new();
    apply_config(&pipeline, &mut factory, None, &config)?;
    pipeline.start_render();
    info!("Pipeline ready with {} filters", pipeline.filters().len());

    let render_loop = RenderLoop::spawn(
        pipeline.clone(),
        LoopConfig {
            width: config.width,
            height: config.height,
            fps: config.fps,
            max_frames: (args.frames > 0).then_some(args.frames),
        },
    )
    .context("Failed to start render thread")?;

    let stop = render_loop.stop_flag();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down...");
        stop.store(true, Ordering::SeqCst);
    })?;

    while !render_loop.is_finished() {
        if let Some(watcher) = watcher.as_mut() {
            if let Some(new) = watcher.check_for_changes() {
                match apply_config(&pipeline, &mut factory, Some(watcher.current()), &new) {
                    Ok(()) => watcher.commit(new),
                    Err(e) => error!("Failed to apply config: {:#}", e),
                }
            }
        }
        thread::sleep(Duration::from_millis(50));
    }

    let frames = render_loop.join();
    info!("Rendered {} frames ({} presented)", frames, screen.frames());

    if let Some(path) = &args.snapshot {
        match screen.latest() {
            Some(frame) => {
                let frame = frame.to_rgba();
                image::save_buffer(path, &frame.data, frame.width, frame.height, image::ColorType::Rgba8)
                    .with_context(|| format!("Failed to write snapshot {:?}", path))?;
                info!("Snapshot written to {:?}", path);
            }
            None => warn!("No frame was presented, skipping snapshot"),
        }
    }

    Ok(())
}
