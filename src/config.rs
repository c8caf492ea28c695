//! YAML pipeline description, file watching and live reconfiguration.

use crate::filter::{Grayscale, Invert};
use crate::pipeline::RenderPipeline;
use crate::shader::{GpuContext, ShaderFilter, ShaderSource};
use crate::source::{ImageSource, PatternSource};
use crate::stage::{Stage, StageHandle};
use anyhow::{Context, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Pipeline description.
///
/// ```yaml
/// width: 1280
/// height: 720
/// rotation: 1
/// source:
///   type: image
///   path: photo.png
/// filters:
///   - type: glsl
///     path: shaders/vignette.glsl
///   - type: grayscale
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// Quarter turns clockwise
    pub rotation: i32,
    pub source: SourceConfig,
    pub filters: Vec<FilterConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 30,
            rotation: 0,
            source: SourceConfig::Pattern,
            filters: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourceConfig {
    #[default]
    Pattern,
    Image { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FilterConfig {
    Glsl { path: PathBuf },
    Wgsl { path: PathBuf },
    Invert,
    Grayscale,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid pipeline config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config {:?}", path))?;
        Self::from_yaml(&content)
    }
}

/// Builds stages from their config entries.
///
/// The GPU context is created on first use so pipelines without shader
/// filters never touch the GPU.
#[derive(Default)]
pub struct StageFactory {
    gpu: Option<Arc<GpuContext>>,
}

impl StageFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn gpu(&mut self) -> Result<Arc<GpuContext>> {
        if let Some(gpu) = &self.gpu {
            return Ok(gpu.clone());
        }
        let gpu = GpuContext::shared()?;
        self.gpu = Some(gpu.clone());
        Ok(gpu)
    }

    pub fn source(&mut self, config: &SourceConfig) -> Result<StageHandle> {
        Ok(match config {
            SourceConfig::Pattern => Stage::source(PatternSource::new()),
            SourceConfig::Image { path } => Stage::source(ImageSource::open(path)?),
        })
    }

    pub fn filter(&mut self, config: &FilterConfig) -> Result<StageHandle> {
        Ok(match config {
            FilterConfig::Glsl { path } | FilterConfig::Wgsl { path } => {
                let source = ShaderSource::load(path)?;
                Stage::filter(ShaderFilter::new(self.gpu()?, &source)?)
            }
            FilterConfig::Invert => Stage::filter(Invert),
            FilterConfig::Grayscale => Stage::filter(Grayscale),
        })
    }

    pub fn filters(&mut self, configs: &[FilterConfig]) -> Result<Vec<StageHandle>> {
        configs.iter().map(|config| self.filter(config)).collect()
    }
}

/// Brings a live pipeline from `old` to `new` through the mutation API.
///
/// With no previous config everything is applied. All new stages are built
/// before the first mutation, so a broken shader or missing image leaves
/// the running pipeline untouched.
pub fn apply_config(pipeline: &RenderPipeline, factory: &mut StageFactory, old: Option<&Config>, new: &Config) -> Result<()> {
    let source = match old {
        Some(old) if old.source == new.source => None,
        _ => Some(factory.source(&new.source)?),
    };
    let filters = match old {
        Some(old) if old.filters == new.filters => None,
        _ => Some(factory.filters(&new.filters)?),
    };

    if let Some(source) = source {
        info!("Switching source to {}", source.name());
        pipeline.set_source(source);
    }
    if let Some(filters) = filters {
        info!("Rebuilding filter chain with {} filters", filters.len());
        pipeline.clear_filters();
        for filter in filters {
            pipeline.add_filter(filter);
        }
    }
    if old.is_none_or(|old| (old.width, old.height) != (new.width, new.height)) {
        pipeline.set_render_size(new.width, new.height);
    }
    if old.is_none_or(|old| old.rotation != new.rotation) {
        pipeline.set_rotation(new.rotation);
    }
    if old.is_some_and(|old| old.fps != new.fps) {
        warn!("fps changes take effect on restart");
    }
    Ok(())
}

/// Watches a config file and hands out parsed revisions.
///
/// `current` is the last revision the caller confirmed with `commit`. A
/// revision that failed to apply is diffed against the same baseline again
/// on the next change.
pub struct ConfigWatcher {
    path: PathBuf,
    _watcher: RecommendedWatcher,
    rx: Receiver<std::result::Result<Event, notify::Error>>,
    current_config: Config,
}

impl ConfigWatcher {
    /// Loads the file and starts watching it.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let current_config = Config::load(&path)?;

        let (tx, rx) = channel();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch config file {:?}", path))?;
        info!("Watching config file {:?} for changes", path);

        Ok(Self {
            path,
            _watcher: watcher,
            rx,
            current_config,
        })
    }

    pub fn current(&self) -> &Config {
        &self.current_config
    }

    /// Marks `config` as applied; later revisions are diffed against it.
    pub fn commit(&mut self, config: Config) {
        self.current_config = config;
    }

    /// Returns the new revision if the file changed, still parses and
    /// differs from the committed one.
    pub fn check_for_changes(&mut self) -> Option<Config> {
        let mut needs_reload = false;
        while let Ok(res) = self.rx.try_recv() {
            if let Ok(event) = res {
                if matches!(event.kind, notify::EventKind::Modify(_) | notify::EventKind::Create(_)) {
                    needs_reload = true;
                }
            }
        }

        if !needs_reload {
            return None;
        }

        info!("Config file changed, checking for updates...");
        self.reload()
    }

    fn reload(&self) -> Option<Config> {
        match Config::load(&self.path) {
            Ok(new_config) if new_config == self.current_config => None,
            Ok(new_config) => Some(new_config),
            Err(e) => {
                error!("Failed to reload config: {:#}", e);
                None
            }
        }
    }
}
