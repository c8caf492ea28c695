//! GPU shader filter stages.

mod gpu_context;
mod shader_filter;

pub use gpu_context::GpuContext;
pub use shader_filter::{ShaderFilter, Uniforms};

use anyhow::{anyhow, Result};
use naga::front::glsl::{Frontend, Options};
use naga::valid::{Capabilities, ValidationFlags, Validator};
use naga::ShaderStage;
use std::path::PathBuf;

/// Shader source with language specification.
#[derive(Debug, Clone)]
pub enum ShaderSource {
    /// GLSL fragment shader; entry point `main`
    Glsl { code: String, path: Option<PathBuf> },
    /// WGSL fragment shader; entry point `fs_main`
    Wgsl { code: String, path: Option<PathBuf> },
}

impl ShaderSource {
    /// Reads a shader file, picking the language from its extension
    /// (`.wgsl` is WGSL, anything else GLSL).
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let code = std::fs::read_to_string(&path).map_err(|e| anyhow!("Failed to read shader {:?}: {}", path, e))?;
        let is_wgsl = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("wgsl"));
        Ok(if is_wgsl {
            ShaderSource::Wgsl { code, path: Some(path) }
        } else {
            ShaderSource::Glsl { code, path: Some(path) }
        })
    }

    /// Short label for logs and GPU object names.
    pub fn label(&self) -> String {
        let path = match self {
            ShaderSource::Glsl { path, .. } | ShaderSource::Wgsl { path, .. } => path,
        };
        path.as_ref()
            .and_then(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "inline shader".to_string())
    }

    /// Validates the shader and returns WGSL plus its fragment entry point.
    pub fn to_wgsl(&self) -> Result<(String, &'static str)> {
        match self {
            ShaderSource::Glsl { code, .. } => Ok((glsl_to_wgsl(code)?, "main")),
            ShaderSource::Wgsl { code, .. } => {
                validate_wgsl(code)?;
                Ok((code.clone(), "fs_main"))
            }
        }
    }
}

/// Converts a GLSL fragment shader to WGSL.
pub fn glsl_to_wgsl(glsl: &str) -> Result<String> {
    let mut frontend = Frontend::default();
    let options = Options::from(ShaderStage::Fragment);
    let module = frontend.parse(&options, glsl).map_err(|e| anyhow!("GLSL parse error: {:?}", e))?;

    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    let info = validator.validate(&module).map_err(|e| anyhow!("Shader validation error: {:?}", e))?;
    naga::back::wgsl::write_string(&module, &info, naga::back::wgsl::WriterFlags::empty())
        .map_err(|e| anyhow!("WGSL generation error: {:?}", e))
}

/// Parses and validates WGSL so a broken shader is rejected before it
/// reaches the device.
pub fn validate_wgsl(wgsl: &str) -> Result<()> {
    let module = naga::front::wgsl::parse_str(wgsl).map_err(|e| anyhow!("WGSL parse error: {}", e.emit_to_string(wgsl)))?;
    let mut validator = Validator::new(ValidationFlags::all(), Capabilities::all());
    validator.validate(&module).map_err(|e| anyhow!("Shader validation error: {:?}", e))?;
    Ok(())
}
