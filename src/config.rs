//! Configuration types for chemical table file rendering.
//!
//! Everything the pipeline needs to know about the installation lives in
//! [`RenderConfig`]: which depiction tool is active, where tools are
//! installed, the per-converter command templates, and the process limits.
//! The config is built once at startup (from defaults, the builder, or a JSON
//! file) and passed by reference into every component. Nothing reads ambient
//! global state.

use crate::error::MolPreviewError;
use crate::registry::{ConverterRegistry, ConverterSpec};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default directory searched for the depiction and SVG tools.
pub const DEFAULT_TOOL_DIR: &str = "/usr/bin";

/// Default command used to turn the intermediate SVG into a PNG.
///
/// Uses the same placeholder syntax as converter templates plus `$width`
/// and `$height`.
pub const DEFAULT_SVG_CONVERTER_COMMAND: &str =
    "$path/rsvg-convert -w $width -h $height -o $output $input";

/// Configuration for sniffing and rendering chemical table files.
///
/// Built via [`RenderConfig::builder()`], [`RenderConfig::default()`] or
/// [`RenderConfig::from_json_file`].
///
/// # Example
/// ```rust
/// use molpreview::RenderConfig;
///
/// let config = RenderConfig::builder()
///     .converter("babel")
///     .tool_dir("/opt/openbabel/bin")
///     .timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.registry.active_id(), "babel");
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Active converter plus the table of known converters.
    #[serde(flatten)]
    pub registry: ConverterRegistry,

    /// Directory holding the depiction tool. `None` leaves `$path/` empty so
    /// the shell resolves the binary through `PATH`. Default: `/usr/bin`.
    pub tool_dir: Option<PathBuf>,

    /// Wall-clock limit for one external process, in seconds. Default: 60.
    ///
    /// The process is killed when it expires and the transform fails.
    pub timeout_secs: u64,

    /// Largest edge, in pixels, a rendered preview may have. Default: 5120.
    pub max_vector_size: u32,

    /// Command template for the SVG → PNG step.
    pub svg_converter_command: String,

    /// Directory holding the SVG rasterizer. Default: `/usr/bin`.
    pub svg_converter_dir: Option<PathBuf>,

    /// Memory ceiling for the SVG rasterizer in KiB. 0 disables the limit.
    pub svg_converter_memory_kib: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            registry: ConverterRegistry::default(),
            tool_dir: Some(PathBuf::from(DEFAULT_TOOL_DIR)),
            timeout_secs: 60,
            max_vector_size: 5120,
            svg_converter_command: DEFAULT_SVG_CONVERTER_COMMAND.to_string(),
            svg_converter_dir: Some(PathBuf::from(DEFAULT_TOOL_DIR)),
            svg_converter_memory_kib: crate::registry::DEFAULT_MEMORY_KIB,
        }
    }
}

impl fmt::Debug for RenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderConfig")
            .field("converter", &self.registry.active_id())
            .field("converters", &self.registry.ids().collect::<Vec<_>>())
            .field("tool_dir", &self.tool_dir)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_vector_size", &self.max_vector_size)
            .field("svg_converter_command", &self.svg_converter_command)
            .finish()
    }
}

impl RenderConfig {
    /// Create a new builder for `RenderConfig`.
    pub fn builder() -> RenderConfigBuilder {
        RenderConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load a configuration from a JSON file.
    ///
    /// Missing keys fall back to the defaults, so a file containing only
    /// `{"converter": "babel"}` is valid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, MolPreviewError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| MolPreviewError::ConfigRead {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        Self::from_json_str(&text).map_err(|e| match e {
            MolPreviewError::InvalidConfig(detail) => MolPreviewError::ConfigRead {
                path: path.to_path_buf(),
                detail,
            },
            other => other,
        })
    }

    /// Parse and validate a configuration from a JSON string.
    pub fn from_json_str(text: &str) -> Result<Self, MolPreviewError> {
        let config: RenderConfig = serde_json::from_str(text)
            .map_err(|e| MolPreviewError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants every other component relies on.
    pub fn validate(&self) -> Result<(), MolPreviewError> {
        self.registry.active()?;
        for (id, spec) in self.registry.iter() {
            if !spec.command.contains("$input") || !spec.command.contains("$output") {
                return Err(MolPreviewError::InvalidConfig(format!(
                    "command for converter '{id}' must contain $input and $output"
                )));
            }
        }
        if self.timeout_secs == 0 {
            return Err(MolPreviewError::InvalidConfig(
                "timeout_secs must be ≥ 1".into(),
            ));
        }
        if self.max_vector_size == 0 {
            return Err(MolPreviewError::InvalidConfig(
                "max_vector_size must be ≥ 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`RenderConfig`].
#[derive(Debug)]
pub struct RenderConfigBuilder {
    config: RenderConfig,
}

impl RenderConfigBuilder {
    /// Select the active converter by identifier.
    pub fn converter(mut self, id: impl Into<String>) -> Self {
        self.config.registry.set_active(id);
        self
    }

    /// Register (or replace) a converter.
    pub fn add_converter(mut self, id: impl Into<String>, spec: ConverterSpec) -> Self {
        self.config.registry.insert(id, spec);
        self
    }

    pub fn tool_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tool_dir = Some(dir.into());
        self
    }

    /// Resolve tools through `PATH` instead of a fixed directory.
    pub fn no_tool_dir(mut self) -> Self {
        self.config.tool_dir = None;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    pub fn max_vector_size(mut self, px: u32) -> Self {
        self.config.max_vector_size = px;
        self
    }

    pub fn svg_converter_command(mut self, command: impl Into<String>) -> Self {
        self.config.svg_converter_command = command.into();
        self
    }

    pub fn svg_converter_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.config.svg_converter_dir = dir;
        self
    }

    pub fn svg_converter_memory_kib(mut self, kib: u64) -> Self {
        self.config.svg_converter_memory_kib = kib;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<RenderConfig, MolPreviewError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Source format a depiction tool is asked to read.
///
/// Substituted into `$format` and used as the extension of the temporary
/// copy made during metadata extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// MDL molfile (single structure).
    Mol,
    /// MDL reaction file.
    Rxn,
}

impl SourceFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SourceFormat::Mol => "mol",
            SourceFormat::Rxn => "rxn",
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = MolPreviewError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mol" => Ok(SourceFormat::Mol),
            "rxn" => Ok(SourceFormat::Rxn),
            other => Err(MolPreviewError::InvalidConfig(format!(
                "unknown source format '{other}' (expected mol or rxn)"
            ))),
        }
    }
}
