//! SVG rasterisation and SVG metadata.
//!
//! The intermediate SVG is turned into the final PNG by a generic vector
//! rasterizer. The pipeline only talks to it through [`VectorRasterizer`];
//! [`RsvgRasterizer`] is the stock implementation that shells out to
//! `rsvg-convert` (or whatever `svg_converter_command` names) and reads the
//! produced PNG back with `image` to make sure it is a real raster.
//!
//! ## Why not trust exit code 0?
//!
//! Some rasterizers exit 0 after writing a truncated file when they hit the
//! memory ceiling mid-render. Decoding the PNG header costs microseconds and
//! turns that into a proper error thumbnail.

use crate::config::RenderConfig;
use crate::error::TransformError;
use crate::output::TransformResult;
use crate::pipeline::exec::run_shell;
use crate::registry::{escape_shell_arg, substitute_placeholders, tool_prefix};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Size assumed for an SVG that declares neither width, height nor viewBox.
pub const DEFAULT_SVG_SIZE: u32 = 512;

/// A stored metadata extraction failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredError {
    pub message: String,
}

/// Dimensions parsed from an SVG root element.
///
/// When parsing fails the error is recorded in `error` instead of being
/// returned, so hosts persist it and later transforms short-circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMetadata {
    pub width: u32,
    pub height: u32,
    /// Raw `width` attribute, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_width: Option<String>,
    /// Raw `height` attribute, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_height: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<StoredError>,
}

impl VectorMetadata {
    pub fn from_error(message: impl Into<String>) -> Self {
        Self {
            width: 0,
            height: 0,
            original_width: None,
            original_height: None,
            error: Some(StoredError {
                message: message.into(),
            }),
        }
    }
}

/// Generic vector → raster capability consumed by the CTF pipeline.
pub trait VectorRasterizer: Send + Sync {
    /// Render `svg` to a `width`×`height` raster at `dst`.
    fn rasterize(&self, svg: &Path, dst: &Path, width: u32, height: u32) -> TransformResult<()>;

    /// Parse dimensions from `svg`. Failures land in `error`.
    fn metadata(&self, svg: &Path) -> VectorMetadata;
}

/// Shell-command rasterizer, `rsvg-convert` by default.
#[derive(Debug, Clone)]
pub struct RsvgRasterizer {
    command: String,
    tool_dir: Option<PathBuf>,
    memory_kib: u64,
    timeout: Duration,
}

impl RsvgRasterizer {
    pub fn from_config(config: &RenderConfig) -> Self {
        Self {
            command: config.svg_converter_command.clone(),
            tool_dir: config.svg_converter_dir.clone(),
            memory_kib: config.svg_converter_memory_kib,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn command_for(&self, svg: &Path, dst: &Path, width: u32, height: u32) -> String {
        substitute_placeholders(
            &self.command,
            &[
                ("$path/", tool_prefix(self.tool_dir.as_deref())),
                ("$width", width.to_string()),
                ("$height", height.to_string()),
                ("$input", escape_shell_arg(&svg.to_string_lossy())),
                ("$output", escape_shell_arg(&dst.to_string_lossy())),
            ],
        )
    }
}

impl VectorRasterizer for RsvgRasterizer {
    fn rasterize(&self, svg: &Path, dst: &Path, width: u32, height: u32) -> TransformResult<()> {
        let command = self.command_for(svg, dst, width, height);
        let output = run_shell(&command, self.memory_kib, self.timeout).map_err(|e| {
            TransformError::failed(width, height, format!("could not start rasterizer: {e}"))
        })?;

        if !output.success() {
            warn!(
                "rasterizer failed: exit code {}, stderr {:?}, command: {}",
                output.exit_code(),
                output.stderr.trim(),
                command
            );
            let _ = std::fs::remove_file(dst);
            return Err(TransformError::failed(
                width,
                height,
                output.diagnostic(self.timeout),
            ));
        }

        match image::image_dimensions(dst) {
            Ok((w, h)) => {
                debug!("Rasterised {} → {}x{} px", svg.display(), w, h);
                Ok(())
            }
            Err(e) => {
                let _ = std::fs::remove_file(dst);
                Err(TransformError::failed(
                    width,
                    height,
                    format!("rasterizer produced an unreadable image: {e}"),
                ))
            }
        }
    }

    fn metadata(&self, svg: &Path) -> VectorMetadata {
        match std::fs::read_to_string(svg) {
            Ok(text) => parse_svg_metadata(&text),
            Err(e) => VectorMetadata::from_error(format!("cannot read {}: {e}", svg.display())),
        }
    }
}

// ── SVG dimension parsing ────────────────────────────────────────────────────

static RE_SVG_ROOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<svg\b([^>]*)>").unwrap());

static RE_WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)width\s*=\s*["']([^"']*)["']"#).unwrap());

static RE_HEIGHT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)height\s*=\s*["']([^"']*)["']"#).unwrap());

static RE_VIEWBOX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?:^|\s)viewBox\s*=\s*["']([^"']*)["']"#).unwrap());

static RE_LENGTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([0-9]*\.?[0-9]+(?:[eE][-+]?[0-9]+)?)\s*(em|ex|px|pt|pc|cm|mm|in|%)?\s*$").unwrap());

/// Read width and height from the root `<svg>` element.
///
/// Units are converted to pixels at 90 dpi; percentages are taken relative to
/// [`DEFAULT_SVG_SIZE`]. A missing edge is derived from the viewBox aspect
/// ratio.
pub fn parse_svg_metadata(text: &str) -> VectorMetadata {
    let Some(root) = RE_SVG_ROOT.captures(text) else {
        return VectorMetadata::from_error("no <svg> root element found");
    };
    let attrs = &root[1];

    let attr = |re: &Regex| re.captures(attrs).map(|c| c[1].trim().to_string());
    let original_width = attr(&RE_WIDTH);
    let original_height = attr(&RE_HEIGHT);

    let view_box = attr(&RE_VIEWBOX).and_then(|vb| {
        let nums: Vec<f64> = vb
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect();
        match nums.as_slice() {
            [_, _, w, h] if *w > 0.0 && *h > 0.0 => Some((*w, *h)),
            _ => None,
        }
    });

    let (default_width, aspect) = match view_box {
        Some((w, h)) => (w, Some(w / h)),
        None => (DEFAULT_SVG_SIZE as f64, None),
    };

    let width = original_width.as_deref().and_then(scale_svg_unit);
    let height = original_height.as_deref().and_then(scale_svg_unit);

    let (width, height) = match (width, height, aspect) {
        (Some(w), Some(h), _) => (w, h),
        (Some(w), None, Some(a)) => (w, w / a),
        (None, Some(h), Some(a)) => (h * a, h),
        (Some(w), None, None) => (w, w),
        (None, Some(h), None) => (h, h),
        (None, None, Some(a)) => (default_width, default_width / a),
        (None, None, None) => (DEFAULT_SVG_SIZE as f64, DEFAULT_SVG_SIZE as f64),
    };

    VectorMetadata {
        width: (width.round() as u32).max(1),
        height: (height.round() as u32).max(1),
        original_width,
        original_height,
        error: None,
    }
}

/// Convert an SVG length to pixels. `None` for unparseable or non-positive.
fn scale_svg_unit(length: &str) -> Option<f64> {
    let caps = RE_LENGTH.captures(length)?;
    let value: f64 = caps[1].parse().ok()?;
    let factor = match caps.get(2).map(|m| m.as_str()) {
        None | Some("px") => 1.0,
        Some("pt") => 1.25,
        Some("pc") => 15.0,
        Some("mm") => 3.543307,
        Some("cm") => 35.43307,
        Some("in") => 90.0,
        Some("em") => 16.0,
        Some("ex") => 12.0,
        Some("%") => DEFAULT_SVG_SIZE as f64 / 100.0,
        Some(_) => return None,
    };
    let px = value * factor;
    (px > 0.0).then_some(px)
}
