//! Metadata extraction: CTF → temporary SVG → [`VectorMetadata`] JSON.
//!
//! Runs wherever files are uploaded, not only on image scalers, so the
//! depiction tool must be installed there too. Both temporaries (the
//! extension-carrying source copy and the SVG) are held in drop guards and
//! are gone when this function returns, whatever the outcome.

use crate::config::{RenderConfig, SourceFormat};
use crate::error::MolPreviewError;
use crate::output::TransformResult;
use crate::pipeline::input::{append_extension, materialize_with_extension};
use crate::pipeline::intermediate::convert_to_intermediate;
use crate::pipeline::render::{VectorMetadata, VectorRasterizer};
use std::path::Path;
use tempfile::TempPath;
use tracing::debug;

/// Extract serialised metadata for `source`.
///
/// `temp_base` is a writable path prefix; `<temp_base>.<format>` and
/// `<temp_base>.svg` are created and removed.
pub fn extract_metadata(
    config: &RenderConfig,
    format: SourceFormat,
    rasterizer: &dyn VectorRasterizer,
    source: &Path,
    temp_base: &Path,
) -> Result<TransformResult<String>, MolPreviewError> {
    extract_metadata_with(config, format, rasterizer, source, temp_base, |_| {})
}

/// [`extract_metadata`], handing the converted SVG to `keep_svg` before it
/// is removed. Not called when conversion fails.
pub fn extract_metadata_with(
    config: &RenderConfig,
    format: SourceFormat,
    rasterizer: &dyn VectorRasterizer,
    source: &Path,
    temp_base: &Path,
    keep_svg: impl FnOnce(&Path),
) -> Result<TransformResult<String>, MolPreviewError> {
    let svg = TempPath::from_path(append_extension(temp_base, "svg"));
    let source_copy = materialize_with_extension(source, temp_base, format)?;

    let status = convert_to_intermediate(config, format, &source_copy, &svg, 0, 0)?;
    drop(source_copy);
    if let Err(e) = status {
        return Ok(Err(e));
    }

    let metadata: VectorMetadata = rasterizer.metadata(&svg);
    debug!(
        "metadata for {}: {}x{} (error: {:?})",
        source.display(),
        metadata.width,
        metadata.height,
        metadata.error
    );
    keep_svg(&svg);

    metadata_json(&metadata).map(Ok)
}

pub(crate) fn metadata_json(metadata: &VectorMetadata) -> Result<String, MolPreviewError> {
    serde_json::to_string(metadata)
        .map_err(|e| MolPreviewError::Internal(format!("metadata serialisation: {e}")))
}
