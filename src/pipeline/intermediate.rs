//! CTF → SVG through the active depiction tool.
//!
//! An SVG already present at the destination is reused as long as it is
//! non-empty. The only success signal from a fresh run is exit code 0 plus
//! a non-empty output file; anything else leaves no SVG behind.

use crate::config::{RenderConfig, SourceFormat};
use crate::error::{MolPreviewError, TransformError};
use crate::output::TransformResult;
use crate::pipeline::exec::run_shell;
use crate::registry::build_command;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// Produce the intermediate SVG for `src` at `svg`.
///
/// `width`/`height` are only used to size the error thumbnail on failure.
///
/// # Errors
/// `Err(MolPreviewError::ConverterNotCapable)` when the active converter
/// cannot read `format`; hosts must gate on capability before calling.
pub fn convert_to_intermediate(
    config: &RenderConfig,
    format: SourceFormat,
    src: &Path,
    svg: &Path,
    width: u32,
    height: u32,
) -> Result<TransformResult<()>, MolPreviewError> {
    let converter = config.registry.converter_for(format)?;

    if is_usable(svg) {
        debug!("SVG exists at {}. Re-using.", svg.display());
        return Ok(Ok(()));
    }
    remove_bad_file(svg);

    let command = build_command(converter, config.tool_dir.as_deref(), format, src, svg);
    let timeout = Duration::from_secs(config.timeout_secs);
    debug!("converting {}: {}", format, command);

    let output = match run_shell(&command, converter.memory_kib, timeout) {
        Ok(output) => output,
        Err(e) => {
            warn!("could not start converter: {} (command: {})", e, command);
            return Ok(Err(TransformError::failed(
                width,
                height,
                format!("could not start converter: {e}"),
            )));
        }
    };

    if !output.success() || !is_usable(svg) {
        warn!(
            "converter failed: exit code {}, timed out {}, stderr {:?}, command: {}",
            output.exit_code(),
            output.timed_out,
            output.stderr.trim(),
            command
        );
        let _ = std::fs::remove_file(svg);
        let message = if output.success() {
            "converter produced no output".to_string()
        } else {
            output.diagnostic(timeout)
        };
        return Ok(Err(TransformError::failed(width, height, message)));
    }

    Ok(Ok(()))
}

/// Exists, is a file, and has at least one byte.
pub fn is_usable(path: &Path) -> bool {
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.len() > 0)
        .unwrap_or(false)
}

/// Delete a zero-length file at `path`. Returns true if one was removed.
pub fn remove_bad_file(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(m) if m.is_file() && m.len() == 0 => {
            debug!("removing empty file {}", path.display());
            std::fs::remove_file(path).is_ok()
        }
        _ => false,
    }
}
