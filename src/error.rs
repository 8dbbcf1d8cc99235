//! Error types for the molpreview library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`MolPreviewError`]: **Fatal.** The request cannot be served by this
//!   installation at all (the active converter cannot handle the format,
//!   the configuration is broken, an unknown converter was selected).
//!   Returned as `Err(MolPreviewError)`.
//!
//! * [`TransformError`]: **Recoverable.** This particular file could not be
//!   rendered (converter exited non-zero, produced nothing, bad thumbnail
//!   parameters). Returned *inside* `Ok(..)` so callers can show an error
//!   thumbnail instead of aborting.
//!
//! A capability mismatch is a programming or configuration mistake: hosts are
//! expected to gate on [`crate::MolHandler::can_render`] first. It is never
//! folded into [`TransformError`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the molpreview library.
#[derive(Debug, Error)]
pub enum MolPreviewError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// The active converter does not list the source format as supported.
    #[error(
        "Converting {format} to SVG is not supported by the currently chosen converter '{converter}'"
    )]
    ConverterNotCapable { converter: String, format: String },

    /// The active converter identifier has no entry in the converter table.
    #[error("Unknown converter '{id}'. Known converters: {known}")]
    UnknownConverter { id: String, known: String },

    /// Builder or file validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The JSON configuration file could not be read or parsed.
    #[error("Failed to read configuration '{path}': {detail}")]
    ConfigRead { path: PathBuf, detail: String },

    /// The file was detected as a type no handler can render.
    #[error("'{path}' has MIME type {mime}, which cannot be rendered")]
    NotRenderable { path: PathBuf, mime: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading a source file or writing a temporary copy failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A recoverable failure for a single transform.
///
/// Hosts render this as an error thumbnail of the requested size.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum TransformError {
    /// The requested thumbnail parameters could not be normalised.
    #[error("Invalid thumbnail parameters: {detail}")]
    InvalidParams { detail: String },

    /// The converter or rasterizer failed; carries the requested size.
    #[error("Error creating thumbnail ({width}x{height}): {message}")]
    Failed {
        width: u32,
        height: u32,
        message: String,
    },
}

impl TransformError {
    pub(crate) fn failed(width: u32, height: u32, message: impl Into<String>) -> Self {
        TransformError::Failed {
            width,
            height,
            message: message.into(),
        }
    }

    /// Requested `(width, height)` for failures that carry them.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        match self {
            TransformError::Failed { width, height, .. } => Some((*width, *height)),
            TransformError::InvalidParams { .. } => None,
        }
    }
}
