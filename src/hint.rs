//! Extension hints: refine a generic MIME guess using the file extension.
//!
//! Content sniffing is authoritative. The extension is only consulted when
//! generic detection degraded to `text/plain` and the extension is one of the
//! chemical table file extensions, since every CTF is plain text and a
//! truncated or unusual file may escape the sniffing rules.

use crate::sniff::{ChemicalMime, ProbeBuffer};
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

/// Generic fallback for readable text.
pub const TEXT_PLAIN: &str = "text/plain";

/// Generic fallback for binary data.
pub const OCTET_STREAM: &str = "application/octet-stream";

const CHEM_EXTENSIONS: &[&str] = &["mol", "sdf", "rxn", "rd", "rg"];

/// Maps a file extension to a MIME type.
pub trait MimeResolver: Send + Sync {
    /// MIME type for `ext` (no leading dot), or `None` if unknown.
    fn guess_types_for_extension(&self, ext: &str) -> Option<String>;
}

/// Built-in extension table: the chemical types plus a few common ones.
#[derive(Debug, Clone)]
pub struct StaticMimeResolver {
    table: HashMap<String, String>,
}

impl Default for StaticMimeResolver {
    fn default() -> Self {
        let mut table: HashMap<String, String> = ChemicalMime::ALL
            .into_iter()
            .map(|m| (m.extension().to_string(), m.as_str().to_string()))
            .collect();
        for (ext, mime) in [
            ("txt", TEXT_PLAIN),
            ("svg", "image/svg+xml"),
            ("png", "image/png"),
            ("jpg", "image/jpeg"),
            ("jpeg", "image/jpeg"),
            ("pdf", "application/pdf"),
        ] {
            table.insert(ext.to_string(), mime.to_string());
        }
        Self { table }
    }
}

impl StaticMimeResolver {
    /// Add or override one mapping.
    pub fn with(mut self, ext: &str, mime: &str) -> Self {
        self.table.insert(ext.to_ascii_lowercase(), mime.to_string());
        self
    }
}

impl MimeResolver for StaticMimeResolver {
    fn guess_types_for_extension(&self, ext: &str) -> Option<String> {
        self.table.get(&ext.to_ascii_lowercase()).cloned()
    }
}

/// True if `ext` is a chemical table file extension (case-insensitive).
pub fn is_chem_file_extension(ext: &str) -> bool {
    CHEM_EXTENSIONS.iter().any(|e| e.eq_ignore_ascii_case(ext))
}

/// Improve a previously detected MIME type from the file extension.
///
/// Only a `text/plain` guess paired with a chemical extension is re-resolved
/// through `resolver`; every other input is returned unchanged.
pub fn improve_from_extension(resolver: &dyn MimeResolver, ext: &str, mime: &str) -> String {
    if mime == TEXT_PLAIN && is_chem_file_extension(ext) {
        if let Some(better) = resolver.guess_types_for_extension(ext) {
            debug!("improved {} to {} from extension .{}", mime, better, ext);
            return better;
        }
    }
    mime.to_string()
}

/// Full detection for a file on disk: sniff, fall back to a generic type,
/// then apply the extension hint.
pub fn guess_mime(path: impl AsRef<Path>, resolver: &dyn MimeResolver) -> std::io::Result<String> {
    let path = path.as_ref();
    let probe = ProbeBuffer::from_path(path)?;
    let label = path.to_string_lossy();

    let mime = match probe.classify(&label) {
        Some(chem) => chem.as_str().to_string(),
        None => generic_mime(&probe).to_string(),
    };

    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(improve_from_extension(resolver, &ext, &mime))
}

fn generic_mime(probe: &ProbeBuffer) -> &'static str {
    if probe.head.contains(&0) {
        OCTET_STREAM
    } else {
        TEXT_PLAIN
    }
}
