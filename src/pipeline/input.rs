//! Input resolution: validate a user-supplied source path and create
//! temporary copies that carry the right extension.
//!
//! Depiction tools pick their parser from the file extension, while hosts
//! usually hand us files under opaque temporary names. Copies are returned as
//! [`TempPath`] guards so they disappear on every exit path, including panics.

use crate::config::SourceFormat;
use crate::error::MolPreviewError;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// Validate that `path` names a readable regular file.
pub fn resolve_source(path: impl AsRef<Path>) -> Result<PathBuf, MolPreviewError> {
    let path = path.as_ref().to_path_buf();

    match std::fs::File::open(&path) {
        Ok(f) => {
            let meta = f.metadata().map_err(|e| MolPreviewError::Io {
                path: path.clone(),
                source: e,
            })?;
            if !meta.is_file() {
                return Err(MolPreviewError::Io {
                    path,
                    source: std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        "not a regular file",
                    ),
                });
            }
        }
        Err(e) => return Err(MolPreviewError::Io { path, source: e }),
    }

    debug!("Resolved source: {}", path.display());
    Ok(path)
}

/// `path` with `.ext` appended (not replacing an existing extension).
pub fn append_extension(path: &Path, ext: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".");
    s.push(ext);
    PathBuf::from(s)
}

/// Copy `source` to `<base>.<format>` and return a guard that deletes it.
///
/// The source itself is never modified.
pub fn materialize_with_extension(
    source: &Path,
    base: &Path,
    format: SourceFormat,
) -> Result<TempPath, MolPreviewError> {
    let dest = append_extension(base, format.as_str());
    // Guard first: a half-written copy is removed too.
    let guard = TempPath::from_path(&dest);
    std::fs::copy(source, &dest).map_err(|e| MolPreviewError::Io {
        path: dest.clone(),
        source: e,
    })?;
    debug!("Copied {} → {}", source.display(), dest.display());
    Ok(guard)
}
