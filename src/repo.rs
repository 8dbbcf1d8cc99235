//! Host media repository: source files and the derivative artifact store.
//!
//! The intermediate SVG is cached in the store's thumbnail namespace under a
//! key ending in the source's real name, so purging a file's thumbnails also
//! drops its SVG. This crate never invalidates cache entries itself.

use crate::pipeline::render::VectorMetadata;
use sha2::{Digest, Sha256};
use std::io;
use std::path::{Component, Path, PathBuf};
use tempfile::TempPath;
use tracing::debug;

/// Prefix of the cached intermediate's thumbnail name.
pub const INTERMEDIATE_PREFIX: &str = "molhandler-";

/// An uploaded chemical table file as the host knows it.
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Canonical name in the repository, e.g. `Caffeine.mol`.
    pub name: String,
    /// Local path the converter can read.
    pub path: PathBuf,
    /// Size in bytes.
    pub size: u64,
    pub mime: String,
    /// Metadata recorded at upload time, if any.
    pub metadata: Option<VectorMetadata>,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            size: 0,
            mime: String::new(),
            metadata: None,
        }
    }

    /// Describe a local file, naming it after its file name.
    pub fn from_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            size,
            ..Self::new(name, path)
        })
    }

    /// Describe a local file that has no repository name of its own.
    ///
    /// The name is the file name prefixed with a digest of the canonical
    /// path and the content, so two `x.mol` in different directories, or one
    /// edited in place, never share a cached intermediate.
    pub fn from_local_path(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let canonical = std::fs::canonicalize(path)?;
        let content = std::fs::read(&canonical)?;
        let mut file = Self::from_path(&canonical)?;
        file.name = format!("{}-{}", local_digest(&canonical, &content), file.name);
        file.size = content.len() as u64;
        Ok(file)
    }

    pub fn with_mime(mut self, mime: impl Into<String>) -> Self {
        self.mime = mime.into();
        self
    }

    pub fn with_metadata(mut self, metadata: VectorMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn width(&self) -> u32 {
        self.metadata.as_ref().map_or(0, |m| m.width)
    }

    pub fn height(&self) -> u32 {
        self.metadata.as_ref().map_or(0, |m| m.height)
    }
}

/// Key/value blob store for derived artifacts.
///
/// Implementations must be safe to share between threads; concurrent imports
/// of the same key may race and the last writer wins.
pub trait ArtifactStore: Send + Sync {
    /// Key of derivative `thumb_name` of `file`.
    fn thumb_path(&self, file: &SourceFile, thumb_name: &str) -> String {
        format!("thumb/{}/{}", file.name, thumb_name)
    }

    fn file_exists(&self, key: &str) -> bool;

    /// Fetch a local working copy; it is purged when the guard drops.
    fn local_copy(&self, key: &str) -> io::Result<TempPath>;

    /// Store the local file `src` under `key`.
    fn quick_import(&self, src: &Path, key: &str) -> io::Result<()>;
}

/// First 16 hex digits of SHA-256 over `path`, a NUL, then `content`.
fn local_digest(path: &Path, content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_os_str().as_encoded_bytes());
    hasher.update([0u8]);
    hasher.update(content);
    let hex = format!("{:x}", hasher.finalize());
    hex[..16].to_string()
}

/// Derived key of the cached intermediate SVG for `file`.
pub fn intermediate_key(store: &dyn ArtifactStore, file: &SourceFile) -> String {
    store.thumb_path(file, &format!("{INTERMEDIATE_PREFIX}{}", file.name))
}

/// [`ArtifactStore`] backed by a local directory.
#[derive(Debug, Clone)]
pub struct FsArtifactStore {
    root: PathBuf,
}

impl FsArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key to a path below the root; rejects keys that would escape it.
    pub fn resolve(&self, key: &str) -> io::Result<PathBuf> {
        let rel = Path::new(key);
        let clean = rel
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if key.is_empty() || !clean {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid artifact key '{key}'"),
            ));
        }
        Ok(self.root.join(rel))
    }
}

impl ArtifactStore for FsArtifactStore {
    fn file_exists(&self, key: &str) -> bool {
        self.resolve(key).map(|p| p.is_file()).unwrap_or(false)
    }

    fn local_copy(&self, key: &str) -> io::Result<TempPath> {
        let src = self.resolve(key)?;
        let suffix = src
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        let tmp = tempfile::Builder::new()
            .prefix("molpreview-")
            .suffix(&suffix)
            .tempfile()?
            .into_temp_path();
        std::fs::copy(&src, &tmp)?;
        debug!("local copy of {} at {}", key, tmp.display());
        Ok(tmp)
    }

    fn quick_import(&self, src: &Path, key: &str) -> io::Result<()> {
        let dest = self.resolve(key)?;
        let parent = dest
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "key has no parent"))?;
        std::fs::create_dir_all(parent)?;

        // Write beside the target, then rename: readers never see a partial file.
        let tmp = tempfile::Builder::new()
            .prefix(".import-")
            .tempfile_in(parent)?;
        std::fs::copy(src, tmp.path())?;
        tmp.persist(&dest).map_err(|e| e.error)?;
        debug!("imported {} as {}", src.display(), key);
        Ok(())
    }
}
