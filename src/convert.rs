//! File-level entry points built on [`MolHandler`].
//!
//! Hosts with their own media repository drive [`MolHandler`] directly. The
//! functions here cover the common case of "a path on disk in, a PNG out":
//! detect the type, extract metadata, then run the transform.

use crate::config::RenderConfig;
use crate::error::MolPreviewError;
use crate::handler::{handler_for_mime, MolHandler};
use crate::hint::{guess_mime, StaticMimeResolver};
use crate::output::{Thumbnail, ThumbnailParams, TransformFlags, TransformResult};
use crate::pipeline::input::resolve_source;
use crate::pipeline::render::{RsvgRasterizer, VectorMetadata, VectorRasterizer};
use crate::repo::{ArtifactStore, SourceFile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Result of [`inspect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub mime: String,
    /// A handler exists for `mime` (independent of converter capability).
    pub renderable: bool,
}

/// Detect the MIME type of a file without running any external tool.
pub fn inspect(path: impl AsRef<Path>) -> Result<FileReport, MolPreviewError> {
    let path = resolve_source(path)?;
    let mime = guess_mime(&path, &StaticMimeResolver::default()).map_err(|e| {
        MolPreviewError::Io {
            path: path.clone(),
            source: e,
        }
    })?;
    let renderable = handler_for_mime(&mime).is_some();
    Ok(FileReport {
        path,
        mime,
        renderable,
    })
}

/// Render `input` to a PNG at `output` using the stock rasterizer.
///
/// See [`render_file_with`].
pub fn render_file(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    params: &ThumbnailParams,
    store: &dyn ArtifactStore,
    config: Arc<RenderConfig>,
) -> Result<TransformResult, MolPreviewError> {
    let rasterizer = Arc::new(RsvgRasterizer::from_config(&config));
    render_file_with(input, output, params, store, config, rasterizer)
}

/// Render `input` to a PNG at `output`.
///
/// The file is cached under a name derived from its canonical path and
/// content (see [`SourceFile::from_local_path`]). On a cold cache metadata
/// extraction converts once and seeds the cache, so the transform that
/// follows only rasterizes.
///
/// # Errors
/// Fatal errors only: unreadable input, a type with no handler
/// ([`MolPreviewError::NotRenderable`]), or a converter that cannot read the
/// detected format.
pub fn render_file_with(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    params: &ThumbnailParams,
    store: &dyn ArtifactStore,
    config: Arc<RenderConfig>,
    rasterizer: Arc<dyn VectorRasterizer>,
) -> Result<TransformResult, MolPreviewError> {
    let start = Instant::now();
    let report = inspect(input)?;
    let output = output.as_ref();

    let handler = MolHandler::for_mime(config, &report.mime, rasterizer).ok_or_else(|| {
        MolPreviewError::NotRenderable {
            path: report.path.clone(),
            mime: report.mime.clone(),
        }
    })?;
    info!(
        "Rendering {} ({}) with converter '{}'",
        report.path.display(),
        report.mime,
        handler.config().registry.active_id()
    );

    let file = SourceFile::from_local_path(&report.path)
        .map_err(|e| MolPreviewError::Io {
            path: report.path.clone(),
            source: e,
        })?
        .with_mime(report.mime);

    let extracted = decode_in_scratch(|base| handler.get_metadata_cached(store, &file, base))?;
    let metadata = match extracted {
        Ok(m) => m,
        Err(e) => return Ok(Err(e)),
    };
    debug!("metadata: {}x{}", metadata.width, metadata.height);
    let file = file.with_metadata(metadata);

    let url = output.to_string_lossy().into_owned();
    let result = handler.do_transform(
        store,
        &file,
        output,
        &url,
        params,
        TransformFlags::default(),
    )?;
    info!(
        "Finished {} in {} ms: {}",
        file.name,
        start.elapsed().as_millis(),
        if result.is_ok() { "ok" } else { "failed" }
    );
    Ok(result)
}

/// Run metadata extraction in a scratch directory and decode the result.
pub fn extract_file_metadata(
    handler: &MolHandler,
    source: &Path,
) -> Result<TransformResult<VectorMetadata>, MolPreviewError> {
    decode_in_scratch(|base| handler.get_metadata(source, base))
}

fn decode_in_scratch(
    extract: impl FnOnce(&Path) -> Result<TransformResult<String>, MolPreviewError>,
) -> Result<TransformResult<VectorMetadata>, MolPreviewError> {
    let scratch = tempfile::Builder::new()
        .prefix("molpreview-meta-")
        .tempdir()
        .map_err(|e| MolPreviewError::Io {
            path: std::env::temp_dir(),
            source: e,
        })?;
    let json = match extract(&scratch.path().join("source"))? {
        Ok(json) => json,
        Err(e) => return Ok(Err(e)),
    };
    let metadata = serde_json::from_str(&json)
        .map_err(|e| MolPreviewError::Internal(format!("metadata decode: {e}")))?;
    Ok(Ok(metadata))
}

/// [`MolHandler::do_transform`] on tokio's blocking pool.
///
/// Converter runs block for up to the configured timeout, so async hosts
/// should call this instead of the handler directly.
pub async fn transform_async(
    handler: MolHandler,
    store: Arc<dyn ArtifactStore>,
    file: SourceFile,
    dst_path: PathBuf,
    dst_url: String,
    params: ThumbnailParams,
    flags: TransformFlags,
) -> Result<TransformResult<Thumbnail>, MolPreviewError> {
    tokio::task::spawn_blocking(move || {
        handler.do_transform(store.as_ref(), &file, &dst_path, &dst_url, &params, flags)
    })
    .await
    .map_err(|e| MolPreviewError::Internal(format!("transform task failed: {e}")))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::FsArtifactStore;

    const ETHANOL: &str = "\n  -ISIS-  \n\n  3  2  0  0  0  0  0  0  0  0999 V2000\n\
    0.0000    0.0000    0.0000 C   0  0\nM  END\n";

    #[test]
    fn inspect_detects_molfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ethanol.mol");
        std::fs::write(&path, ETHANOL).unwrap();
        let report = inspect(&path).unwrap();
        assert_eq!(report.mime, "chemical/x-mdl-molfile");
        assert!(report.renderable);
    }

    #[test]
    fn inspect_plain_text_is_not_renderable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "hello\n").unwrap();
        let report = inspect(&path).unwrap();
        assert_eq!(report.mime, "text/plain");
        assert!(!report.renderable);
    }

    #[test]
    fn inspect_missing_file_is_io_error() {
        let err = inspect("/nonexistent/x.mol").unwrap_err();
        assert!(matches!(err, MolPreviewError::Io { .. }));
    }

    #[test]
    fn render_file_rejects_sdfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("many.sdf");
        std::fs::write(&path, format!("{ETHANOL}$$$$\n")).unwrap();
        let store = FsArtifactStore::new(dir.path().join("store"));
        let err = render_file(
            &path,
            dir.path().join("out.png"),
            &ThumbnailParams::with_width(100),
            &store,
            Arc::new(RenderConfig::default()),
        )
        .unwrap_err();
        match err {
            MolPreviewError::NotRenderable { mime, .. } => {
                assert_eq!(mime, "chemical/x-mdl-sdfile")
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn transform_async_render_later() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(RenderConfig::default());
        let handler =
            MolHandler::with_default_rasterizer(config, crate::config::SourceFormat::Mol);
        let store: Arc<dyn ArtifactStore> = Arc::new(FsArtifactStore::new(dir.path()));
        let file = SourceFile::new("A.mol", dir.path().join("A.mol")).with_metadata(
            crate::pipeline::render::parse_svg_metadata(r#"<svg width="200" height="100">"#),
        );

        let result = transform_async(
            handler,
            store,
            file,
            dir.path().join("A.png"),
            "/thumb/A.png".into(),
            ThumbnailParams::with_width(50),
            TransformFlags::later(),
        )
        .await
        .unwrap();
        let thumb = tokio_test::assert_ok!(result);
        assert_eq!((thumb.width, thumb.height), (50, 25));
        assert_eq!(thumb.url, "/thumb/A.png");
    }
}
