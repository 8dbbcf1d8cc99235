//! Media handler for chemical table files.
//!
//! [`MolHandler`] turns a molfile or reaction file into a PNG thumbnail:
//!
//! ```text
//! normalise params ─▶ deferred? ─▶ stored error? ─▶ cached SVG? ─┬─▶ rasterize
//!                                                    │ no        │
//!                                                    └─▶ convert ┘─▶ import SVG
//! ```
//!
//! The handler owns no vector logic itself: SVG → PNG is delegated to a
//! [`VectorRasterizer`], and the source format is a plain field, so one type
//! serves every format the active converter supports.

use crate::config::{RenderConfig, SourceFormat};
use crate::error::{MolPreviewError, TransformError};
use crate::output::{NormalisedParams, Thumbnail, ThumbnailParams, TransformFlags, TransformResult};
use crate::pipeline::input::append_extension;
use crate::pipeline::intermediate::{convert_to_intermediate, is_usable};
use crate::pipeline::metadata::{extract_metadata, extract_metadata_with, metadata_json};
use crate::pipeline::render::{RsvgRasterizer, VectorRasterizer};
use crate::repo::{intermediate_key, ArtifactStore, SourceFile};
use crate::sniff::ChemicalMime;
use bytesize::ByteSize;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempPath;
use tracing::{debug, warn};

/// Source format rendered for a MIME type, if any.
///
/// SD, RD and RG files are recognised but have no renderer.
pub fn handler_for_mime(mime: &str) -> Option<SourceFormat> {
    match ChemicalMime::from_mime(mime)? {
        ChemicalMime::Molfile => Some(SourceFormat::Mol),
        ChemicalMime::Rxnfile => Some(SourceFormat::Rxn),
        ChemicalMime::Sdfile | ChemicalMime::Rdfile | ChemicalMime::Rgfile => None,
    }
}

/// Renders one chemical source format to PNG previews.
#[derive(Clone)]
pub struct MolHandler {
    config: Arc<RenderConfig>,
    format: SourceFormat,
    rasterizer: Arc<dyn VectorRasterizer>,
}

impl std::fmt::Debug for MolHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MolHandler")
            .field("format", &self.format)
            .field("converter", &self.config.registry.active_id())
            .field("rasterizer", &"<dyn VectorRasterizer>")
            .finish()
    }
}

impl MolHandler {
    pub fn new(
        config: Arc<RenderConfig>,
        format: SourceFormat,
        rasterizer: Arc<dyn VectorRasterizer>,
    ) -> Self {
        Self {
            config,
            format,
            rasterizer,
        }
    }

    /// Handler using [`RsvgRasterizer`] configured from `config`.
    pub fn with_default_rasterizer(config: Arc<RenderConfig>, format: SourceFormat) -> Self {
        let rasterizer = Arc::new(RsvgRasterizer::from_config(&config));
        Self::new(config, format, rasterizer)
    }

    /// Handler for `mime`, or `None` when that type is not renderable.
    pub fn for_mime(
        config: Arc<RenderConfig>,
        mime: &str,
        rasterizer: Arc<dyn VectorRasterizer>,
    ) -> Option<Self> {
        handler_for_mime(mime).map(|format| Self::new(config, format, rasterizer))
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn is_animated_image(&self) -> bool {
        false
    }

    /// True if the active converter can depict this handler's format.
    pub fn can_render(&self) -> bool {
        self.config.registry.active_is_capable(self.format)
    }

    /// Fit `params` to the file's recorded dimensions.
    pub fn normalise_params(
        &self,
        file: &SourceFile,
        params: &ThumbnailParams,
    ) -> Result<NormalisedParams, TransformError> {
        params
            .normalise(file.width(), file.height(), self.config.max_vector_size)
            .map_err(|detail| TransformError::InvalidParams { detail })
    }

    /// Produce a thumbnail of `file` at `dst_path`.
    ///
    /// The intermediate SVG is looked up in `store` first and imported there
    /// after a fresh conversion. Local SVG copies are removed on every path.
    ///
    /// # Errors
    /// `Err` only for fatal configuration problems; render failures come back
    /// as `Ok(Err(TransformError))`.
    pub fn do_transform(
        &self,
        store: &dyn ArtifactStore,
        file: &SourceFile,
        dst_path: &Path,
        dst_url: &str,
        params: &ThumbnailParams,
        flags: TransformFlags,
    ) -> Result<TransformResult, MolPreviewError> {
        let p = match self.normalise_params(file, params) {
            Ok(p) => p,
            Err(e) => return Ok(Err(e)),
        };
        let thumbnail = Thumbnail {
            path: dst_path.to_path_buf(),
            url: dst_url.to_string(),
            width: p.width,
            height: p.height,
        };

        if flags.render_later {
            return Ok(Ok(thumbnail));
        }

        if let Some(err) = file.metadata.as_ref().and_then(|m| m.error.as_ref()) {
            return Ok(Err(TransformError::failed(
                p.width,
                p.height,
                format!("Invalid SVG file: {}", err.message),
            )));
        }

        if let Some(parent) = dst_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("cannot create {}: {}", parent.display(), e);
                return Ok(Err(TransformError::failed(
                    p.width,
                    p.height,
                    "Could not create destination directory",
                )));
            }
        }

        // The SVG is cached as a "thumbnail" whose name ends with the real
        // file name, so it is purged together with the file's thumbnails.
        let cache_key = intermediate_key(store, file);
        let cached = self.fetch_cached(store, &cache_key);

        let status = match &cached {
            Some(copy) => {
                debug!("SVG thumb exists at {}. Re-using.", copy.display());
                self.rasterize_ctf(&file.path, dst_path, p.physical_width, p.physical_height, copy)
            }
            None => {
                let svg = TempPath::from_path(append_extension(dst_path, "svg"));
                let status = self.rasterize_ctf(
                    &file.path,
                    dst_path,
                    p.physical_width,
                    p.physical_height,
                    &svg,
                );
                if is_usable(&svg) {
                    if let Err(e) = store.quick_import(&svg, &cache_key) {
                        warn!(
                            "Cannot copy SVG file ({}) to repo ({}) because {}",
                            svg.display(),
                            cache_key,
                            e
                        );
                    }
                }
                status
            }
        };
        drop(cached);

        Ok(status?.map(|()| thumbnail))
    }

    /// Local copy of the cached SVG, if there is a usable one.
    fn fetch_cached(&self, store: &dyn ArtifactStore, key: &str) -> Option<TempPath> {
        if !store.file_exists(key) {
            return None;
        }
        match store.local_copy(key) {
            Ok(copy) if is_usable(&copy) => Some(copy),
            Ok(_) => {
                warn!("cached SVG {} is empty, regenerating", key);
                None
            }
            Err(e) => {
                warn!("cannot fetch cached SVG {}: {}", key, e);
                None
            }
        }
    }

    /// Convert `src` to a PNG at `dst` outside of thumbnail contexts.
    ///
    /// The SVG goes to `<dst>.svg` and is removed afterwards.
    pub fn rasterize(
        &self,
        src: &Path,
        dst: &Path,
        width: u32,
        height: u32,
    ) -> Result<TransformResult<()>, MolPreviewError> {
        let svg = TempPath::from_path(append_extension(dst, "svg"));
        self.rasterize_ctf(src, dst, width, height, &svg)
    }

    /// CTF → SVG (unless `svg` already holds one) → PNG.
    fn rasterize_ctf(
        &self,
        src: &Path,
        dst: &Path,
        width: u32,
        height: u32,
        svg: &Path,
    ) -> Result<TransformResult<()>, MolPreviewError> {
        if let Err(e) = convert_to_intermediate(&self.config, self.format, src, svg, width, height)? {
            return Ok(Err(e));
        }
        Ok(self.rasterizer.rasterize(svg, dst, width, height))
    }

    /// Serialised [`crate::VectorMetadata`] for a source file.
    ///
    /// See [`crate::pipeline::metadata::extract_metadata`].
    pub fn get_metadata(
        &self,
        source: &Path,
        temp_base: &Path,
    ) -> Result<TransformResult<String>, MolPreviewError> {
        extract_metadata(
            &self.config,
            self.format,
            self.rasterizer.as_ref(),
            source,
            temp_base,
        )
    }

    /// [`Self::get_metadata`] sharing the intermediate cache of `file`.
    ///
    /// A usable cached SVG is read instead of running the converter. After
    /// a fresh conversion the SVG is imported under the intermediate key, so
    /// the first [`Self::do_transform`] of `file` does not convert again.
    /// Import failures are logged and otherwise ignored.
    pub fn get_metadata_cached(
        &self,
        store: &dyn ArtifactStore,
        file: &SourceFile,
        temp_base: &Path,
    ) -> Result<TransformResult<String>, MolPreviewError> {
        let key = intermediate_key(store, file);
        if let Some(cached) = self.fetch_cached(store, &key) {
            debug!("metadata for {} from cached SVG {}", file.name, key);
            return metadata_json(&self.rasterizer.metadata(&cached)).map(Ok);
        }
        extract_metadata_with(
            &self.config,
            self.format,
            self.rasterizer.as_ref(),
            &file.path,
            temp_base,
            |svg| {
                if let Err(e) = store.quick_import(svg, &key) {
                    warn!("could not cache SVG {}: {}", key, e);
                }
            },
        )
    }

    /// One-line description shown under the file.
    pub fn long_desc(&self, file: &SourceFile) -> String {
        format!(
            "{} × {} pixels, file size: {}, MIME type: {}",
            file.width(),
            file.height(),
            ByteSize::b(file.size),
            file.mime
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::render::VectorMetadata;
    use crate::repo::FsArtifactStore;

    struct NeverRasterizer;

    impl VectorRasterizer for NeverRasterizer {
        fn rasterize(&self, _: &Path, _: &Path, w: u32, h: u32) -> TransformResult<()> {
            Err(TransformError::failed(w, h, "should not be called"))
        }
        fn metadata(&self, _: &Path) -> VectorMetadata {
            VectorMetadata::from_error("should not be called")
        }
    }

    fn handler(format: SourceFormat, converter: &str) -> MolHandler {
        let config = RenderConfig::builder().converter(converter).build().unwrap();
        MolHandler::new(Arc::new(config), format, Arc::new(NeverRasterizer))
    }

    fn sized_file(w: u32, h: u32) -> SourceFile {
        SourceFile::new("Ethanol.mol", "/nonexistent/Ethanol.mol").with_metadata(VectorMetadata {
            width: w,
            height: h,
            original_width: None,
            original_height: None,
            error: None,
        })
    }

    #[test]
    fn mime_to_handler() {
        assert_eq!(handler_for_mime("chemical/x-mdl-molfile"), Some(SourceFormat::Mol));
        assert_eq!(handler_for_mime("chemical/x-mdl-rxnfile"), Some(SourceFormat::Rxn));
        assert_eq!(handler_for_mime("chemical/x-mdl-sdfile"), None);
        assert_eq!(handler_for_mime("image/png"), None);
    }

    #[test]
    fn can_render_follows_converter_capability() {
        assert!(handler(SourceFormat::Rxn, "indigo").can_render());
        assert!(!handler(SourceFormat::Rxn, "babel").can_render());
        assert!(handler(SourceFormat::Mol, "babel").can_render());
        assert!(!handler(SourceFormat::Mol, "babel").is_animated_image());
    }

    #[test]
    fn invalid_params_return_immediately() {
        let root = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(root.path());
        let result = handler(SourceFormat::Mol, "indigo")
            .do_transform(
                &store,
                &SourceFile::new("x.mol", "/x"),
                &root.path().join("t.png"),
                "/t.png",
                &ThumbnailParams::with_width(100),
                TransformFlags::default(),
            )
            .unwrap();
        assert!(matches!(result, Err(TransformError::InvalidParams { .. })));
    }

    #[test]
    fn render_later_does_no_work() {
        let root = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(root.path());
        let dst = root.path().join("deep/dir/t.png");
        let thumb = handler(SourceFormat::Mol, "indigo")
            .do_transform(
                &store,
                &sized_file(400, 200),
                &dst,
                "/thumb/t.png",
                &ThumbnailParams::with_width(100),
                TransformFlags::later(),
            )
            .unwrap()
            .unwrap();
        assert_eq!((thumb.width, thumb.height), (100, 50));
        assert_eq!(thumb.path, dst);
        assert!(!dst.parent().unwrap().exists(), "nothing may be created");
    }

    #[test]
    fn stored_metadata_error_short_circuits() {
        let root = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(root.path());
        let mut file = sized_file(100, 100);
        if let Some(m) = file.metadata.as_mut() {
            m.error = Some(crate::pipeline::render::StoredError {
                message: "no <svg> root element found".into(),
            });
        }
        let err = handler(SourceFormat::Mol, "indigo")
            .do_transform(
                &store,
                &file,
                &root.path().join("t.png"),
                "/t.png",
                &ThumbnailParams::with_width(50),
                TransformFlags::default(),
            )
            .unwrap()
            .unwrap_err();
        assert_eq!(err.dimensions(), Some((50, 50)));
        assert!(err.to_string().contains("no <svg> root"));
    }

    #[test]
    fn incapable_converter_is_fatal_not_a_transform_error() {
        let root = tempfile::tempdir().unwrap();
        let store = FsArtifactStore::new(root.path());
        let err = handler(SourceFormat::Rxn, "babel")
            .do_transform(
                &store,
                &sized_file(10, 10),
                &root.path().join("t.png"),
                "/t.png",
                &ThumbnailParams::with_width(10),
                TransformFlags::default(),
            )
            .unwrap_err();
        assert!(matches!(err, MolPreviewError::ConverterNotCapable { .. }));
        assert!(!root.path().join("t.png.svg").exists());
    }

    #[test]
    fn long_desc_mentions_size_and_type() {
        let mut file = sized_file(300, 200).with_mime("chemical/x-mdl-molfile");
        file.size = 2048;
        let desc = handler(SourceFormat::Mol, "indigo").long_desc(&file);
        assert_eq!(
            desc,
            format!(
                "300 × 200 pixels, file size: {}, MIME type: chemical/x-mdl-molfile",
                ByteSize::kib(2)
            )
        );
        assert!(!desc.contains("2048"), "size must be human-formatted: {desc}");
    }

    #[test]
    fn small_sizes_stay_in_bytes() {
        let mut file = sized_file(1, 1);
        file.size = 12;
        let desc = handler(SourceFormat::Mol, "indigo").long_desc(&file);
        assert!(desc.contains(&format!("file size: {},", ByteSize::b(12))), "{desc}");
        assert!(desc.contains("12"), "{desc}");
    }
}
