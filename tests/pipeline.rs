//! Conversion pipeline tests against fake depiction tools.
//!
//! Each test writes a small shell script into a temp dir and points the
//! converter table at it, so no real Indigo or Open Babel is needed. The SVG
//! → PNG step uses an in-process rasterizer that records its calls.

#![cfg(unix)]

use molpreview::{
    intermediate_key, parse_svg_metadata, render_file_with, ArtifactStore, ConverterSpec, FsArtifactStore, MolHandler,
    RenderConfig, SourceFile, SourceFormat, ThumbnailParams, TransformError, TransformFlags,
    TransformResult, VectorMetadata, VectorRasterizer,
};
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

// ── Test helpers ─────────────────────────────────────────────────────────────

const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="200" height="100"><g/></svg>"#;

/// Temp dir holding the fake tool, the artifact store and the outputs.
struct Fixture {
    dir: tempfile::TempDir,
}

impl Fixture {
    fn new() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    /// Install `depict` whose body runs with `$1` = input, `$2` = output.
    /// Every invocation appends a line to `runs.log`.
    fn install_tool(&self, body: &str) {
        let script = format!(
            "#!/bin/sh\necho \"$1\" >> '{}'\n{}\n",
            self.path("runs.log").display(),
            body
        );
        let tool = self.path("bin/depict");
        std::fs::create_dir_all(tool.parent().unwrap()).unwrap();
        std::fs::write(&tool, script).unwrap();
        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    fn install_svg_tool(&self) {
        self.install_tool(&format!("printf '%s' '{SVG}' > \"$2\""));
    }

    fn runs(&self) -> usize {
        std::fs::read_to_string(self.path("runs.log"))
            .map(|s| s.lines().count())
            .unwrap_or(0)
    }

    fn config(&self) -> Arc<RenderConfig> {
        Arc::new(
            RenderConfig::builder()
                .add_converter(
                    "fake",
                    ConverterSpec::new(
                        "$path/depict $input $output",
                        [SourceFormat::Mol, SourceFormat::Rxn],
                    ),
                )
                .converter("fake")
                .tool_dir(self.path("bin"))
                .timeout_secs(5)
                .build()
                .unwrap(),
        )
    }

    fn store(&self) -> FsArtifactStore {
        FsArtifactStore::new(self.path("store"))
    }

    fn source(&self) -> SourceFile {
        let path = self.path("Ethanol.mol");
        std::fs::copy(
            Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/files/ethanol.mol"),
            &path,
        )
        .unwrap();
        SourceFile::from_path(&path)
            .unwrap()
            .with_mime("chemical/x-mdl-molfile")
            .with_metadata(parse_svg_metadata(SVG))
    }
}

/// Rasterizer writing a blank PNG of the requested size.
#[derive(Default)]
struct RecordingRasterizer {
    calls: Mutex<Vec<(PathBuf, u32, u32)>>,
}

impl RecordingRasterizer {
    fn calls(&self) -> Vec<(PathBuf, u32, u32)> {
        self.calls.lock().unwrap().clone()
    }
}

impl VectorRasterizer for RecordingRasterizer {
    fn rasterize(&self, svg: &Path, dst: &Path, width: u32, height: u32) -> TransformResult<()> {
        self.calls
            .lock()
            .unwrap()
            .push((svg.to_path_buf(), width, height));
        assert!(
            std::fs::metadata(svg).map(|m| m.len() > 0).unwrap_or(false),
            "rasterizer called without an SVG"
        );
        image::RgbaImage::new(width, height)
            .save(dst)
            .map_err(|e| TransformError::Failed {
                width,
                height,
                message: e.to_string(),
            })
    }

    fn metadata(&self, svg: &Path) -> VectorMetadata {
        parse_svg_metadata(&std::fs::read_to_string(svg).unwrap_or_default())
    }
}

/// Store whose imports always fail.
struct ReadOnlyStore(FsArtifactStore);

impl ArtifactStore for ReadOnlyStore {
    fn file_exists(&self, key: &str) -> bool {
        self.0.file_exists(key)
    }
    fn local_copy(&self, key: &str) -> io::Result<tempfile::TempPath> {
        self.0.local_copy(key)
    }
    fn quick_import(&self, _src: &Path, _key: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }
}

fn transform(
    handler: &MolHandler,
    store: &dyn ArtifactStore,
    file: &SourceFile,
    dst: &Path,
    width: u32,
) -> TransformResult {
    handler
        .do_transform(
            store,
            file,
            dst,
            "/thumb/out.png",
            &ThumbnailParams::with_width(width),
            TransformFlags::default(),
        )
        .unwrap()
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[test]
fn fresh_render_populates_cache() {
    let fx = Fixture::new();
    fx.install_svg_tool();
    let raster = Arc::new(RecordingRasterizer::default());
    let handler = MolHandler::new(fx.config(), SourceFormat::Mol, raster.clone());
    let store = fx.store();
    let file = fx.source();
    let dst = fx.path("out/120px-Ethanol.png");

    let thumb = transform(&handler, &store, &file, &dst, 120).unwrap();

    assert_eq!((thumb.width, thumb.height), (120, 60));
    assert_eq!(thumb.path, dst);
    assert_eq!(image::image_dimensions(&dst).unwrap(), (120, 60));
    assert_eq!(fx.runs(), 1);
    assert_eq!(raster.calls().len(), 1);

    let key = "thumb/Ethanol.mol/molhandler-Ethanol.mol";
    assert!(store.file_exists(key));
    assert_eq!(
        std::fs::read_to_string(store.resolve(key).unwrap()).unwrap(),
        SVG
    );
    assert!(!fx.path("out/120px-Ethanol.png.svg").exists());
}

#[test]
fn cached_svg_skips_the_converter() {
    let fx = Fixture::new();
    fx.install_svg_tool();
    let raster = Arc::new(RecordingRasterizer::default());
    let handler = MolHandler::new(fx.config(), SourceFormat::Mol, raster.clone());
    let store = fx.store();
    let file = fx.source();

    transform(&handler, &store, &file, &fx.path("a.png"), 100).unwrap();
    transform(&handler, &store, &file, &fx.path("b.png"), 50).unwrap();
    transform(&handler, &store, &file, &fx.path("c.png"), 80).unwrap();

    assert_eq!(fx.runs(), 1, "converter must run once");
    let sizes: Vec<(u32, u32)> = raster.calls().iter().map(|c| (c.1, c.2)).collect();
    assert_eq!(sizes, vec![(100, 50), (50, 25), (80, 40)]);
    assert_eq!(image::image_dimensions(fx.path("b.png")).unwrap(), (50, 25));
}

#[test]
fn empty_cached_svg_is_regenerated() {
    let fx = Fixture::new();
    fx.install_svg_tool();
    let handler = MolHandler::new(
        fx.config(),
        SourceFormat::Mol,
        Arc::new(RecordingRasterizer::default()),
    );
    let store = fx.store();
    let file = fx.source();
    let key = "thumb/Ethanol.mol/molhandler-Ethanol.mol";
    let cached = store.resolve(key).unwrap();
    std::fs::create_dir_all(cached.parent().unwrap()).unwrap();
    std::fs::write(&cached, "").unwrap();

    transform(&handler, &store, &file, &fx.path("a.png"), 100).unwrap();

    assert_eq!(fx.runs(), 1);
    assert_eq!(std::fs::read_to_string(&cached).unwrap(), SVG);
}

#[test]
fn converter_failure_is_reported_with_size() {
    let fx = Fixture::new();
    fx.install_tool("echo 'Error: bond order 9 is invalid' >&2\nprintf '<svg' > \"$2\"\nexit 3");
    let raster = Arc::new(RecordingRasterizer::default());
    let handler = MolHandler::new(fx.config(), SourceFormat::Mol, raster.clone());
    let store = fx.store();
    let dst = fx.path("out.png");

    let err = transform(&handler, &store, &fx.source(), &dst, 90).unwrap_err();

    match &err {
        TransformError::Failed {
            width,
            height,
            message,
        } => {
            assert_eq!((*width, *height), (90, 45));
            assert!(message.contains("bond order 9"), "{message}");
            assert!(message.contains("exit code 3"), "{message}");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(raster.calls().is_empty());
    assert!(!fx.path("out.png.svg").exists(), "partial SVG must be removed");
    assert!(!dst.exists());
    assert!(!store.file_exists("thumb/Ethanol.mol/molhandler-Ethanol.mol"));
}

#[test]
fn missing_output_is_a_failure() {
    let fx = Fixture::new();
    fx.install_tool("true");
    let handler = MolHandler::new(
        fx.config(),
        SourceFormat::Mol,
        Arc::new(RecordingRasterizer::default()),
    );

    let err = transform(&handler, &fx.store(), &fx.source(), &fx.path("o.png"), 40).unwrap_err();
    assert_eq!(err.dimensions(), Some((40, 20)));
    assert!(err.to_string().contains("no output"), "{err}");
}

#[test]
fn hung_converter_is_killed() {
    let fx = Fixture::new();
    fx.install_tool("sleep 30");
    let config = Arc::new(RenderConfig {
        timeout_secs: 1,
        ..(*fx.config()).clone()
    });
    let handler = MolHandler::new(
        config,
        SourceFormat::Mol,
        Arc::new(RecordingRasterizer::default()),
    );

    let started = std::time::Instant::now();
    let err = transform(&handler, &fx.store(), &fx.source(), &fx.path("o.png"), 40).unwrap_err();
    assert!(err.to_string().contains("timed out"), "{err}");
    assert!(started.elapsed() < std::time::Duration::from_secs(20));
}

#[test]
fn cache_write_failure_is_swallowed() {
    let fx = Fixture::new();
    fx.install_svg_tool();
    let handler = MolHandler::new(
        fx.config(),
        SourceFormat::Mol,
        Arc::new(RecordingRasterizer::default()),
    );
    let store = ReadOnlyStore(fx.store());
    let file = fx.source();

    transform(&handler, &store, &file, &fx.path("a.png"), 100).unwrap();
    transform(&handler, &store, &file, &fx.path("b.png"), 100).unwrap();

    assert_eq!(fx.runs(), 2, "nothing cached, so every render converts");
    assert!(!fx.path("a.png.svg").exists());
}

#[test]
fn standalone_rasterize_cleans_up() {
    let fx = Fixture::new();
    fx.install_svg_tool();
    let handler = MolHandler::new(
        fx.config(),
        SourceFormat::Rxn,
        Arc::new(RecordingRasterizer::default()),
    );
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/files/hydration.rxn");
    let dst = fx.path("reaction.png");

    handler.rasterize(&src, &dst, 64, 32).unwrap().unwrap();

    assert_eq!(image::image_dimensions(&dst).unwrap(), (64, 32));
    assert!(!fx.path("reaction.png.svg").exists());
}

#[test]
fn metadata_extraction_reads_svg_size() {
    let fx = Fixture::new();
    fx.install_svg_tool();
    let handler = MolHandler::new(
        fx.config(),
        SourceFormat::Mol,
        Arc::new(RecordingRasterizer::default()),
    );
    let upload = fx.path("upload-1234");
    std::fs::copy(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/files/ethanol.mol"),
        &upload,
    )
    .unwrap();

    let json = handler
        .get_metadata(&upload, &fx.path("meta"))
        .unwrap()
        .unwrap();
    let meta: VectorMetadata = serde_json::from_str(&json).unwrap();
    assert_eq!((meta.width, meta.height), (200, 100));

    // The tool saw a copy carrying the format extension.
    let log = std::fs::read_to_string(fx.path("runs.log")).unwrap();
    assert!(log.trim_end().ends_with("meta.mol"), "{log}");
    assert!(!fx.path("meta.mol").exists());
    assert!(!fx.path("meta.svg").exists());
}

#[test]
fn render_file_end_to_end() {
    let fx = Fixture::new();
    fx.install_svg_tool();
    let config = fx.config();
    let store = fx.store();
    let raster = Arc::new(RecordingRasterizer::default());
    let input = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/files/ethanol.mol");

    let thumb = render_file_with(
        &input,
        fx.path("out/ethanol.png"),
        &ThumbnailParams::with_box(300, 300),
        &store,
        config.clone(),
        raster.clone(),
    )
    .unwrap()
    .unwrap();

    assert_eq!((thumb.width, thumb.height), (300, 150));
    assert_eq!(fx.runs(), 1, "metadata conversion seeds the cache");
    let file = SourceFile::from_local_path(&input).unwrap();
    assert!(store.file_exists(&intermediate_key(&store, &file)));

    render_file_with(
        &input,
        fx.path("out/ethanol-small.png"),
        &ThumbnailParams::with_width(60),
        &store,
        config,
        raster.clone(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(fx.runs(), 1, "warm cache needs no conversion at all");
    assert_eq!(raster.calls().len(), 2);
}

#[test]
fn same_file_name_in_other_directory_is_not_served_from_cache() {
    let fx = Fixture::new();
    // Embed the molfile title line so each SVG shows which input it came from.
    fx.install_tool(&format!(
        "title=$(head -n 1 \"$1\")\nprintf '%s' '{}' | sed \"s|<g/>|<title>$title</title>|\" > \"$2\"",
        SVG
    ));
    let store = fx.store();
    let raster = Arc::new(RecordingRasterizer::default());
    let molfile = std::fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/files/ethanol.mol"),
    )
    .unwrap();
    let body = molfile.split_once('\n').unwrap().1;

    let write = |rel: &str, title: &str| {
        let path = fx.path(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, format!("{title}\n{body}")).unwrap();
        path
    };
    let render = |path: &Path, out: &str| {
        render_file_with(
            path,
            fx.path(out),
            &ThumbnailParams::with_width(100),
            &store,
            fx.config(),
            raster.clone(),
        )
        .unwrap()
        .unwrap()
    };
    let cached_svg = |path: &Path| {
        let key = intermediate_key(&store, &SourceFile::from_local_path(path).unwrap());
        std::fs::read_to_string(store.resolve(&key).unwrap()).unwrap()
    };

    let a = write("a/x.mol", "ETHANOL");
    let b = write("b/x.mol", "BENZENE");
    render(&a, "a.png");
    render(&b, "b.png");

    assert_eq!(fx.runs(), 2, "each directory's x.mol is converted");
    assert!(cached_svg(&a).contains("<title>ETHANOL</title>"));
    assert!(cached_svg(&b).contains("<title>BENZENE</title>"));
    assert_eq!(raster.calls().len(), 2);

    // Editing a file in place must not reuse its old SVG.
    write("a/x.mol", "PROPANOL");
    render(&a, "a2.png");
    assert_eq!(fx.runs(), 3);
    assert!(cached_svg(&a).contains("<title>PROPANOL</title>"));
}
