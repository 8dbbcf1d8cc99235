//! # molpreview
//!
//! Detect MDL chemical table files and render them as raster previews.
//!
//! ## What it does
//!
//! Chemical table files (molfiles, SD files, reaction files, RD and RG files)
//! are plain text, so generic MIME detection calls them `text/plain`. This
//! crate recognises them from their first and last kilobyte, and renders
//! molfiles and reaction files through an external depiction tool (Indigo's
//! `indigo-depict` or Open Babel) that writes SVG, followed by a generic SVG
//! rasterizer.
//!
//! ## Pipeline Overview
//!
//! ```text
//! CTF file
//!  │
//!  ├─ 1. Sniff     head/tail byte rules → chemical/x-mdl-* MIME type
//!  ├─ 2. Hint      text/plain + chemical extension → resolver lookup
//!  ├─ 3. Metadata  CTF → temporary SVG → width/height JSON
//!  ├─ 4. Convert   CTF → SVG via the active converter (cached per file)
//!  └─ 5. Raster    SVG → PNG via the VectorRasterizer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use molpreview::{render_file, FsArtifactStore, RenderConfig, ThumbnailParams};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Arc::new(RenderConfig::builder().converter("indigo").build()?);
//!     let store = FsArtifactStore::new("/var/cache/molpreview");
//!     match render_file("caffeine.mol", "caffeine.png", &ThumbnailParams::with_width(300), &store, config)? {
//!         Ok(thumb) => println!("{}×{} at {}", thumb.width, thumb.height, thumb.path.display()),
//!         Err(e) => eprintln!("preview failed: {e}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `molpreview` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! molpreview = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod handler;
pub mod hint;
pub mod output;
pub mod pipeline;
pub mod registry;
pub mod repo;
pub mod sniff;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{RenderConfig, RenderConfigBuilder, SourceFormat};
pub use convert::{
    extract_file_metadata, inspect, render_file, render_file_with, transform_async, FileReport,
};
pub use error::{MolPreviewError, TransformError};
pub use handler::{handler_for_mime, MolHandler};
pub use hint::{guess_mime, improve_from_extension, MimeResolver, StaticMimeResolver};
pub use output::{NormalisedParams, Thumbnail, ThumbnailParams, TransformFlags, TransformResult};
pub use pipeline::render::{
    parse_svg_metadata, RsvgRasterizer, StoredError, VectorMetadata, VectorRasterizer,
};
pub use registry::{ConverterRegistry, ConverterSpec};
pub use repo::{intermediate_key, ArtifactStore, FsArtifactStore, SourceFile};
pub use sniff::{classify, ChemicalMime, ProbeBuffer};
