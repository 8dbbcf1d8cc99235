//! Pipeline stages for chemical-table-file rendering.
//!
//! Each submodule implements exactly one step. Orchestration (parameter
//! normalisation, the artifact cache, cleanup) lives in
//! [`crate::handler::MolHandler`].
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ intermediate ──▶ render
//! (path)    (depict tool)    (SVG → PNG)
//!               │
//!               └──▶ metadata (SVG → dimensions)
//! ```
//!
//! 1. [`input`]: validate the source path, make extension-carrying
//!    temporary copies
//! 2. [`exec`]: run one shell command under a memory ceiling and a
//!    wall-clock timeout
//! 3. [`intermediate`]: CTF → SVG through the active converter
//! 4. [`render`]: SVG → PNG and SVG metadata, behind the
//!    [`render::VectorRasterizer`] trait
//! 5. [`metadata`]: intermediate + metadata parse with guaranteed cleanup

pub mod exec;
pub mod input;
pub mod intermediate;
pub mod metadata;
pub mod render;
