//! Result and parameter types for thumbnail transforms.

use crate::error::TransformError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of one transform: a thumbnail, or a recoverable error.
///
/// Fatal problems are reported one level up as
/// [`crate::error::MolPreviewError`].
pub type TransformResult<T = Thumbnail> = Result<T, TransformError>;

/// A rendered (or, in deferred mode, not yet rendered) raster preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thumbnail {
    /// Local path of the raster file.
    pub path: PathBuf,
    /// URL the host serves the raster under.
    pub url: String,
    /// Display width in pixels.
    pub width: u32,
    /// Display height in pixels.
    pub height: u32,
}

/// Behaviour switches for [`crate::MolHandler::do_transform`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransformFlags {
    /// Return a placeholder thumbnail without rendering anything.
    pub render_later: bool,
}

impl TransformFlags {
    pub fn later() -> Self {
        Self { render_later: true }
    }
}

/// Requested thumbnail size. At least one edge must be given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThumbnailParams {
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Parameters after normalisation against the source dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalisedParams {
    /// Size reported to the client.
    pub width: u32,
    pub height: u32,
    /// Size actually rendered; smaller than the client size when capped.
    pub physical_width: u32,
    pub physical_height: u32,
}

impl ThumbnailParams {
    pub fn with_width(width: u32) -> Self {
        Self {
            width: Some(width),
            height: None,
        }
    }

    pub fn with_box(width: u32, height: u32) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
        }
    }

    /// Fit the request to the source aspect ratio.
    ///
    /// With only a width, the height follows the aspect ratio; with only a
    /// height, the width does; with both, the result fits inside the box.
    /// The rendered size is capped so neither edge exceeds `max_size`.
    pub fn normalise(
        &self,
        src_width: u32,
        src_height: u32,
        max_size: u32,
    ) -> Result<NormalisedParams, String> {
        if src_width == 0 || src_height == 0 {
            return Err(format!(
                "source has invalid dimensions {src_width}x{src_height}"
            ));
        }
        let (sw, sh) = (src_width as f64, src_height as f64);

        let width = match (self.width, self.height) {
            (None | Some(0), None | Some(0)) => {
                return Err("a non-zero width or height is required".to_string())
            }
            (Some(w), None | Some(0)) => w as f64,
            (None | Some(0), Some(h)) => h as f64 * sw / sh,
            (Some(w), Some(h)) => {
                if w as f64 / h as f64 > sw / sh {
                    h as f64 * sw / sh
                } else {
                    w as f64
                }
            }
        };
        let width = (width.round() as u32).max(1);
        let height = ((sh * width as f64 / sw).round() as u32).max(1);

        let (mut physical_width, mut physical_height) = (width, height);
        let longest = width.max(height);
        if longest > max_size {
            let scale = max_size as f64 / longest as f64;
            physical_width = ((width as f64 * scale).round() as u32).max(1);
            physical_height = ((height as f64 * scale).round() as u32).max(1);
        }

        Ok(NormalisedParams {
            width,
            height,
            physical_width,
            physical_height,
        })
    }
}
