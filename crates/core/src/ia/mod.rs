//! Image analysis - pixel-level primitives used by layout detection.
//!
//! This module contains:
//! - `binarize` - Otsu thresholding
//! - `deskew` - projection-profile skew estimation
//! - `lines` - ruling-line extraction
//! - `orientation` - cheap orientation heuristics
//! - `profile` - ink projection profiles

pub mod binarize;
pub mod deskew;
pub mod lines;
pub mod orientation;
pub mod profile;

pub use binarize::{binarize_otsu, otsu_threshold};
pub use deskew::{DeskewParams, DeskewResult, detect_skew};
pub use lines::{LinesInfo, extract as extract_lines};
pub use orientation::{OrientationParams, glyph_shape_guess, line_alignment_guess};

use crate::raster::Raster;
use crate::rotation::Rotation;

/// Long side of the A4-like reference raster (A4 at 150 dpi).
pub const A4_REFERENCE_LONG_SIDE: u32 = 1754;

/// A raster rescaled to the reference size.
#[derive(Clone, Debug)]
pub struct ScaledRaster {
    pub raster: Raster,
    /// Factor applied to the source dimensions.
    pub scale: f64,
}

/// Pixel operations consumed by rotation detection and column detection.
pub trait PixelOps: Send + Sync {
    fn binarize(&self, img: &Raster) -> Raster;

    fn scale_to_reference(&self, img: &Raster) -> ScaledRaster;

    fn deskew_angle(&self, img: &Raster) -> DeskewResult;

    fn orientation_guess(&self, img: &Raster) -> Option<Rotation>;
}

/// CPU implementation of [`PixelOps`].
#[derive(Clone, Debug, Default)]
pub struct BasicPixelOps {
    pub deskew: DeskewParams,
    pub orientation: OrientationParams,
    /// Override for [`A4_REFERENCE_LONG_SIDE`].
    pub reference_long_side: Option<u32>,
}

impl PixelOps for BasicPixelOps {
    fn binarize(&self, img: &Raster) -> Raster {
        binarize_otsu(img)
    }

    fn scale_to_reference(&self, img: &Raster) -> ScaledRaster {
        let target = self.reference_long_side.unwrap_or(A4_REFERENCE_LONG_SIDE);
        let long_side = img.width().max(img.height());
        if long_side == 0 || long_side == target {
            return ScaledRaster {
                raster: img.clone(),
                scale: 1.0,
            };
        }
        let scale = target as f64 / long_side as f64;
        let w = (img.width() as f64 * scale).round() as u32;
        let h = (img.height() as f64 * scale).round() as u32;
        ScaledRaster {
            raster: img.resized(w, h),
            scale,
        }
    }

    fn deskew_angle(&self, img: &Raster) -> DeskewResult {
        detect_skew(img, &self.deskew)
    }

    fn orientation_guess(&self, img: &Raster) -> Option<Rotation> {
        glyph_shape_guess(img, &self.orientation)
    }
}

/// Binarize, scale to the reference size and estimate skew.
///
/// Returns the skew in degrees, 0 when none was found.
pub fn detect_deskew(img: &Raster) -> f64 {
    let ops = BasicPixelOps::default();
    let binary = ops.binarize(img);
    let scaled = ops.scale_to_reference(&binary);
    ops.deskew_angle(&scaled.raster).angle_degrees
}
