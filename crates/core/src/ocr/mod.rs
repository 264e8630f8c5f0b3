//! Boundary to external recognition engines.
//!
//! The library never loads models or manages engine lifecycles; callers
//! hand in an implementation of these traits at construction time.

use crate::document::Word;
use crate::error::Result;
use crate::raster::Raster;
use crate::rotation::Rotation;

/// Text recognized on a raster.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Words in raster coordinates.
    pub words: Vec<Word>,
}

impl Recognition {
    /// Mean word confidence, 0 when nothing was recognized.
    pub fn mean_conf(&self) -> f64 {
        if self.words.is_empty() {
            return 0.0;
        }
        self.words.iter().map(Word::conf).sum::<f64>() / self.words.len() as f64
    }

    /// Sum of word confidences.
    pub fn total_conf(&self) -> f64 {
        self.words.iter().map(Word::conf).sum()
    }
}

/// An OCR engine.
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;

    fn recognize(&self, img: &Raster) -> Result<Recognition>;
}

/// Verdict of an orientation/script detection engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OsdVerdict {
    /// Clockwise rotation that makes the page upright.
    pub orientation: Rotation,
    /// Engine confidence; the scale is engine specific.
    pub confidence: f64,
}

/// An orientation/script detection engine.
pub trait OrientationEngine: Send + Sync {
    fn name(&self) -> &str;

    /// `Ok(None)` when the engine has no opinion.
    fn detect(&self, img: &Raster) -> Result<Option<OsdVerdict>>;
}
