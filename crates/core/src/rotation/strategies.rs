use std::sync::Arc;

use super::{Decision, Rotation, RotationInput, RotationStrategy};
use crate::ia::{OrientationParams, line_alignment_guess};
use crate::ocr::{OcrEngine, OrientationEngine};

/// Orientation/script detection engine; only upright and upside-down
/// verdicts are trusted.
pub struct OsdStrategy {
    engine: Arc<dyn OrientationEngine>,
    min_confidence: f64,
}

impl OsdStrategy {
    pub fn new(engine: Arc<dyn OrientationEngine>, min_confidence: f64) -> Self {
        Self {
            engine,
            min_confidence,
        }
    }
}

impl RotationStrategy for OsdStrategy {
    fn name(&self) -> &str {
        "osd"
    }

    fn cost(&self) -> u32 {
        10
    }

    fn decide(&self, input: &RotationInput<'_>) -> Decision {
        let verdict = match self.engine.detect(input.prepared) {
            Ok(Some(v)) => v,
            Ok(None) => return Decision::Inconclusive,
            Err(e) => {
                tracing::warn!(engine = self.engine.name(), error = %e, "orientation engine failed");
                return Decision::Inconclusive;
            }
        };
        tracing::trace!(?verdict, "osd verdict");
        match verdict.orientation {
            r @ (Rotation::Deg0 | Rotation::Deg180) if verdict.confidence >= self.min_confidence => {
                Decision::Angle(r)
            }
            _ => Decision::Inconclusive,
        }
    }
}

/// Ascender/descender asymmetry, through the pixel operations.
pub struct GlyphShapeStrategy;

impl RotationStrategy for GlyphShapeStrategy {
    fn name(&self) -> &str {
        "glyph-shape"
    }

    fn cost(&self) -> u32 {
        20
    }

    fn decide(&self, input: &RotationInput<'_>) -> Decision {
        input
            .ops
            .orientation_guess(input.prepared)
            .map_or(Decision::Inconclusive, Decision::Angle)
    }
}

/// Text line bounding-box alignment and density.
pub struct BBoxDensityStrategy {
    params: OrientationParams,
}

impl BBoxDensityStrategy {
    pub fn new(params: OrientationParams) -> Self {
        Self { params }
    }
}

impl RotationStrategy for BBoxDensityStrategy {
    fn name(&self) -> &str {
        "bbox-density"
    }

    fn cost(&self) -> u32 {
        30
    }

    fn decide(&self, input: &RotationInput<'_>) -> Decision {
        line_alignment_guess(input.prepared, &self.params)
            .map_or(Decision::Inconclusive, Decision::Angle)
    }
}

/// Recognize all four rotations and keep the most confident one.
pub struct OcrConfidenceStrategy {
    engine: Arc<dyn OcrEngine>,
    min_margin: f64,
}

impl OcrConfidenceStrategy {
    pub fn new(engine: Arc<dyn OcrEngine>, min_margin: f64) -> Self {
        Self { engine, min_margin }
    }
}

impl RotationStrategy for OcrConfidenceStrategy {
    fn name(&self) -> &str {
        "ocr-confidence"
    }

    fn cost(&self) -> u32 {
        100
    }

    fn decide(&self, input: &RotationInput<'_>) -> Decision {
        let mut scores: Vec<(Rotation, f64)> = Vec::with_capacity(4);
        for r in Rotation::ALL {
            let candidate = input.prepared.rotated(r);
            match self.engine.recognize(&candidate) {
                Ok(rec) => scores.push((r, rec.total_conf())),
                Err(e) => {
                    tracing::warn!(engine = self.engine.name(), rotation = %r, error = %e, "recognition failed");
                }
            }
        }
        tracing::trace!(?scores, "ocr confidence per rotation");

        // first maximum wins, so ties go to the smaller rotation
        let mut best: Option<(Rotation, f64)> = None;
        let mut runner_up = 0.0f64;
        for &(r, s) in &scores {
            match best {
                Some((_, b)) if s <= b => runner_up = runner_up.max(s),
                _ => {
                    if let Some((_, b)) = best {
                        runner_up = runner_up.max(b);
                    }
                    best = Some((r, s));
                }
            }
        }
        match best {
            Some((r, s)) if s > 0.0 && s - runner_up >= self.min_margin * s => Decision::Angle(r),
            _ => Decision::Inconclusive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Word;
    use crate::error::{IbError, Result};
    use crate::geometry::BBox;
    use crate::ia::BasicPixelOps;
    use crate::ia::orientation::tests::synthetic_text;
    use crate::ocr::{OsdVerdict, Recognition};
    use crate::raster::Raster;

    struct Osd(Option<OsdVerdict>);

    impl OrientationEngine for Osd {
        fn name(&self) -> &str {
            "osd-fake"
        }

        fn detect(&self, _img: &Raster) -> Result<Option<OsdVerdict>> {
            Ok(self.0)
        }
    }

    /// Confidence is high only when the top-left pixel is ink.
    struct CornerOcr;

    impl OcrEngine for CornerOcr {
        fn name(&self) -> &str {
            "corner"
        }

        fn recognize(&self, img: &Raster) -> Result<Recognition> {
            if img.width() == 0 {
                return Err(IbError::Engine {
                    engine: "corner".into(),
                    msg: "empty".into(),
                });
            }
            let conf = if img.is_ink(0, 0) { 90.0 } else { 10.0 };
            Ok(Recognition {
                text: "x".into(),
                words: vec![Word::new(BBox::new(0.0, 0.0, 1.0, 1.0), "x", conf)],
            })
        }
    }

    fn run(strategy: &dyn RotationStrategy, img: &Raster) -> Decision {
        let ops = BasicPixelOps::default();
        strategy.decide(&RotationInput {
            original: img,
            prepared: img,
            ops: &ops,
        })
    }

    #[test]
    fn osd_trusts_only_confident_vertical_verdicts() {
        let img = Raster::blank(10, 10);
        let verdict = |orientation, confidence| {
            Arc::new(Osd(Some(OsdVerdict {
                orientation,
                confidence,
            })))
        };
        let s = OsdStrategy::new(verdict(Rotation::Deg180, 5.0), 2.0);
        assert_eq!(run(&s, &img), Decision::Angle(Rotation::Deg180));
        let s = OsdStrategy::new(verdict(Rotation::Deg0, 1.0), 2.0);
        assert_eq!(run(&s, &img), Decision::Inconclusive);
        let s = OsdStrategy::new(verdict(Rotation::Deg90, 9.0), 2.0);
        assert_eq!(run(&s, &img), Decision::Inconclusive);
        let s = OsdStrategy::new(Arc::new(Osd(None)), 2.0);
        assert_eq!(run(&s, &img), Decision::Inconclusive);
    }

    #[test]
    fn ocr_confidence_picks_best_rotation() {
        // ink at bottom-right reaches top-left after a half turn
        let mut img = Raster::blank(20, 10);
        img.fill_rect(BBox::new(19.0, 9.0, 20.0, 10.0), 0);
        let s = OcrConfidenceStrategy::new(Arc::new(CornerOcr), 0.05);
        assert_eq!(run(&s, &img), Decision::Angle(Rotation::Deg180));
    }

    #[test]
    fn ocr_confidence_without_margin_is_inconclusive() {
        let img = Raster::blank(20, 10);
        let s = OcrConfidenceStrategy::new(Arc::new(CornerOcr), 0.05);
        assert_eq!(run(&s, &img), Decision::Inconclusive);
    }

    #[test]
    fn bbox_density_reads_line_alignment() {
        let img = synthetic_text(false).rotated(Rotation::Deg180);
        let s = BBoxDensityStrategy::new(OrientationParams::default());
        assert_eq!(run(&s, &img), Decision::Angle(Rotation::Deg180));
        assert_eq!(run(&GlyphShapeStrategy, &img), Decision::Inconclusive);
    }
}
