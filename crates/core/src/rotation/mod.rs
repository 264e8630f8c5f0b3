//! Page rotation and deskew detection.
//!
//! [`RotationDetector`] prepares the raster once (binarize, scale to the
//! reference size, measure skew) and then asks an ordered list of
//! [`RotationStrategy`] objects for a decision. Strategies run cheapest
//! first; the first one that decides wins.

mod strategies;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::document::Page;
use crate::ia::{BasicPixelOps, DeskewParams, OrientationParams, PixelOps};
use crate::ocr::{OcrEngine, OrientationEngine};
use crate::raster::Raster;

pub use strategies::{
    BBoxDensityStrategy, GlyphShapeStrategy, OcrConfidenceStrategy, OsdStrategy,
};

/// Cardinal clockwise rotation that makes a page upright.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Rotation {
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    pub const ALL: [Rotation; 4] = [
        Rotation::Deg0,
        Rotation::Deg90,
        Rotation::Deg180,
        Rotation::Deg270,
    ];

    pub fn degrees(self) -> i32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }

    /// Any multiple of 90, negative values included.
    pub fn from_degrees(deg: i32) -> Option<Self> {
        match deg.rem_euclid(360) {
            0 => Some(Rotation::Deg0),
            90 => Some(Rotation::Deg90),
            180 => Some(Rotation::Deg180),
            270 => Some(Rotation::Deg270),
            _ => None,
        }
    }
}

impl From<Rotation> for i32 {
    fn from(r: Rotation) -> i32 {
        r.degrees()
    }
}

impl TryFrom<i32> for Rotation {
    type Error = String;

    fn try_from(deg: i32) -> Result<Self, Self::Error> {
        Rotation::from_degrees(deg).ok_or_else(|| format!("not a cardinal rotation: {deg}"))
    }
}

impl fmt::Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.degrees())
    }
}

/// Thresholds of the rotation cascade.
#[derive(Clone, Debug, PartialEq)]
pub struct RotationParams {
    /// Long side, in pixels, of the raster the heuristics look at.
    pub reference_long_side: u32,
    pub deskew: DeskewParams,
    /// Orientation engine verdicts below this confidence are ignored.
    pub osd_min_confidence: f64,
    pub orientation: OrientationParams,
    /// The OCR comparison needs the winner ahead of the runner-up by
    /// this share of its aggregate confidence.
    pub ocr_min_margin: f64,
}

impl Default for RotationParams {
    fn default() -> Self {
        Self {
            reference_long_side: crate::ia::A4_REFERENCE_LONG_SIDE,
            deskew: DeskewParams::default(),
            osd_min_confidence: 2.0,
            orientation: OrientationParams::default(),
            ocr_min_margin: 0.05,
        }
    }
}

/// Prepared input handed to every strategy.
pub struct RotationInput<'a> {
    /// The caller's raster, untouched.
    pub original: &'a Raster,
    /// Binary raster at the reference size.
    pub prepared: &'a Raster,
    pub ops: &'a dyn PixelOps,
}

/// Answer of one strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Angle(Rotation),
    Inconclusive,
}

/// One stage of the cascade.
pub trait RotationStrategy: Send + Sync {
    /// Name written to the trace.
    fn name(&self) -> &str;

    /// Relative cost; strategies run in ascending cost order.
    fn cost(&self) -> u32;

    fn decide(&self, input: &RotationInput<'_>) -> Decision;
}

/// Result of the cascade.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RotationOutcome {
    /// `None` when no stage decided.
    pub angle: Option<Rotation>,
    /// Sub-degree skew in degrees, measured regardless of `angle`.
    pub deskew: f64,
    /// Name of the deciding stage.
    pub stage: Option<String>,
    /// `;`-separated record of every stage.
    pub trace: String,
}

impl RotationOutcome {
    /// Record the decision in a page's source transform.
    pub fn apply_to(&self, page: &mut Page) {
        page.apply_rotation(self.angle.map(Rotation::degrees), self.deskew);
    }
}

/// Cascading rotation detector.
pub struct RotationDetector {
    ops: Arc<dyn PixelOps>,
    strategies: Vec<Box<dyn RotationStrategy>>,
}

impl RotationDetector {
    /// A detector without strategies; it only measures skew.
    pub fn new(params: &RotationParams) -> Self {
        let ops = BasicPixelOps {
            deskew: params.deskew.clone(),
            orientation: params.orientation.clone(),
            reference_long_side: Some(params.reference_long_side),
        };
        Self {
            ops: Arc::new(ops),
            strategies: Vec::new(),
        }
    }

    /// The standard cascade. Engine-backed stages are left out when the
    /// engine is not supplied.
    pub fn with_defaults(
        params: &RotationParams,
        osd: Option<Arc<dyn OrientationEngine>>,
        ocr: Option<Arc<dyn OcrEngine>>,
    ) -> Self {
        let mut detector = Self::new(params);
        if let Some(engine) = osd {
            detector.push_strategy(Box::new(OsdStrategy::new(
                engine,
                params.osd_min_confidence,
            )));
        }
        detector.push_strategy(Box::new(GlyphShapeStrategy));
        detector.push_strategy(Box::new(BBoxDensityStrategy::new(
            params.orientation.clone(),
        )));
        if let Some(engine) = ocr {
            detector.push_strategy(Box::new(OcrConfidenceStrategy::new(
                engine,
                params.ocr_min_margin,
            )));
        }
        detector
    }

    /// Replace the pixel operations.
    pub fn with_ops(mut self, ops: Arc<dyn PixelOps>) -> Self {
        self.ops = ops;
        self
    }

    /// Insert a strategy; the list stays sorted by cost, ties keep
    /// insertion order.
    pub fn push_strategy(&mut self, strategy: Box<dyn RotationStrategy>) {
        let at = self
            .strategies
            .partition_point(|s| s.cost() <= strategy.cost());
        self.strategies.insert(at, strategy);
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub fn detect(&self, img: &Raster) -> RotationOutcome {
        let mut trace: Vec<String> = Vec::new();

        let binary: Cow<'_, Raster> = if img.is_binary() {
            trace.push("binarize=skipped".into());
            Cow::Borrowed(img)
        } else {
            trace.push("binarize=otsu".into());
            Cow::Owned(self.ops.binarize(img))
        };

        let scaled = self.ops.scale_to_reference(&binary);
        trace.push(format!("scale={:.3}", scaled.scale));

        let skew = self.ops.deskew_angle(&scaled.raster);
        // normalizes -0.0
        let deskew = skew.angle_degrees + 0.0;
        trace.push(format!("deskew={deskew:.2}"));

        let input = RotationInput {
            original: img,
            prepared: &scaled.raster,
            ops: self.ops.as_ref(),
        };
        let mut angle = None;
        let mut stage = None;
        for strategy in &self.strategies {
            match strategy.decide(&input) {
                Decision::Angle(r) => {
                    trace.push(format!("{}={}", strategy.name(), r));
                    angle = Some(r);
                    stage = Some(strategy.name().to_string());
                    break;
                }
                Decision::Inconclusive => {
                    trace.push(format!("{}=inconclusive", strategy.name()));
                }
            }
        }
        trace.push(format!("decided={}", stage.as_deref().unwrap_or("none")));

        let outcome = RotationOutcome {
            angle,
            deskew,
            stage,
            trace: trace.join("; "),
        };
        tracing::debug!(
            angle = ?outcome.angle,
            deskew = outcome.deskew,
            trace = %outcome.trace,
            "rotation detected"
        );
        outcome
    }
}
