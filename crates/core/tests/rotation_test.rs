//! Rotation cascade against synthetic page rasters.

use std::sync::Arc;

use ibextract_core::document::Page;
use ibextract_core::error::Result;
use ibextract_core::geometry::BBox;
use ibextract_core::ocr::{OrientationEngine, OsdVerdict};
use ibextract_core::raster::Raster;
use ibextract_core::rotation::{Rotation, RotationDetector, RotationParams};

/// Left-aligned text lines as solid bars, no ascenders.
fn text_page() -> Raster {
    let mut img = Raster::blank(300, 200);
    for (i, len) in [260.0, 180.0, 240.0, 120.0, 210.0].iter().enumerate() {
        let top = 26.0 + i as f64 * 34.0;
        img.fill_rect(BBox::new(20.0, top, 20.0 + len, top + 10.0), 0);
    }
    img
}

fn params() -> RotationParams {
    RotationParams {
        reference_long_side: 300,
        ..RotationParams::default()
    }
}

struct FixedOsd(Option<OsdVerdict>);

impl OrientationEngine for FixedOsd {
    fn name(&self) -> &str {
        "fixed"
    }

    fn detect(&self, _img: &Raster) -> Result<Option<OsdVerdict>> {
        Ok(self.0)
    }
}

#[test]
fn osd_upright_decides_first() {
    let osd = FixedOsd(Some(OsdVerdict {
        orientation: Rotation::Deg0,
        confidence: 7.5,
    }));
    let det = RotationDetector::with_defaults(&params(), Some(Arc::new(osd)), None);
    assert_eq!(det.strategy_names(), vec!["osd", "glyph-shape", "bbox-density"]);

    let out = det.detect(&text_page().rotated(Rotation::Deg180));
    assert_eq!(out.angle, Some(Rotation::Deg0));
    assert_eq!(out.stage.as_deref(), Some("osd"));
    assert!(out.trace.contains("osd=0; decided=osd"));
    assert!(out.trace.starts_with("binarize=skipped; scale=1.000"));
}

#[test]
fn inconclusive_engine_falls_through_to_density() {
    let det = RotationDetector::with_defaults(&params(), Some(Arc::new(FixedOsd(None))), None);
    let out = det.detect(&text_page().rotated(Rotation::Deg180));
    assert_eq!(out.angle, Some(Rotation::Deg180));
    assert_eq!(out.stage.as_deref(), Some("bbox-density"));
    assert!(out.trace.ends_with(
        "osd=inconclusive; glyph-shape=inconclusive; bbox-density=180; decided=bbox-density"
    ));

    let mut page = Page::default();
    out.apply_to(&mut page);
    assert_eq!(page.transform.rotation, 180);
}

#[test]
fn low_confidence_sideways_verdicts_are_ignored() {
    let osd = FixedOsd(Some(OsdVerdict {
        orientation: Rotation::Deg90,
        confidence: 9.0,
    }));
    let det = RotationDetector::with_defaults(&params(), Some(Arc::new(osd)), None);
    let out = det.detect(&text_page());
    assert!(out.trace.contains("osd=inconclusive"));
    assert_eq!(out.angle, Some(Rotation::Deg0));
    assert_eq!(out.stage.as_deref(), Some("bbox-density"));
}

#[test]
fn gray_input_is_binarized_and_rescaled() {
    let det = RotationDetector::with_defaults(&params(), None, None);
    let gray = Raster::from_fn(600, 400, |x, y| if (x / 8 + y / 8) % 2 == 0 { 90 } else { 220 });
    let out = det.detect(&gray);
    assert!(out.trace.starts_with("binarize=otsu; scale=0.500"));
    assert!(out.trace.ends_with(&format!(
        "decided={}",
        out.stage.as_deref().unwrap_or("none")
    )));
}
