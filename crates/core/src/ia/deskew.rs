//! Sub-degree skew estimation by projection-profile variance.

use crate::raster::Raster;

/// Parameters for deskew detection.
#[derive(Clone, Debug, PartialEq)]
pub struct DeskewParams {
    /// Search range for skew angle in degrees (both positive and negative).
    pub max_angle_degrees: f64,
    /// Step size for angle search in degrees.
    pub angle_step_degrees: f64,
    /// Angles below this magnitude are reported as 0.
    pub min_correction_degrees: f64,
    /// Only every n-th ink pixel takes part in the search.
    pub sample_stride: usize,
}

impl Default for DeskewParams {
    fn default() -> Self {
        Self {
            max_angle_degrees: 5.0,
            angle_step_degrees: 0.1,
            min_correction_degrees: 0.05,
            sample_stride: 1,
        }
    }
}

/// Result of skew detection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeskewResult {
    /// Detected skew angle in degrees. Positive = clockwise.
    pub angle_degrees: f64,
    /// Relative profile sharpness gain of the best angle over 0 degrees.
    pub confidence: f64,
}

/// Find the shear angle whose row projection is sharpest.
///
/// Every ink pixel is binned into row `y - x * tan(a)`; the candidate with
/// the highest sum of squared bin counts wins.
pub fn detect_skew(img: &Raster, params: &DeskewParams) -> DeskewResult {
    let stride = params.sample_stride.max(1);
    let mut ink: Vec<(f64, f64)> = Vec::new();
    let mut n = 0usize;
    for y in 0..img.height() {
        for x in 0..img.width() {
            if img.is_ink(x, y) {
                if n % stride == 0 {
                    ink.push((x as f64, y as f64));
                }
                n += 1;
            }
        }
    }
    if ink.is_empty() || params.angle_step_degrees <= 0.0 {
        return DeskewResult {
            angle_degrees: 0.0,
            confidence: 0.0,
        };
    }

    let width = img.width() as f64;
    let pad = (width * params.max_angle_degrees.to_radians().tan()).ceil() as i64 + 1;
    let rows = img.height() as i64 + 2 * pad;
    let steps = (params.max_angle_degrees / params.angle_step_degrees).round() as i64;

    let score_at = |deg: f64| -> f64 {
        let t = deg.to_radians().tan();
        let mut bins = vec![0u32; rows.max(1) as usize];
        for &(x, y) in &ink {
            let r = (y - x * t).round() as i64 + pad;
            if (0..rows).contains(&r) {
                bins[r as usize] += 1;
            }
        }
        bins.iter().map(|&b| (b as f64) * (b as f64)).sum()
    };

    let base = score_at(0.0);
    let mut best_deg = 0.0;
    let mut best = base;
    for i in -steps..=steps {
        let deg = i as f64 * params.angle_step_degrees;
        let s = score_at(deg);
        // strict improvement keeps 0 on ties
        if s > best {
            best = s;
            best_deg = deg;
        }
    }

    let confidence = if best > 0.0 { (best - base) / best } else { 0.0 };
    let angle_degrees = if best_deg.abs() < params.min_correction_degrees {
        0.0
    } else {
        best_deg
    };
    DeskewResult {
        angle_degrees,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    #[test]
    fn level_lines_have_no_skew() {
        let mut img = Raster::blank(200, 100);
        for k in 0..5 {
            let y = 10.0 + k as f64 * 18.0;
            img.fill_rect(BBox::new(10.0, y, 190.0, y + 2.0), 0);
        }
        let res = detect_skew(&img, &DeskewParams::default());
        assert_eq!(res.angle_degrees, 0.0);
    }

    #[test]
    fn sloped_lines_are_detected() {
        // slope of 0.035 ~ 2.0 degrees clockwise
        let img = Raster::from_fn(300, 120, |x, y| {
            let base = 0.035 * x as f64;
            let on_line = (0..4).any(|k| {
                let line_y = 15.0 + k as f64 * 25.0 + base;
                (y as f64 - line_y).abs() < 1.0
            });
            if on_line { 0 } else { 255 }
        });
        let params = DeskewParams {
            angle_step_degrees: 0.25,
            ..DeskewParams::default()
        };
        let res = detect_skew(&img, &params);
        assert!((res.angle_degrees - 2.0).abs() <= 0.5, "{res:?}");
        assert!(res.confidence > 0.0);
    }
}
