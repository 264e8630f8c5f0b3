//! Cheap orientation heuristics on binary rasters.
//!
//! Both guesses return the clockwise rotation that makes the page upright.

use super::profile::{bands, col_profile, row_profile, variance};
use crate::raster::Raster;
use crate::rotation::Rotation;

/// Thresholds shared by the orientation heuristics.
#[derive(Clone, Debug, PartialEq)]
pub struct OrientationParams {
    /// Required relative imbalance between ascender and descender ink.
    pub glyph_margin: f64,
    /// Minimal ascender + descender ink, as a fraction of all ink.
    pub glyph_min_mass: f64,
    /// Minimal number of text lines for the alignment heuristic.
    pub min_lines: usize,
    /// Required ratio between ragged and aligned edge spread.
    pub alignment_ratio: f64,
}

impl Default for OrientationParams {
    fn default() -> Self {
        Self {
            glyph_margin: 0.25,
            glyph_min_mass: 0.02,
            min_lines: 3,
            alignment_ratio: 2.0,
        }
    }
}

/// Text lines run horizontally when the row profile is the sharper one.
fn horizontal_text(rows: &[u32], cols: &[u32]) -> Option<bool> {
    let cv = |p: &[u32]| {
        let mean = p.iter().map(|&v| v as f64).sum::<f64>() / p.len().max(1) as f64;
        if mean == 0.0 {
            None
        } else {
            Some(variance(p) / (mean * mean))
        }
    };
    Some(cv(rows)? >= cv(cols)?)
}

/// Ascender/descender asymmetry of glyphs.
///
/// Latin script puts more ink above the x-height band than below it; the
/// side carrying the surplus tells where "up" is.
pub fn glyph_shape_guess(img: &Raster, params: &OrientationParams) -> Option<Rotation> {
    let rows = row_profile(img);
    let cols = col_profile(img);
    let horizontal = horizontal_text(&rows, &cols)?;
    let profile = if horizontal { &rows } else { &cols };
    let total: u64 = profile.iter().map(|&v| v as u64).sum();

    let mut before = 0u64;
    let mut after = 0u64;
    for (b0, b1) in bands(profile, 0) {
        let band = &profile[b0..b1];
        let peak = band.iter().copied().max().unwrap_or(0);
        let core: Vec<usize> = band
            .iter()
            .enumerate()
            .filter(|(_, v)| **v * 2 >= peak)
            .map(|(i, _)| i)
            .collect();
        let (Some(&first), Some(&last)) = (core.first(), core.last()) else {
            continue;
        };
        before += band[..first].iter().map(|&v| v as u64).sum::<u64>();
        after += band[last + 1..].iter().map(|&v| v as u64).sum::<u64>();
    }

    let mass = (before + after) as f64;
    if total == 0 || mass < params.glyph_min_mass * total as f64 {
        return None;
    }
    let before = before as f64;
    let after = after as f64;
    let guess = if before > after * (1.0 + params.glyph_margin) {
        if horizontal {
            Rotation::Deg0
        } else {
            Rotation::Deg90
        }
    } else if after > before * (1.0 + params.glyph_margin) {
        if horizontal {
            Rotation::Deg180
        } else {
            Rotation::Deg270
        }
    } else {
        return None;
    };
    tracing::trace!(before, after, horizontal, ?guess, "glyph shape guess");
    Some(guess)
}

/// Text line bounding-box alignment.
///
/// Left-aligned text has line starts that line up and ragged line ends;
/// a rotated page moves the aligned edge to another side.
pub fn line_alignment_guess(img: &Raster, params: &OrientationParams) -> Option<Rotation> {
    let rows = row_profile(img);
    let cols = col_profile(img);
    let horizontal = horizontal_text(&rows, &cols)?;

    let mut starts = Vec::new();
    let mut ends = Vec::new();
    if horizontal {
        for (y0, y1) in bands(&rows, 0) {
            let inked = |x: u32| (y0..y1).any(|y| img.is_ink(x, y as u32));
            if let (Some(s), Some(e)) = (
                (0..img.width()).find(|&x| inked(x)),
                (0..img.width()).rev().find(|&x| inked(x)),
            ) {
                starts.push(s as f64);
                ends.push(e as f64);
            }
        }
    } else {
        for (x0, x1) in bands(&cols, 0) {
            let inked = |y: u32| (x0..x1).any(|x| img.is_ink(x as u32, y));
            if let (Some(s), Some(e)) = (
                (0..img.height()).find(|&y| inked(y)),
                (0..img.height()).rev().find(|&y| inked(y)),
            ) {
                starts.push(s as f64);
                ends.push(e as f64);
            }
        }
    }
    if starts.len() < params.min_lines {
        return None;
    }

    let spread_start = std_dev(&starts);
    let spread_end = std_dev(&ends);
    let guess = if spread_end > spread_start * params.alignment_ratio + 1.0 {
        if horizontal {
            Rotation::Deg0
        } else {
            Rotation::Deg270
        }
    } else if spread_start > spread_end * params.alignment_ratio + 1.0 {
        if horizontal {
            Rotation::Deg180
        } else {
            Rotation::Deg90
        }
    } else {
        return None;
    };
    tracing::trace!(spread_start, spread_end, horizontal, ?guess, "line alignment guess");
    Some(guess)
}

fn std_dev(xs: &[f64]) -> f64 {
    let n = xs.len() as f64;
    let mean = xs.iter().sum::<f64>() / n;
    (xs.iter().map(|x| (x - mean) * (x - mean)).sum::<f64>() / n).sqrt()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::BBox;

    /// Left-aligned "text": each line is a core band with ascender stubs.
    pub(crate) fn synthetic_text(with_ascenders: bool) -> Raster {
        let mut img = Raster::blank(300, 200);
        let lengths = [260.0, 180.0, 240.0, 120.0, 210.0];
        for (i, len) in lengths.iter().enumerate() {
            let top = 20.0 + i as f64 * 34.0;
            img.fill_rect(BBox::new(20.0, top + 6.0, 20.0 + len, top + 16.0), 0);
            if with_ascenders {
                let mut x = 24.0;
                while x < 20.0 + len - 4.0 {
                    img.fill_rect(BBox::new(x, top, x + 2.0, top + 6.0), 0);
                    x += 14.0;
                }
            }
        }
        img
    }

    #[test]
    fn glyph_guess_upright_and_flipped() {
        let params = OrientationParams::default();
        let img = synthetic_text(true);
        assert_eq!(glyph_shape_guess(&img, &params), Some(Rotation::Deg0));
        let flipped = img.rotated(Rotation::Deg180);
        assert_eq!(glyph_shape_guess(&flipped, &params), Some(Rotation::Deg180));
        let quarter = img.rotated(Rotation::Deg90);
        assert_eq!(glyph_shape_guess(&quarter, &params), Some(Rotation::Deg270));
    }

    #[test]
    fn glyph_guess_is_inconclusive_without_ascenders() {
        let img = synthetic_text(false);
        assert_eq!(glyph_shape_guess(&img, &OrientationParams::default()), None);
    }

    #[test]
    fn alignment_guess_detects_ragged_side() {
        let params = OrientationParams::default();
        let img = synthetic_text(false);
        assert_eq!(line_alignment_guess(&img, &params), Some(Rotation::Deg0));
        let flipped = img.rotated(Rotation::Deg180);
        assert_eq!(line_alignment_guess(&flipped, &params), Some(Rotation::Deg180));
        let quarter = img.rotated(Rotation::Deg90);
        assert_eq!(line_alignment_guess(&quarter, &params), Some(Rotation::Deg270));
    }

    #[test]
    fn blank_page_is_inconclusive() {
        let img = Raster::blank(50, 50);
        let params = OrientationParams::default();
        assert_eq!(glyph_shape_guess(&img, &params), None);
        assert_eq!(line_alignment_guess(&img, &params), None);
    }
}
