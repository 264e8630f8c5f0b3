//! Global (Otsu) binarization.

use crate::raster::Raster;

/// Otsu threshold of the raster's histogram.
pub fn otsu_threshold(img: &Raster) -> u8 {
    let mut hist = [0u64; 256];
    for p in img.pixels().pixels() {
        hist[p[0] as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    if total == 0 {
        return 127;
    }
    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * c as f64)
        .sum();

    let mut sum_b = 0.0;
    let mut w_b = 0u64;
    let mut best = 0.0;
    let mut threshold = 127u8;
    for (t, &count) in hist.iter().enumerate() {
        w_b += count;
        if w_b == 0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f == 0 {
            break;
        }
        sum_b += t as f64 * count as f64;
        let m_b = sum_b / w_b as f64;
        let m_f = (sum_all - sum_b) / w_f as f64;
        let between = w_b as f64 * w_f as f64 * (m_b - m_f) * (m_b - m_f);
        if between > best {
            best = between;
            threshold = t as u8;
        }
    }
    threshold
}

/// Binary copy using the Otsu threshold; binary inputs are cloned as-is.
pub fn binarize_otsu(img: &Raster) -> Raster {
    if img.is_binary() {
        return img.clone();
    }
    let t = otsu_threshold(img);
    tracing::trace!(threshold = t, "otsu binarize");
    img.thresholded(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separates_two_levels() {
        let img = Raster::from_fn(10, 10, |x, _| if x < 3 { 40 } else { 210 });
        let t = otsu_threshold(&img);
        assert!((40..210).contains(&t));
        let bin = binarize_otsu(&img);
        assert!(bin.is_binary());
        assert!(bin.is_ink(0, 5));
        assert!(!bin.is_ink(9, 5));
    }
}
