//! Ink projection profiles and band detection.

use crate::raster::Raster;

/// Ink pixel count per row.
pub fn row_profile(img: &Raster) -> Vec<u32> {
    let mut out = vec![0u32; img.height() as usize];
    for (y, slot) in out.iter_mut().enumerate() {
        *slot = (0..img.width()).filter(|&x| img.is_ink(x, y as u32)).count() as u32;
    }
    out
}

/// Ink pixel count per column.
pub fn col_profile(img: &Raster) -> Vec<u32> {
    let mut out = vec![0u32; img.width() as usize];
    for y in 0..img.height() {
        for (x, slot) in out.iter_mut().enumerate() {
            if img.is_ink(x as u32, y) {
                *slot += 1;
            }
        }
    }
    out
}

/// Half-open index ranges where the profile is above `min_value`.
pub fn bands(profile: &[u32], min_value: u32) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start: Option<usize> = None;
    for (i, &v) in profile.iter().enumerate() {
        match (v > min_value, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, profile.len()));
    }
    out
}

/// Population variance of a profile.
pub fn variance(profile: &[u32]) -> f64 {
    if profile.is_empty() {
        return 0.0;
    }
    let n = profile.len() as f64;
    let mean = profile.iter().map(|&v| v as f64).sum::<f64>() / n;
    profile
        .iter()
        .map(|&v| {
            let d = v as f64 - mean;
            d * d
        })
        .sum::<f64>()
        / n
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    #[test]
    fn bands_of_two_text_lines() {
        let mut img = Raster::blank(20, 20);
        img.fill_rect(BBox::new(2.0, 2.0, 18.0, 5.0), 0);
        img.fill_rect(BBox::new(2.0, 10.0, 12.0, 14.0), 0);
        let rows = row_profile(&img);
        assert_eq!(rows[3], 16);
        assert_eq!(bands(&rows, 0), vec![(2, 5), (10, 14)]);
        let cols = col_profile(&img);
        assert_eq!(cols[5], 7);
        assert_eq!(cols[15], 3);
    }
}
