//! Column geometry detection.
//!
//! Three independent sources can produce the initial column bands:
//! vertical rulings (found upstream or on the rendered image), a generic
//! table region with its sub-cells, and word alignment statistics. Every
//! path yields `None` when fewer than `min_cols` bands are plausible.

use crate::document::Page;
use crate::geometry::{BBox, bbox_overlap, cluster_means, cluster_objects};
use crate::ia::{LinesInfo, extract_lines};
use crate::layout::columns::{ColumnSource, Columns};
use crate::params::ReportParams;
use crate::raster::Raster;

/// Fallback text height when a page has no words.
const DEFAULT_TEXT_HEIGHT: f64 = 10.0;

pub struct ColumnDetector<'a> {
    page: &'a Page,
    params: &'a ReportParams,
}

impl<'a> ColumnDetector<'a> {
    pub fn new(page: &'a Page, params: &'a ReportParams) -> Self {
        Self { page, params }
    }

    /// Empty columns for the page, to be replaced by one of the
    /// detection paths.
    pub fn empty(&self) -> Columns {
        Columns::new(self.min_cols(), self.page.lines())
    }

    /// At least one band is always required.
    fn min_cols(&self) -> usize {
        self.params.min_cols.max(1)
    }

    /// Text height used to scale length thresholds.
    pub fn h_param(&self) -> f64 {
        let stats = self.page.statistics();
        [stats.h_line, stats.h_word]
            .into_iter()
            .find(|h| *h > 0.0)
            .unwrap_or(DEFAULT_TEXT_HEIGHT)
    }

    /// Ruling lines of a rendered page image, in page coordinates.
    pub fn detect_rulings(&self, img: &Raster) -> LinesInfo {
        if img.width() == 0 || img.height() == 0 {
            return LinesInfo::default();
        }
        let sx = self.page.bbox.width() / img.width() as f64;
        let sy = self.page.bbox.height() / img.height() as f64;
        let (sx, sy) = if sx > 0.0 && sy > 0.0 { (sx, sy) } else { (1.0, 1.0) };
        let letter_h = (self.page.statistics().h_word.max(1.0) / sy).round() as u32;
        let info = extract_lines(img, letter_h);
        let to_page = |b: &BBox| {
            let s = b.scaled(sx, sy);
            BBox::new(
                s.xlt + self.page.bbox.xlt,
                s.ylt + self.page.bbox.ylt,
                s.xrb + self.page.bbox.xlt,
                s.yrb + self.page.bbox.ylt,
            )
        };
        LinesInfo {
            hlines: info.hlines.iter().map(to_page).collect(),
            vlines: info.vlines.iter().map(to_page).collect(),
        }
    }

    /// Bands between vertical rulings found on the rendered image.
    pub fn from_image(&self, img: &Raster) -> Option<Columns> {
        let rulings = self.detect_rulings(img);
        self.from_rulings(&rulings.vlines, ColumnSource::Image)
    }

    /// Bands between consecutive vertical rulings.
    pub fn from_rulings(&self, vlines: &[BBox], source: ColumnSource) -> Option<Columns> {
        let min_len = self.params.min_ruling_len_factor * self.h_param();
        let kept: Vec<&BBox> = vlines.iter().filter(|b| b.height() >= min_len).collect();
        let ylt = kept.iter().map(|b| b.ylt).fold(f64::INFINITY, f64::min);
        let yrb = kept.iter().map(|b| b.yrb).fold(f64::NEG_INFINITY, f64::max);
        let xs = cluster_means(
            kept.iter().map(|b| b.x_mid()).collect(),
            self.params.snap_tolerance,
        );
        let bands: Vec<BBox> = xs
            .windows(2)
            .map(|w| BBox::new(w[0], ylt, w[1], yrb))
            .collect();
        self.accept(bands, source)
    }

    /// Bands from a generic table region and its sub-cells.
    ///
    /// Sub-cells overlapping horizontally belong to the same column; the
    /// resulting bands are widened to meet each other and the region edges.
    pub fn from_table(&self) -> Option<Columns> {
        let (region, subs) = self.page.table_region()?;
        if subs.len() < self.min_cols() {
            tracing::debug!(
                sub_regions = subs.len(),
                min_cols = self.min_cols(),
                "table region has too few sub-regions"
            );
            return None;
        }

        let mut spans: Vec<(f64, f64)> = subs.iter().map(|b| (b.xlt, b.xrb)).collect();
        spans.sort_by(|a, b| a.0.total_cmp(&b.0));
        let mut merged: Vec<(f64, f64)> = Vec::new();
        for (a, b) in spans {
            match merged.last_mut() {
                Some(last) if a < last.1 => last.1 = last.1.max(b),
                _ => merged.push((a, b)),
            }
        }

        let bands = contiguous(&merged, region.xlt, region.xrb)
            .into_iter()
            .map(|(a, b)| BBox::new(a, region.ylt, b, region.yrb))
            .collect();
        self.accept(bands, ColumnSource::TableRegion)
    }

    /// Bands from word alignment inside `section` (the whole page when
    /// `None`).
    ///
    /// Words are clustered by left edge, right edge and center; clusters
    /// with enough words become column text boxes.
    pub fn from_text(&self, section: Option<BBox>) -> Option<Columns> {
        let section = section.unwrap_or(self.page.bbox);
        let words: Vec<BBox> = self
            .page
            .words()
            .map(|w| w.bbox)
            .filter(|b| section.contains_y(b.y_mid()) && b.x_overlap(&section) > 0.0)
            .collect();
        let tolerance = self
            .params
            .snap_tolerance
            .max(self.page.statistics().h_word * 0.3);

        let mut clusters: Vec<Vec<BBox>> = Vec::new();
        clusters.extend(cluster_objects(&words, |b| b.xlt, tolerance));
        clusters.extend(cluster_objects(&words, |b| b.xrb, tolerance));
        clusters.extend(cluster_objects(&words, |b| b.x_mid(), tolerance));
        clusters.sort_by(|a, b| b.len().cmp(&a.len()));

        let mut condensed: Vec<BBox> = Vec::new();
        'outer: for cluster in clusters
            .iter()
            .filter(|c| c.len() >= self.params.min_words_vertical)
        {
            let Some(bbox) = crate::geometry::bbox_union(cluster.iter()) else {
                continue;
            };
            for c in &condensed {
                if bbox_overlap(bbox, *c).is_some() {
                    continue 'outer;
                }
            }
            condensed.push(bbox);
        }
        if condensed.is_empty() {
            return None;
        }
        condensed.sort_by(|a, b| a.xlt.total_cmp(&b.xlt));

        let ylt = condensed.iter().map(|b| b.ylt).fold(f64::INFINITY, f64::min);
        let yrb = condensed.iter().map(|b| b.yrb).fold(f64::NEG_INFINITY, f64::max);
        let spans: Vec<(f64, f64)> = condensed.iter().map(|b| (b.xlt, b.xrb)).collect();
        let left = spans[0].0.min(section.xlt);
        let right = spans[spans.len() - 1].1.max(section.xrb);
        let bands = contiguous(&spans, left, right)
            .into_iter()
            .map(|(a, b)| BBox::new(a, ylt, b, yrb))
            .collect();
        self.accept(bands, ColumnSource::Text)
    }

    fn accept(&self, bands: Vec<BBox>, source: ColumnSource) -> Option<Columns> {
        let min_cols = self.min_cols();
        if bands.len() < min_cols {
            tracing::debug!(bands = bands.len(), min_cols, ?source, "too few column bands");
            return None;
        }
        tracing::debug!(bands = bands.len(), ?source, "columns detected");
        Some(Columns::from_bands(min_cols, bands, source).with_lines(self.page.lines()))
    }
}

/// Widen sorted, disjoint spans so that neighbours meet halfway and the
/// outer ones reach `left` and `right`.
fn contiguous(spans: &[(f64, f64)], left: f64, right: f64) -> Vec<(f64, f64)> {
    let n = spans.len();
    (0..n)
        .map(|i| {
            let a = if i == 0 {
                left.min(spans[0].0)
            } else {
                (spans[i - 1].1 + spans[i].0) / 2.0
            };
            let b = if i + 1 == n {
                right.max(spans[n - 1].1)
            } else {
                (spans[i].1 + spans[i + 1].0) / 2.0
            };
            (a, b)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{IA_TABLE_REGION, IA_TABLE_SUB_REGIONS, Line, Word};

    fn page_with_words() -> Page {
        let mut lines = Vec::new();
        for r in 0..4 {
            let y = 100.0 + r as f64 * 20.0;
            lines.push(Line::new(vec![
                Word::new(BBox::new(20.0, y, 90.0, y + 10.0), "01/02/2021", 90.0),
                Word::new(BBox::new(120.0, y, 160.0, y + 10.0), "0250", 90.0),
                Word::new(BBox::new(200.0, y, 320.0, y + 10.0), "PHARMACY", 90.0),
                Word::new(BBox::new(430.0, y, 480.0, y + 10.0), "$12.00", 90.0),
            ]));
        }
        Page::new(BBox::new(0.0, 0.0, 500.0, 700.0), lines)
    }

    #[test]
    fn rulings_make_bands() {
        let page = page_with_words();
        let params = ReportParams::default();
        let det = ColumnDetector::new(&page, &params);
        let vlines: Vec<BBox> = [10.0, 100.0, 180.0, 400.0, 490.0]
            .iter()
            .map(|x| BBox::new(*x - 1.0, 90.0, *x + 1.0, 200.0))
            .collect();
        let cols = det.from_rulings(&vlines, ColumnSource::Gridline).unwrap();
        assert_eq!(cols.size(), 4);
        assert_eq!(cols.bboxes()[1], BBox::new(100.0, 90.0, 180.0, 200.0));

        // short rulings are ignored
        let short: Vec<BBox> = vlines.iter().map(|b| BBox::new(b.xlt, 90.0, b.xrb, 100.0)).collect();
        assert!(det.from_rulings(&short, ColumnSource::Gridline).is_none());
    }

    #[test]
    fn zero_min_cols_still_needs_a_band() {
        let page = page_with_words();
        let params = ReportParams {
            min_cols: 0,
            ..ReportParams::default()
        };
        let det = ColumnDetector::new(&page, &params);
        assert!(det.from_rulings(&[], ColumnSource::Gridline).is_none());
        let empty = det.empty();
        assert!(empty.is_empty());
        assert_eq!(empty.min_cols(), 1);
        assert_eq!(empty.line_count(), 4);
    }

    #[test]
    fn table_region_needs_enough_sub_regions() {
        let mut page = page_with_words();
        page.set_ia_bboxes(IA_TABLE_REGION, vec![BBox::new(0.0, 90.0, 500.0, 200.0)]);
        page.set_ia_bboxes(
            IA_TABLE_SUB_REGIONS,
            vec![BBox::new(0.0, 90.0, 100.0, 200.0), BBox::new(100.0, 90.0, 500.0, 200.0)],
        );
        let params = ReportParams::default();
        assert!(ColumnDetector::new(&page, &params).from_table().is_none());

        page.set_ia_bboxes(
            IA_TABLE_SUB_REGIONS,
            vec![
                BBox::new(10.0, 90.0, 95.0, 120.0),
                BBox::new(10.0, 120.0, 95.0, 200.0),
                BBox::new(110.0, 90.0, 170.0, 200.0),
                BBox::new(190.0, 90.0, 490.0, 200.0),
            ],
        );
        let cols = ColumnDetector::new(&page, &params).from_table().unwrap();
        assert_eq!(cols.size(), 3);
        let xs: Vec<(f64, f64)> = cols.bboxes().iter().map(|b| (b.xlt, b.xrb)).collect();
        assert_eq!(xs, vec![(0.0, 102.5), (102.5, 180.0), (180.0, 500.0)]);
        assert_eq!(cols.source(), Some(ColumnSource::TableRegion));
    }

    #[test]
    fn text_alignment_makes_bands() {
        let page = page_with_words();
        let params = ReportParams::default();
        let det = ColumnDetector::new(&page, &params);
        let cols = det.from_text(None).unwrap();
        assert_eq!(cols.size(), 4);
        for w in page.words() {
            assert!(cols.slot_for_x(w.bbox.x_mid()).is_some(), "{}", w.text);
        }
        // deterministic
        assert_eq!(det.from_text(None).unwrap().bboxes(), cols.bboxes());
    }

    #[test]
    fn image_rulings_are_scaled_to_page() {
        let page = page_with_words();
        let params = ReportParams::default();
        let det = ColumnDetector::new(&page, &params);
        // image at half the page resolution
        let mut img = Raster::blank(250, 350);
        for x in [5.0, 50.0, 90.0, 200.0, 245.0] {
            img.fill_rect(BBox::new(x, 40.0, x + 1.0, 110.0), 0);
        }
        let cols = det.from_image(&img).unwrap();
        assert_eq!(cols.size(), 4);
        assert_eq!(cols.bboxes()[0].xlt, 11.0);
        assert_eq!(cols.source(), Some(ColumnSource::Image));
    }
}
