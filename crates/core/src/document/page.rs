//! A scanned page: text lines, transform, auxiliary geometry and images.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use super::word::{Line, Word};
use crate::geometry::BBox;
use crate::raster::Raster;

/// Auxiliary geometry key: horizontal ruling lines.
pub const IA_RULING_HORIZONTAL: &str = "ruling-horizontal";
/// Auxiliary geometry key: vertical ruling lines.
pub const IA_RULING_VERTICAL: &str = "ruling-vertical";
/// Auxiliary geometry key: a generic table region (one bbox).
pub const IA_TABLE_REGION: &str = "table-region";
/// Auxiliary geometry key: sub-cells of the generic table region.
pub const IA_TABLE_SUB_REGIONS: &str = "table-sub-regions";

/// Transformation applied to the source image before layout analysis.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceTransform {
    /// Cardinal rotation in degrees (0, 90, 180, 270).
    pub rotation: i32,
    pub scale: f64,
    pub scale_to_a4: f64,
    /// Sub-degree deskew in degrees.
    pub skew: f64,
    pub bbox_clip: Option<BBox>,
}

/// Cached text-height statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct PageStatistics {
    /// Mean height of non-empty lines.
    pub h_line: f64,
    /// Mean height of words.
    pub h_word: f64,
}

impl PageStatistics {
    fn compute(lines: &[Line]) -> Self {
        let line_heights: Vec<f64> = lines
            .iter()
            .filter(|l| !l.is_empty())
            .map(|l| l.bbox().height())
            .collect();
        let word_heights: Vec<f64> = lines
            .iter()
            .flat_map(|l| l.words.iter())
            .map(|w| w.bbox.height())
            .collect();
        Self {
            h_line: mean(&line_heights),
            h_word: mean(&word_heights),
        }
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

/// One page of a document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Page {
    pub bbox: BBox,
    #[serde(default)]
    pub lines: Vec<Line>,
    #[serde(default)]
    pub transform: SourceTransform,
    /// Named geometry sets produced by upstream analysis.
    #[serde(default)]
    pub ia: BTreeMap<String, Vec<BBox>>,
    #[serde(skip)]
    images: BTreeMap<String, Arc<Raster>>,
    #[serde(skip)]
    stats: OnceCell<PageStatistics>,
}

impl Page {
    pub fn new(bbox: BBox, lines: Vec<Line>) -> Self {
        Self {
            bbox,
            lines,
            ..Self::default()
        }
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn words(&self) -> impl Iterator<Item = &Word> {
        self.lines.iter().flat_map(|l| l.words.iter())
    }

    pub fn word_count(&self) -> usize {
        self.lines.iter().map(Line::len).sum()
    }

    /// Text-height statistics, computed on first use.
    pub fn statistics(&self) -> &PageStatistics {
        self.stats.get_or_init(|| PageStatistics::compute(&self.lines))
    }

    pub fn ia_keys(&self) -> impl Iterator<Item = &str> {
        self.ia.keys().map(String::as_str)
    }

    /// Geometry set stored under `key`, empty when absent.
    pub fn ia_bboxes(&self, key: &str) -> &[BBox] {
        self.ia.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set_ia_bboxes(&mut self, key: impl Into<String>, bboxes: Vec<BBox>) {
        self.ia.insert(key.into(), bboxes);
    }

    pub fn hlines(&self) -> &[BBox] {
        self.ia_bboxes(IA_RULING_HORIZONTAL)
    }

    pub fn vlines(&self) -> &[BBox] {
        self.ia_bboxes(IA_RULING_VERTICAL)
    }

    /// The generic table region and its sub-cells, if upstream found one.
    pub fn table_region(&self) -> Option<(BBox, &[BBox])> {
        let region = self.ia_bboxes(IA_TABLE_REGION).first()?;
        Some((*region, self.ia_bboxes(IA_TABLE_SUB_REGIONS)))
    }

    pub fn has_image(&self, key: &str) -> bool {
        self.images.contains_key(key)
    }

    pub fn image(&self, key: &str) -> Option<&Arc<Raster>> {
        self.images.get(key)
    }

    pub fn set_image(&mut self, key: impl Into<String>, image: Arc<Raster>) {
        self.images.insert(key.into(), image);
    }

    /// Record a rotation decision; text geometry is expected to be
    /// recomputed by the caller against the corrected image.
    pub fn apply_rotation(&mut self, rotation: Option<i32>, deskew: f64) {
        if let Some(deg) = rotation {
            self.transform.rotation = deg;
        }
        self.transform.skew = deskew;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statistics_average_heights() {
        let page = Page::new(
            BBox::new(0.0, 0.0, 100.0, 100.0),
            vec![
                Line::new(vec![
                    Word::new(BBox::new(0.0, 0.0, 10.0, 10.0), "a", 90.0),
                    Word::new(BBox::new(12.0, 0.0, 20.0, 14.0), "b", 90.0),
                ]),
                Line::new(vec![Word::new(BBox::new(0.0, 20.0, 10.0, 26.0), "c", 90.0)]),
                Line::default(),
            ],
        );
        let stats = page.statistics();
        assert_eq!(stats.h_line, 10.0);
        assert_eq!(stats.h_word, 10.0);
    }

    #[test]
    fn missing_ia_key_is_empty() {
        let page = Page::default();
        assert!(page.hlines().is_empty());
        assert!(page.table_region().is_none());
    }
}
