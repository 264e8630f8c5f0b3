//! Vertical page segments.
//!
//! Lines are split into segments wherever the vertical gap between two
//! consecutive lines exceeds a multiple of the median line height.

use std::ops::Range;

use itertools::Itertools;

use crate::document::Line;
use crate::geometry::{BBox, bbox_union};

/// Gap, in median line heights, that starts a new segment.
pub const SEGMENT_GAP_FACTOR: f64 = 2.0;

/// A run of vertically close lines.
#[derive(Clone, Debug, PartialEq)]
pub struct Segment {
    pub bbox: BBox,
    /// Indices into the page's (non-empty) lines, top to bottom.
    pub lines: Vec<usize>,
}

impl Segment {
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[derive(Clone, Debug, Default)]
pub struct PageSegments {
    segments: Vec<Segment>,
}

impl PageSegments {
    pub fn new(lines: &[Line]) -> Self {
        Self::with_gap_factor(lines, SEGMENT_GAP_FACTOR)
    }

    pub fn with_gap_factor(lines: &[Line], gap_factor: f64) -> Self {
        let order: Vec<(usize, BBox)> = lines
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_empty())
            .map(|(i, l)| (i, l.bbox()))
            .sorted_by(|a, b| a.1.ylt.total_cmp(&b.1.ylt))
            .collect();
        if order.is_empty() {
            return Self::default();
        }

        let heights: Vec<f64> = order
            .iter()
            .map(|(_, b)| b.height())
            .sorted_by(f64::total_cmp)
            .collect();
        let median = heights[heights.len() / 2];
        let max_gap = median * gap_factor;

        let mut cuts: Vec<usize> = vec![0];
        let mut bottom = order[0].1.yrb;
        for (k, ((_, _), (_, next))) in order.iter().tuple_windows().enumerate() {
            if next.ylt - bottom > max_gap {
                cuts.push(k + 1);
            }
            bottom = bottom.max(next.yrb);
        }
        cuts.push(order.len());

        let segments = cuts
            .iter()
            .tuple_windows()
            .map(|(&a, &b)| segment_of(&order[a..b]))
            .collect();
        Self { segments }
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Segment holding the line at `line_idx`.
    pub fn segment_of_line(&self, line_idx: usize) -> Option<usize> {
        self.segments
            .iter()
            .position(|s| s.lines.contains(&line_idx))
    }

    /// Segments whose range of positions lies in `range`, merged.
    pub fn merged(&self, range: Range<usize>) -> Option<Segment> {
        let parts = self.segments.get(range)?;
        let bbox = bbox_union(parts.iter().map(|s| &s.bbox))?;
        Some(Segment {
            bbox,
            lines: parts.iter().flat_map(|s| s.lines.iter().copied()).collect(),
        })
    }
}

fn segment_of(run: &[(usize, BBox)]) -> Segment {
    Segment {
        bbox: bbox_union(run.iter().map(|(_, b)| b)).unwrap_or_default(),
        lines: run.iter().map(|(i, _)| *i).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Word;

    fn line_at(y: f64) -> Line {
        Line::new(vec![Word::new(BBox::new(10.0, y, 80.0, y + 10.0), "w", 90.0)])
    }

    #[test]
    fn large_gap_splits_segments() {
        let lines = vec![
            line_at(0.0),
            line_at(14.0),
            line_at(28.0),
            Line::default(),
            line_at(100.0),
            line_at(114.0),
        ];
        let segs = PageSegments::new(&lines);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs.segments()[0].lines, vec![0, 1, 2]);
        assert_eq!(segs.segments()[1].lines, vec![4, 5]);
        assert_eq!(segs.segments()[1].bbox, BBox::new(10.0, 100.0, 80.0, 124.0));
        assert_eq!(segs.segment_of_line(5), Some(1));
        assert_eq!(segs.merged(0..2).map(|s| s.len()), Some(5));
    }

    #[test]
    fn no_lines_no_segments() {
        assert!(PageSegments::new(&[]).is_empty());
    }
}
