//! Ruling-line grid bound to one page segment.

use std::collections::BTreeMap;
use std::fmt;

use crate::document::Page;
use crate::geometry::{BBox, cluster_means, cluster_objects};

/// Direction a ruling runs in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Axis {
    Horizontal,
    Vertical,
}

impl Axis {
    /// Coordinate across the line (y for horizontal rulings).
    fn position(self, b: &BBox) -> f64 {
        match self {
            Axis::Horizontal => b.y_mid(),
            Axis::Vertical => b.x_mid(),
        }
    }

    /// Start and end along the line.
    fn span(self, b: &BBox) -> (f64, f64) {
        match self {
            Axis::Horizontal => (b.xlt, b.xrb),
            Axis::Vertical => (b.ylt, b.yrb),
        }
    }

    fn length(self, b: &BBox) -> f64 {
        let (s, e) = self.span(b);
        e - s
    }
}

/// Horizontal and vertical rulings tied to a target segment.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Gridline {
    target: BBox,
    hlines: Vec<BBox>,
    vlines: Vec<BBox>,
    /// Class label per `(row, column)` cell, when upstream supplied them.
    cell_labels: Option<BTreeMap<(usize, usize), String>>,
    allow_join: bool,
}

impl Gridline {
    pub fn new(target: BBox, allow_join: bool) -> Self {
        Self {
            target,
            allow_join,
            ..Self::default()
        }
    }

    /// Rulings found upstream on the page, targeting the whole page.
    pub fn from_page(page: &Page, allow_join: bool) -> Self {
        Self {
            target: page.bbox,
            hlines: page.hlines().to_vec(),
            vlines: page.vlines().to_vec(),
            cell_labels: None,
            allow_join,
        }
    }

    pub fn target(&self) -> BBox {
        self.target
    }

    pub fn set_target_segment(&mut self, target: BBox) {
        self.target = target;
    }

    pub fn allow_join(&self) -> bool {
        self.allow_join
    }

    pub fn hlines(&self) -> &[BBox] {
        &self.hlines
    }

    pub fn vlines(&self) -> &[BBox] {
        &self.vlines
    }

    pub fn set_hlines(&mut self, hlines: Vec<BBox>) {
        self.hlines = hlines;
    }

    /// Replace the vertical rulings wholesale.
    pub fn set_vlines(&mut self, vlines: Vec<BBox>) {
        self.vlines = vlines;
    }

    /// Drop both ruling sets and the cell labels tied to them.
    pub fn clear_lines(&mut self) {
        self.hlines.clear();
        self.vlines.clear();
        self.cell_labels = None;
    }

    pub fn cell_labels(&self) -> Option<&BTreeMap<(usize, usize), String>> {
        self.cell_labels.as_ref()
    }

    pub fn set_cell_labels(&mut self, labels: Option<BTreeMap<(usize, usize), String>>) {
        self.cell_labels = labels;
    }

    pub fn cell_label(&self, row: usize, col: usize) -> Option<&str> {
        self.cell_labels.as_ref()?.get(&(row, col)).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.hlines.is_empty() && self.vlines.is_empty()
    }

    /// Rulings of one axis that touch the target segment, joined when
    /// joining is allowed.
    pub fn rulings(&self, axis: Axis, join_tolerance: f64) -> Vec<BBox> {
        let lines = match axis {
            Axis::Horizontal => &self.hlines,
            Axis::Vertical => &self.vlines,
        };
        let t = self.target;
        let inside: Vec<BBox> = lines
            .iter()
            .filter(|b| match axis {
                Axis::Horizontal => t.contains_y(b.y_mid()) && b.x_overlap(&t) > 0.0,
                Axis::Vertical => {
                    b.x_mid() >= t.xlt && b.x_mid() <= t.xrb && b.y_overlap(&t) > 0.0
                }
            })
            .copied()
            .collect();
        if !self.allow_join {
            return inside;
        }
        snap_lines(&inside, axis, join_tolerance)
            .into_iter()
            .flat_map(|group| join_line_group(&group, axis, join_tolerance))
            .collect()
    }

    /// Distinct ruling positions of one axis, at least `min_len` long,
    /// clustered with `snap_tolerance`. Ascending.
    pub fn positions(
        &self,
        axis: Axis,
        snap_tolerance: f64,
        join_tolerance: f64,
        min_len: f64,
    ) -> Vec<f64> {
        let xs = self
            .rulings(axis, join_tolerance)
            .iter()
            .filter(|b| axis.length(b) >= min_len)
            .map(|b| axis.position(b))
            .collect();
        cluster_means(xs, snap_tolerance)
    }
}

impl fmt::Display for Gridline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ts:{} hlines:{} vlines:{}",
            self.target,
            self.hlines.len(),
            self.vlines.len()
        )
    }
}

/// Group rulings that lie on the same position within `tolerance`, every
/// member moved to the group's mean position.
pub fn snap_lines(lines: &[BBox], axis: Axis, tolerance: f64) -> Vec<Vec<BBox>> {
    cluster_objects(lines, |b| axis.position(b), tolerance)
        .into_iter()
        .map(|group| {
            let avg = group.iter().map(|b| axis.position(b)).sum::<f64>() / group.len() as f64;
            group
                .into_iter()
                .map(|b| {
                    let d = avg - axis.position(&b);
                    match axis {
                        Axis::Horizontal => BBox::new(b.xlt, b.ylt + d, b.xrb, b.yrb + d),
                        Axis::Vertical => BBox::new(b.xlt + d, b.ylt, b.xrb + d, b.yrb),
                    }
                })
                .collect()
        })
        .collect()
}

/// Join collinear rulings whose ends are within `tolerance`.
pub fn join_line_group(lines: &[BBox], axis: Axis, tolerance: f64) -> Vec<BBox> {
    let mut sorted = lines.to_vec();
    sorted.sort_by(|a, b| axis.span(a).0.total_cmp(&axis.span(b).0));
    let mut joined: Vec<BBox> = Vec::new();
    for b in sorted {
        match joined.last_mut() {
            Some(last) if axis.span(&b).0 <= axis.span(last).1 + tolerance => {
                *last = last.union(&b);
            }
            _ => joined.push(b),
        }
    }
    joined
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_ruling_is_joined_only_when_allowed() {
        let mut grid = Gridline::new(BBox::new(0.0, 0.0, 500.0, 500.0), true);
        grid.set_vlines(vec![
            BBox::new(100.0, 10.0, 102.0, 200.0),
            BBox::new(101.0, 202.0, 103.0, 400.0),
            BBox::new(300.0, 10.0, 302.0, 400.0),
        ]);
        let joined = grid.rulings(Axis::Vertical, 3.0);
        assert_eq!(joined.len(), 2);
        assert_eq!(joined[0].ylt, 10.0);
        assert_eq!(joined[0].yrb, 400.0);
        assert_eq!(grid.positions(Axis::Vertical, 3.0, 3.0, 300.0), vec![101.5, 301.0]);

        let strict = Gridline {
            allow_join: false,
            ..grid.clone()
        };
        assert_eq!(strict.rulings(Axis::Vertical, 3.0).len(), 3);
        assert_eq!(strict.positions(Axis::Vertical, 3.0, 3.0, 300.0), vec![301.0]);
    }

    #[test]
    fn target_segment_filters_rulings() {
        let mut grid = Gridline::new(BBox::new(0.0, 0.0, 500.0, 500.0), false);
        grid.set_hlines(vec![
            BBox::new(0.0, 50.0, 500.0, 52.0),
            BBox::new(0.0, 450.0, 500.0, 452.0),
        ]);
        grid.set_target_segment(BBox::new(0.0, 300.0, 500.0, 500.0));
        assert_eq!(grid.rulings(Axis::Horizontal, 0.0).len(), 1);
        insta::assert_snapshot!(grid.to_string(), @"ts:[0,300,500,500] hlines:2 vlines:0");
        grid.clear_lines();
        assert!(grid.is_empty());
    }

    #[test]
    fn cell_labels_follow_the_rulings() {
        let mut grid = Gridline::new(BBox::new(0.0, 0.0, 500.0, 500.0), false);
        assert!(grid.cell_labels().is_none());
        grid.set_vlines(vec![BBox::new(100.0, 0.0, 101.0, 500.0)]);
        grid.set_cell_labels(Some(BTreeMap::from([
            ((0, 0), "header".to_string()),
            ((2, 1), "total".to_string()),
        ])));
        assert_eq!(grid.cell_label(0, 0), Some("header"));
        assert_eq!(grid.cell_label(2, 1), Some("total"));
        assert_eq!(grid.cell_label(1, 1), None);
        grid.clear_lines();
        assert!(grid.cell_labels().is_none());
        assert_eq!(grid.cell_label(0, 0), None);
    }
}
