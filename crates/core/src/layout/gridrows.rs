//! Rows and cells of a table segment.
//!
//! Rows come from horizontal rulings that span most of the segment or,
//! without such rulings, from horizontal word-density bands. Every row has
//! one cell per column slot.

use std::fmt;

use crate::document::{Document, Page, Word};
use crate::error::Result;
use crate::geometry::{BBox, bbox_union, cluster_objects};
use crate::layout::columns::Columns;
use crate::layout::gridline::{Axis, Gridline};
use crate::params::ReportParams;

/// A ruling must span this share of the segment width to split rows.
const ROW_RULING_COVERAGE: f64 = 0.5;

/// One cell: a bbox and the words placed in it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Cell {
    bbox: BBox,
    words: Vec<Word>,
    label: Option<String>,
}

impl Cell {
    pub fn new(bbox: BBox) -> Self {
        Self {
            bbox,
            words: Vec::new(),
            label: None,
        }
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    /// Class label of the cell taken from the gridline.
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| w.text.trim().is_empty())
    }

    /// Words in reading order joined by single spaces.
    pub fn text(&self) -> String {
        let mut words: Vec<&Word> = self.words.iter().collect();
        words.sort_by(|a, b| {
            a.bbox
                .ylt
                .total_cmp(&b.bbox.ylt)
                .then(a.bbox.xlt.total_cmp(&b.bbox.xlt))
        });
        words
            .iter()
            .map(|w| w.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn clear(&mut self) {
        self.words.clear();
    }

    pub(crate) fn push(&mut self, word: Word) {
        self.words.push(word);
    }
}

/// One table row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridRow {
    bbox: BBox,
    cells: Vec<Cell>,
    /// Index of the physical page line the row was built from.
    line: Option<usize>,
    wrapped: bool,
    ignored: bool,
}

impl GridRow {
    /// A row with `col_size` empty cells.
    pub fn new(col_size: usize, line: Option<usize>) -> Self {
        Self {
            cells: vec![Cell::default(); col_size],
            line,
            ..Self::default()
        }
    }

    fn from_cells(bbox: BBox, cells: Vec<Cell>, line: Option<usize>) -> Self {
        Self {
            bbox,
            cells,
            line,
            ..Self::default()
        }
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cell(&self, i: usize) -> Option<&Cell> {
        self.cells.get(i)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn line(&self) -> Option<usize> {
        self.line
    }

    /// Number of cells holding text.
    pub fn non_empty(&self) -> usize {
        self.cells.iter().filter(|c| !c.is_empty()).count()
    }

    /// The row continues the item above it.
    pub fn is_wrapped(&self) -> bool {
        self.wrapped
    }

    /// The row was dropped as noise.
    pub fn ignored(&self) -> bool {
        self.ignored
    }

    pub fn valid(&self) -> bool {
        !self.ignored && self.non_empty() > 0
    }

    pub(crate) fn mark_wrapped(&mut self) {
        self.wrapped = true;
    }

    pub(crate) fn mark_ignored(&mut self) {
        self.ignored = true;
    }

    /// Cell texts; empty cells render as nothing.
    pub fn text(&self, multi_spaces: bool) -> String {
        let sep = if multi_spaces { "   " } else { " " };
        self.cells
            .iter()
            .map(Cell::text)
            .collect::<Vec<_>>()
            .join(sep)
            .trim()
            .to_string()
    }
}

/// A segment partitioned into rows of cells.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GridRows {
    segment: BBox,
    rows: Vec<GridRow>,
}

impl GridRows {
    /// Rows from explicit cell boxes, one inner list per row.
    pub fn from_cells(rows_cells_bboxes: Vec<Vec<BBox>>) -> Self {
        let rows: Vec<GridRow> = rows_cells_bboxes
            .into_iter()
            .map(|cells| {
                let bbox = bbox_union(cells.iter()).unwrap_or_default();
                GridRow::from_cells(bbox, cells.into_iter().map(Cell::new).collect(), None)
            })
            .collect();
        let segment = bbox_union(rows.iter().map(|r| &r.bbox)).unwrap_or_default();
        Self { segment, rows }
    }

    /// Rows of one page of `doc`, parameters taken from the document
    /// configuration.
    pub fn init(doc: &Document, page_idx: usize, cols: &Columns, grid: &Gridline) -> Result<Self> {
        let page = doc.page(page_idx)?;
        let params = ReportParams::from_config(&doc.config);
        Ok(Self::for_page(page, cols, grid, &params))
    }

    /// Rows covering the vertical extent of the columns.
    pub fn for_page(page: &Page, cols: &Columns, grid: &Gridline, params: &ReportParams) -> Self {
        let Some(cols_bbox) = cols.bbox() else {
            return Self::default();
        };
        let segment = cols_bbox;
        let stats = page.statistics();

        let ruled = row_bands_from_rulings(grid, segment, params);
        let (bands, source) = if ruled.len() >= 2 {
            (ruled, "rulings")
        } else {
            (row_bands_from_words(page, segment, stats.h_word), "word-density")
        };

        let slots = cols.bboxes();
        let rows: Vec<GridRow> = bands
            .into_iter()
            .enumerate()
            .map(|(ri, band)| {
                let cells = slots
                    .iter()
                    .enumerate()
                    .map(|(ci, s)| Cell {
                        label: grid.cell_label(ri, ci).map(str::to_string),
                        ..Cell::new(BBox::new(s.xlt, band.ylt, s.xrb, band.yrb))
                    })
                    .collect();
                GridRow::from_cells(band, cells, line_of_band(page, band))
            })
            .collect();
        tracing::debug!(rows = rows.len(), source, "grid rows built");
        Self { segment, rows }
    }

    pub fn segment(&self) -> BBox {
        self.segment
    }

    /// Class label of cell `col` in row `row`.
    pub fn label(&self, row: usize, col: usize) -> Option<&str> {
        self.rows.get(row)?.cell(col)?.label()
    }

    pub fn rows(&self) -> &[GridRow] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [GridRow] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Place a word in `slot` of the row containing its vertical midpoint.
    /// Returns false when no row contains it.
    pub fn place(&mut self, slot: usize, word: &Word) -> bool {
        let y = word.bbox.y_mid();
        let Some(row) = self.rows.iter_mut().find(|r| r.bbox.contains_y(y)) else {
            return false;
        };
        match row.cells.get_mut(slot) {
            Some(cell) => {
                cell.push(word.clone());
                true
            }
            None => false,
        }
    }
}

impl fmt::Display for GridRows {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, row) in self.rows.iter().enumerate() {
            writeln!(f, "{i:3}: {}", row.text(true))?;
        }
        Ok(())
    }
}

/// Bands between consecutive full-width horizontal rulings.
fn row_bands_from_rulings(grid: &Gridline, segment: BBox, params: &ReportParams) -> Vec<BBox> {
    let min_len = segment.width() * ROW_RULING_COVERAGE;
    let ys: Vec<f64> = grid
        .positions(
            Axis::Horizontal,
            params.snap_tolerance,
            params.join_tolerance,
            min_len,
        )
        .into_iter()
        .filter(|y| segment.contains_y(*y))
        .collect();
    if ys.is_empty() {
        return Vec::new();
    }
    let mut edges = Vec::with_capacity(ys.len() + 2);
    if ys[0] - segment.ylt > params.snap_tolerance {
        edges.push(segment.ylt);
    }
    edges.extend(ys.iter().copied());
    if let Some(&last) = ys.last()
        && segment.yrb - last > params.snap_tolerance
    {
        edges.push(segment.yrb);
    }
    edges
        .windows(2)
        .map(|w| BBox::new(segment.xlt, w[0], segment.xrb, w[1]))
        .collect()
}

/// Bands of vertically overlapping words inside the segment.
fn row_bands_from_words(page: &Page, segment: BBox, h_word: f64) -> Vec<BBox> {
    let words: Vec<BBox> = page
        .words()
        .map(|w| w.bbox)
        .filter(|b| segment.contains_y(b.y_mid()) && b.x_overlap(&segment) > 0.0)
        .collect();
    let tolerance = (h_word * 0.5).max(1.0);
    let mut bands: Vec<BBox> = cluster_objects(&words, |b| b.y_mid(), tolerance)
        .into_iter()
        .filter_map(|group| bbox_union(group.iter()))
        .map(|b| BBox::new(segment.xlt, b.ylt, segment.xrb, b.yrb))
        .collect();
    // neighbouring bands may overlap by a few pixels
    for i in 1..bands.len() {
        if bands[i].ylt < bands[i - 1].yrb {
            let mid = (bands[i].ylt + bands[i - 1].yrb) / 2.0;
            bands[i - 1].yrb = mid;
            bands[i].ylt = mid;
        }
    }
    bands
}

fn line_of_band(page: &Page, band: BBox) -> Option<usize> {
    page.lines()
        .iter()
        .position(|l| !l.is_empty() && band.contains_y(l.bbox().y_mid()))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::document::Line;
    use crate::layout::columns::ColumnSource;

    fn word(x: f64, y: f64, text: &str) -> Word {
        Word::new(BBox::new(x, y, x + 40.0, y + 10.0), text, 90.0)
    }

    fn two_columns() -> Columns {
        Columns::from_bands(
            2,
            vec![
                BBox::new(0.0, 0.0, 100.0, 200.0),
                BBox::new(100.0, 0.0, 200.0, 200.0),
            ],
            ColumnSource::Gridline,
        )
    }

    #[test]
    fn explicit_cells() {
        let rows = GridRows::from_cells(vec![
            vec![BBox::new(0.0, 0.0, 10.0, 10.0), BBox::new(10.0, 0.0, 20.0, 10.0)],
            vec![BBox::new(0.0, 10.0, 10.0, 20.0), BBox::new(10.0, 10.0, 20.0, 20.0)],
        ]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.segment(), BBox::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(rows.rows()[1].len(), 2);
        assert!(!rows.rows()[0].valid());
    }

    #[test]
    fn word_density_rows_without_rulings() {
        let page = Page::new(
            BBox::new(0.0, 0.0, 200.0, 200.0),
            vec![
                Line::new(vec![word(10.0, 20.0, "a"), word(110.0, 21.0, "b")]),
                Line::new(vec![word(10.0, 60.0, "c")]),
            ],
        );
        let cols = two_columns();
        let mut rows = GridRows::for_page(&page, &cols, &Gridline::default(), &ReportParams::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows.rows()[0].line(), Some(0));
        assert_eq!(rows.rows()[1].line(), Some(1));

        assert!(rows.place(1, &word(110.0, 21.0, "b")));
        assert!(rows.place(0, &word(10.0, 60.0, "c")));
        assert!(!rows.place(0, &word(10.0, 150.0, "z")));
        assert_eq!(rows.rows()[0].non_empty(), 1);
        assert_eq!(rows.rows()[0].text(false), "b");
        assert_eq!(rows.rows()[1].cell(0).map(Cell::text), Some("c".to_string()));
    }

    #[test]
    fn ruled_rows_follow_horizontal_rulings() {
        let page = Page::new(BBox::new(0.0, 0.0, 200.0, 200.0), Vec::new());
        let mut grid = Gridline::new(page.bbox, false);
        grid.set_hlines(vec![
            BBox::new(0.0, 49.0, 200.0, 51.0),
            BBox::new(0.0, 99.0, 200.0, 101.0),
            BBox::new(0.0, 149.0, 60.0, 151.0),
        ]);
        let rows = GridRows::for_page(&page, &two_columns(), &grid, &ReportParams::default());
        let ys: Vec<(f64, f64)> = rows.rows().iter().map(|r| (r.bbox().ylt, r.bbox().yrb)).collect();
        assert_eq!(ys, vec![(0.0, 50.0), (50.0, 100.0), (100.0, 200.0)]);
        assert_eq!(rows.rows()[2].cells()[1].bbox(), BBox::new(100.0, 100.0, 200.0, 200.0));
        assert_eq!(rows.label(0, 0), None);
    }

    #[test]
    fn cells_carry_gridline_labels() {
        let page = Page::new(BBox::new(0.0, 0.0, 200.0, 200.0), Vec::new());
        let mut grid = Gridline::new(page.bbox, false);
        grid.set_hlines(vec![
            BBox::new(0.0, 49.0, 200.0, 51.0),
            BBox::new(0.0, 99.0, 200.0, 101.0),
        ]);
        grid.set_cell_labels(Some(BTreeMap::from([
            ((0, 1), "header".to_string()),
            ((2, 0), "total".to_string()),
            ((7, 0), "outside".to_string()),
        ])));
        let rows = GridRows::for_page(&page, &two_columns(), &grid, &ReportParams::default());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.rows()[0].cells()[1].label(), Some("header"));
        assert_eq!(rows.label(2, 0), Some("total"));
        assert_eq!(rows.label(0, 0), None);
        assert_eq!(rows.label(7, 0), None);
    }

    #[test]
    fn init_reads_page_from_document() {
        let mut doc = Document::default();
        doc.push_page(Page::new(
            BBox::new(0.0, 0.0, 200.0, 200.0),
            vec![Line::new(vec![word(10.0, 20.0, "a")])],
        ));
        let rows = GridRows::init(&doc, 0, &two_columns(), &Gridline::default()).unwrap();
        assert_eq!(rows.len(), 1);
        assert!(GridRows::init(&doc, 1, &two_columns(), &Gridline::default()).is_err());
    }
}
