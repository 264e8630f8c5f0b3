//! Itemized-billing report: from column geometry to parsed line items.
//!
//! A [`Report`] owns the state of one page while it moves through the
//! pipeline steps:
//!
//! 1. `find_columns` - initial column bands
//! 2. `handle_corner_case` - repair collapsed and clipped bands
//! 3. `extend_grid` - stretch the table over adjacent rulings
//! 4. `words_to_columns` - distribute page words over the slots
//! 5. `best_columns` - assign a column type to each slot
//! 6. `parse` - build line items from the grid rows
//!
//! Every step first consults the bound [`FormTemplate`]; a denied step is
//! a no-op that reports [`StepOutcome::Skipped`]. Steps may be re-run and
//! run in any order; later steps simply find less to work with.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use smallvec::{SmallVec, smallvec};
use tracing::{debug, trace, warn};

use crate::document::{Document, Page, Word};
use crate::error::{IbError, Result};
use crate::forms::checkpoint::{CheckpointSink, NullSink, ReportCheckpoint, SlotState};
use crate::forms::classify::{ColumnScorer, FeatureScorer, IbForm, column_features};
use crate::forms::items::{Field, FieldValue, LineItem, date_year, parse_date};
use crate::forms::subtypes::{ColumnFormat, Fill, Missing, detect_fill};
use crate::forms::template::{FormTemplate, PipelineStep};
use crate::geometry::{BBox, bbox_union, cluster_means};
use crate::layout::columns::{
    ColFeats, Column, ColumnMove, ColumnSource, ColumnType, Columns, CornerCase, Edge,
};
use crate::layout::detect::ColumnDetector;
use crate::layout::gridline::{Axis, Gridline};
use crate::layout::gridrows::GridRows;
use crate::ocr::OcrEngine;
use crate::params::ReportParams;
use crate::raster::Raster;

/// Image key under which a page's rendered raster is stored.
pub const PAGE_IMAGE_KEY: &str = "page";

/// Header words are looked for this many line heights above the table.
const HEADER_BAND_LINES: f64 = 3.0;

/// Result of one pipeline step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    /// The template denied the step.
    Skipped,
    /// The step ran but found nothing to work with.
    NoResult,
    /// The step ran; `count` is step specific (slots, moves, words, items).
    Completed { count: usize },
}

impl StepOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed { .. })
    }

    pub fn count(&self) -> usize {
        match self {
            StepOutcome::Completed { count } => *count,
            _ => 0,
        }
    }
}

/// A word placed in a column slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AssignedWord {
    pub slot: usize,
    pub word: Word,
    /// Part of a word that straddled a slot boundary and was re-recognized.
    #[serde(default)]
    pub split: bool,
}

/// Pipeline state of one page.
pub struct Report {
    doc: Arc<Document>,
    page_idx: usize,
    image: Option<Arc<Raster>>,
    columns: Columns,
    grid: Gridline,
    template: Option<FormTemplate>,
    params: ReportParams,
    scorer: Box<dyn ColumnScorer>,
    sink: Arc<dyn CheckpointSink>,
    ocr: Option<Arc<dyn OcrEngine>>,
    completed: Vec<PipelineStep>,
    assigned: Vec<AssignedWord>,
    orphans: Vec<Word>,
    rows: GridRows,
    formats: Vec<ColumnFormat>,
    items: Vec<LineItem>,
    text_debug: bool,
}

impl std::fmt::Debug for Report {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Report")
            .field("page", &self.page_idx)
            .field("template", &self.template.as_ref().map(FormTemplate::id))
            .field("columns", &self.columns.size())
            .field("known", &self.columns.known())
            .field("completed", &self.completed)
            .field("items", &self.items.len())
            .finish()
    }
}

impl Report {
    /// Create a report for page `page_idx` of `doc`.
    ///
    /// `image` is copied once here; the copy is shared for the lifetime
    /// of the report.
    pub fn new(
        doc: Arc<Document>,
        page_idx: usize,
        columns: Columns,
        grid: Gridline,
        template: Option<FormTemplate>,
        image: Option<&Raster>,
    ) -> Result<Self> {
        doc.page(page_idx)?;
        let params = ReportParams::from_config(&doc.config);
        Ok(Self {
            doc,
            page_idx,
            image: image.map(|img| Arc::new(img.clone())),
            columns,
            grid,
            template,
            params,
            scorer: Box::new(FeatureScorer::default()),
            sink: Arc::new(NullSink),
            ocr: None,
            completed: Vec::new(),
            assigned: Vec::new(),
            orphans: Vec::new(),
            rows: GridRows::default(),
            formats: Vec::new(),
            items: Vec::new(),
            text_debug: false,
        })
    }

    /// A report with empty columns, the page's own rulings and its
    /// rendered image if one is attached.
    pub fn for_page(
        doc: Arc<Document>,
        page_idx: usize,
        template: Option<FormTemplate>,
    ) -> Result<Self> {
        let page = doc.page(page_idx)?;
        let params = ReportParams::from_config(&doc.config);
        let columns = ColumnDetector::new(page, &params).empty();
        let grid = Gridline::from_page(page, true);
        let image = page.image(PAGE_IMAGE_KEY).cloned();
        let mut report = Self::new(Arc::clone(&doc), page_idx, columns, grid, template, None)?;
        report.image = image;
        Ok(report)
    }

    pub fn with_params(mut self, params: ReportParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_scorer(mut self, scorer: Box<dyn ColumnScorer>) -> Self {
        self.scorer = scorer;
        self
    }

    pub fn with_checkpoint_sink(mut self, sink: Arc<dyn CheckpointSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    /// Log every grid row while parsing.
    pub fn set_text_debug(&mut self, on: bool) {
        self.text_debug = on;
    }

    pub fn page_index(&self) -> usize {
        self.page_idx
    }

    pub fn page(&self) -> &Page {
        &self.doc.pages[self.page_idx]
    }

    pub fn params(&self) -> &ReportParams {
        &self.params
    }

    pub fn template(&self) -> Option<&FormTemplate> {
        self.template.as_ref()
    }

    /// Without a template every step is allowed.
    pub fn is_allowed(&self, step: PipelineStep) -> bool {
        self.template.as_ref().is_none_or(|t| t.is_allowed(step))
    }

    fn gate(&self, step: PipelineStep) -> bool {
        let allowed = self.is_allowed(step);
        if !allowed {
            debug!(page = self.page_idx, step = %step, "step denied by template");
        }
        allowed
    }

    fn finish(&mut self, step: PipelineStep, outcome: StepOutcome) -> StepOutcome {
        debug!(page = self.page_idx, step = %step, ?outcome, "step finished");
        if outcome.is_completed() {
            if !self.completed.contains(&step) {
                self.completed.push(step);
            }
            if self.params.checkpoint_each_step {
                let key = format!("page-{}-{}", self.page_idx, step);
                self.save_checkpoint(&key, &[step.name().to_string()]);
            }
        }
        outcome
    }

    /// Text height of the page.
    fn h_param(&self) -> f64 {
        ColumnDetector::new(self.page(), &self.params).h_param()
    }

    // ----------------------------------------------------------------
    // find_columns

    /// Establish the initial column bands.
    ///
    /// Existing non-empty columns are kept. Otherwise the sources are tried
    /// in order: rulings of the bound gridline, rulings on the rendered
    /// image, the page's table region, word alignment. Deterministic for
    /// identical inputs.
    pub fn find_columns(&mut self) -> StepOutcome {
        let step = PipelineStep::FindColumns;
        if !self.gate(step) {
            return StepOutcome::Skipped;
        }
        if !self.columns.is_empty() {
            let count = self.columns.size();
            return self.finish(step, StepOutcome::Completed { count });
        }
        let outcome = match self.detect_columns() {
            Some(cols) => {
                if let Some(b) = cols.bbox() {
                    self.grid.set_target_segment(b);
                }
                debug!(
                    page = self.page_idx,
                    source = ?cols.source(),
                    columns = cols.size(),
                    "columns found"
                );
                let count = cols.size();
                self.columns = cols;
                StepOutcome::Completed { count }
            }
            None => StepOutcome::NoResult,
        };
        self.finish(step, outcome)
    }

    fn detect_columns(&mut self) -> Option<Columns> {
        let doc = Arc::clone(&self.doc);
        let page = &doc.pages[self.page_idx];
        let det = ColumnDetector::new(page, &self.params);

        let vlines = self.grid.rulings(Axis::Vertical, self.params.join_tolerance);
        if let Some(cols) = det.from_rulings(&vlines, ColumnSource::Gridline) {
            return Some(cols);
        }
        if let Some(img) = &self.image {
            let rulings = det.detect_rulings(img);
            if let Some(cols) = det.from_rulings(&rulings.vlines, ColumnSource::Image) {
                self.grid.set_vlines(rulings.vlines);
                if self.grid.hlines().is_empty() {
                    self.grid.set_hlines(rulings.hlines);
                }
                return Some(cols);
            }
        }
        if let Some(cols) = det.from_table() {
            return Some(cols);
        }
        det.from_text(IbForm::classify(page).get_ib_section())
    }

    // ----------------------------------------------------------------
    // handle_corner_case

    /// Repair degenerate band geometry; `count` is the number of moves
    /// added to the move log.
    pub fn handle_corner_case(&mut self) -> StepOutcome {
        let step = PipelineStep::HandleCornerCase;
        if !self.gate(step) {
            return StepOutcome::Skipped;
        }
        if self.columns.is_empty() {
            return self.finish(step, StepOutcome::NoResult);
        }
        let before = self.columns.move_log().len();
        let doc = Arc::clone(&self.doc);
        let page = &doc.pages[self.page_idx];
        let h = self.h_param();

        self.fix_collapsed(page, self.params.min_band_width_factor * h, h);
        self.fix_clipped(page);

        let count = self.columns.move_log().len() - before;
        self.finish(step, StepOutcome::Completed { count })
    }

    /// Re-split slivers left by two rulings collapsing into one boundary.
    fn fix_collapsed(&mut self, page: &Page, min_width: f64, min_gap: f64) {
        let size = self.columns.size();
        for i in 0..size {
            let Some(col) = self.columns.get(i) else {
                continue;
            };
            if !col.enabled() || col.bbox().width() >= min_width {
                continue;
            }
            let neighbours = [(i + 1 < size).then_some(i + 1), i.checked_sub(1)];
            let mut fixed = false;
            for n in neighbours.into_iter().flatten() {
                let Some(other) = self.columns.get(n).filter(|c| c.enabled()) else {
                    continue;
                };
                let Some(x) = widest_word_gap(page, other.bbox(), min_gap) else {
                    continue;
                };
                if n > i {
                    self.columns.move_edge(i, Edge::Right, x, CornerCase::Collapsed);
                    self.columns.move_edge(n, Edge::Left, x, CornerCase::Collapsed);
                } else {
                    self.columns.move_edge(n, Edge::Right, x, CornerCase::Collapsed);
                    self.columns.move_edge(i, Edge::Left, x, CornerCase::Collapsed);
                }
                debug!(page = self.page_idx, slot = i, neighbour = n, x, "collapsed band re-split");
                fixed = true;
                break;
            }
            if !fixed {
                debug!(page = self.page_idx, slot = i, "collapsed band disabled");
                self.columns.disable_logged(i, CornerCase::CollapsedDisabled);
            }
        }
    }

    /// Widen the outer slots over words they cut at the page side.
    fn fix_clipped(&mut self, page: &Page) {
        let (Some(cols_bbox), Some(first), Some(last)) = (
            self.columns.bbox(),
            self.columns.get(0).map(|c| c.bbox()),
            self.columns.iter().last().map(|c| c.bbox()),
        ) else {
            return;
        };
        let body: Vec<BBox> = page
            .words()
            .map(|w| w.bbox)
            .filter(|b| cols_bbox.contains_y(b.y_mid()))
            .collect();

        if first.xlt > page.bbox.xlt {
            let cut = body
                .iter()
                .filter(|b| b.xlt < first.xlt && first.xlt < b.xrb)
                .map(|b| b.xlt)
                .min_by(f64::total_cmp);
            if let Some(x) = cut {
                let to = x.max(page.bbox.xlt);
                if to < first.xlt {
                    self.columns.move_edge(0, Edge::Left, to, CornerCase::ClippedFirst);
                }
            }
        }
        if last.xrb < page.bbox.xrb {
            let cut = body
                .iter()
                .filter(|b| b.xlt < last.xrb && last.xrb < b.xrb)
                .map(|b| b.xrb)
                .max_by(f64::total_cmp);
            if let Some(x) = cut {
                let to = x.min(page.bbox.xrb);
                if to > last.xrb {
                    let slot = self.columns.size() - 1;
                    self.columns.move_edge(slot, Edge::Right, to, CornerCase::ClippedLast);
                }
            }
        }
    }

    // ----------------------------------------------------------------
    // extend_grid

    /// Stretch the table over horizontal rulings that continue its row
    /// pattern, and down or up the vertical rulings at slot boundaries.
    /// `count` is the number of extensions applied.
    pub fn extend_grid(&mut self) -> StepOutcome {
        let step = PipelineStep::ExtendGrid;
        if !self.gate(step) {
            return StepOutcome::Skipped;
        }
        let Some(bbox) = self.columns.bbox() else {
            return self.finish(step, StepOutcome::NoResult);
        };
        let h = self.h_param();
        let snap = self.params.snap_tolerance;

        let ys = cluster_means(
            self.grid
                .hlines()
                .iter()
                .filter(|l| l.x_overlap(&bbox) >= 0.5 * bbox.width())
                .map(|l| l.y_mid())
                .collect(),
            snap,
        );
        let inside: Vec<f64> = ys.iter().copied().filter(|y| bbox.contains_y(*y)).collect();
        let spacing = median_step(&inside).unwrap_or(2.0 * h);
        let max_gap = self.params.extend_gap_factor * spacing;

        let (mut top, mut bottom) = (bbox.ylt, bbox.yrb);
        let mut added = 0;
        for y in ys.iter().copied().filter(|y| *y > bbox.yrb) {
            if y - bottom > max_gap {
                break;
            }
            bottom = y;
            added += 1;
        }
        for y in ys.iter().rev().copied().filter(|y| *y < bbox.ylt) {
            if top - y > max_gap {
                break;
            }
            top = y;
            added += 1;
        }

        // vertical rulings at every matched boundary must agree on the reach
        let mut boundaries: Vec<f64> = self.columns.iter().map(|c| c.bbox().xlt).collect();
        boundaries.push(bbox.xrb);
        let mut reach: SmallVec<[(f64, f64); 8]> = SmallVec::new();
        for x in boundaries {
            let (lo, hi) = self
                .grid
                .vlines()
                .iter()
                .filter(|l| (l.x_mid() - x).abs() <= snap && l.y_overlap(&bbox) > 0.0)
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), l| {
                    (lo.min(l.ylt), hi.max(l.yrb))
                });
            if lo.is_finite() {
                reach.push((lo, hi));
            }
        }
        if reach.len() >= 2 {
            let down = reach.iter().map(|r| r.1).fold(f64::INFINITY, f64::min);
            let up = reach.iter().map(|r| r.0).fold(f64::NEG_INFINITY, f64::max);
            if down > bottom + snap {
                bottom = down;
                added += 1;
            }
            if up < top - snap {
                top = up;
                added += 1;
            }
        }

        if added > 0 {
            self.columns.set_vertical_extent(top, bottom);
            if let Some(b) = self.columns.bbox() {
                self.grid.set_target_segment(b);
            }
            debug!(page = self.page_idx, top, bottom, "grid extended");
        }
        self.finish(step, StepOutcome::Completed { count: added })
    }

    // ----------------------------------------------------------------
    // words_to_columns

    /// Assign every page word to the slot containing its horizontal
    /// midpoint; `count` is the number of assigned words.
    pub fn words_to_columns(&mut self) -> StepOutcome {
        let step = PipelineStep::WordsToColumns;
        if !self.gate(step) {
            return StepOutcome::Skipped;
        }
        if self.columns.is_empty() {
            return self.finish(step, StepOutcome::NoResult);
        }
        self.assign_words();
        let count = self.assigned.len();
        self.finish(step, StepOutcome::Completed { count })
    }

    fn assign_words(&mut self) {
        let doc = Arc::clone(&self.doc);
        let page = &doc.pages[self.page_idx];
        self.columns.clear_all();
        self.assigned.clear();
        self.orphans.clear();

        let mut rows = GridRows::for_page(page, &self.columns, &self.grid, &self.params);
        let header_band = self.columns.bbox().map(|b| {
            let h = page.statistics().h_line.max(1.0);
            (b.ylt - HEADER_BAND_LINES * h, b.ylt)
        });

        for word in page.words() {
            if word.text.trim().is_empty() {
                continue;
            }
            let Some(slot) = self.columns.slot_for_x(word.bbox.x_mid()) else {
                trace!(word = %word.text, bbox = %word.bbox, "word outside every column");
                self.orphans.push(word.clone());
                continue;
            };
            for piece in self.split_straddling(slot, word) {
                let y = piece.word.bbox.y_mid();
                if !rows.place(piece.slot, &piece.word)
                    && let Some((lo, hi)) = header_band
                    && y >= lo
                    && y < hi
                    && let Some(col) = self.columns.slot_mut(piece.slot)
                {
                    col.push_header(&piece.word.text);
                }
                self.assigned.push(piece);
            }
        }

        for row in rows.rows() {
            for (i, cell) in row.cells().iter().enumerate() {
                if let Some(col) = self.columns.slot_mut(i) {
                    col.push_value(cell.text());
                }
            }
        }
        if !self.orphans.is_empty() {
            debug!(page = self.page_idx, orphans = self.orphans.len(), "unassigned words");
        }
        self.rows = rows;
    }

    /// Split a word cut by a slot boundary by re-recognizing both halves.
    /// Without an OCR engine or an image the word stays whole.
    fn split_straddling(&self, slot: usize, word: &Word) -> SmallVec<[AssignedWord; 2]> {
        let whole = || -> SmallVec<[AssignedWord; 2]> {
            smallvec![AssignedWord {
                slot,
                word: word.clone(),
                split: false,
            }]
        };
        let (Some(ocr), Some(img), Some(col)) = (&self.ocr, &self.image, self.columns.get(slot))
        else {
            return whole();
        };
        let w = word.bbox.width();
        if w <= 0.0 {
            return whole();
        }
        let band = col.bbox();
        let size = self.columns.size();
        let boundaries = [
            (band.xlt, slot.checked_sub(1), true),
            (band.xrb, (slot + 1 < size).then_some(slot + 1), false),
        ];
        for (x, other, at_left) in boundaries {
            let Some(other) = other else {
                continue;
            };
            if !(word.bbox.xlt < x && x < word.bbox.xrb) {
                continue;
            }
            let share = (x - word.bbox.xlt) / w;
            let ratio = self.params.straddle_ratio;
            if share < ratio || 1.0 - share < ratio {
                continue;
            }
            if let Some((left, right)) = self.recognize_halves(&**ocr, img, word, x) {
                let (ls, rs) = if at_left { (other, slot) } else { (slot, other) };
                debug!(word = %word.text, left = %left.text, right = %right.text, "straddling word split");
                return smallvec![
                    AssignedWord {
                        slot: ls,
                        word: left,
                        split: true,
                    },
                    AssignedWord {
                        slot: rs,
                        word: right,
                        split: true,
                    },
                ];
            }
        }
        whole()
    }

    fn recognize_halves(
        &self,
        ocr: &dyn OcrEngine,
        img: &Raster,
        word: &Word,
        x: f64,
    ) -> Option<(Word, Word)> {
        let page_box = self.page().bbox;
        let sx = img.width() as f64 / page_box.width();
        let sy = img.height() as f64 / page_box.height();
        if !(sx.is_finite() && sy.is_finite() && sx > 0.0 && sy > 0.0) {
            return None;
        }
        let b = word.bbox;
        let halves = [
            BBox::new(b.xlt, b.ylt, x, b.yrb),
            BBox::new(x, b.ylt, b.xrb, b.yrb),
        ];
        let mut out: SmallVec<[Word; 2]> = SmallVec::new();
        for half in halves {
            let px = BBox::new(
                half.xlt - page_box.xlt,
                half.ylt - page_box.ylt,
                half.xrb - page_box.xlt,
                half.yrb - page_box.ylt,
            )
            .scaled(sx, sy);
            let rec = match ocr.recognize(&img.clip(px)) {
                Ok(rec) => rec,
                Err(e) => {
                    warn!(engine = ocr.name(), error = %e, "re-recognition failed");
                    return None;
                }
            };
            let text = rec.text.trim();
            if text.is_empty() {
                return None;
            }
            out.push(Word::new(half, text, rec.mean_conf()));
        }
        let right = out.pop()?;
        let left = out.pop()?;
        Some((left, right))
    }

    // ----------------------------------------------------------------
    // best_columns

    /// Assign a type to each slot; each known type goes to at most one
    /// slot. `count` is the number of slots with a known type.
    pub fn best_columns(&mut self) -> StepOutcome {
        let step = PipelineStep::BestColumns;
        if !self.gate(step) {
            return StepOutcome::Skipped;
        }
        if self.columns.is_empty() {
            return self.finish(step, StepOutcome::NoResult);
        }
        let size = self.columns.size();

        let fixed = self
            .template
            .as_ref()
            .and_then(FormTemplate::column_types)
            .filter(|types| types.len() == size)
            .map(<[ColumnType]>::to_vec);
        if let Some(types) = fixed {
            let mut seen = FxHashSet::default();
            for (i, tp) in types.into_iter().enumerate() {
                let tp = if tp.is_known() && seen.insert(tp) {
                    tp
                } else {
                    ColumnType::Unknown
                };
                if let Some(col) = self.columns.slot_mut(i) {
                    col.set_type(tp, if tp.is_known() { 1.0 } else { 0.0 });
                }
            }
            let count = self.columns.known();
            return self.finish(step, StepOutcome::Completed { count });
        }

        let mut candidates: Vec<(usize, ColumnType, f64)> = Vec::new();
        for i in 0..size {
            let Some(col) = self.columns.slot_mut(i) else {
                continue;
            };
            col.set_features(slot_features(col));
            col.set_type(ColumnType::Unknown, 0.0);
            if !col.enabled() {
                continue;
            }
            let rel_pos = if size > 1 {
                i as f64 / (size - 1) as f64
            } else {
                0.0
            };
            let scores = self.scorer.score(col.features(), rel_pos);
            candidates.extend(
                scores
                    .into_iter()
                    .filter(|(tp, s)| tp.is_known() && *s >= self.params.min_type_score)
                    .map(|(tp, s)| (i, tp, s)),
            );
        }
        candidates.sort_by(|a, b| {
            b.2.total_cmp(&a.2)
                .then(a.0.cmp(&b.0))
                .then(a.1.cmp(&b.1))
        });

        let mut used_slots = FxHashSet::default();
        let mut used_types = FxHashSet::default();
        for (slot, tp, score) in candidates {
            if used_slots.contains(&slot) || used_types.contains(&tp) {
                continue;
            }
            if let Some(col) = self.columns.slot_mut(slot) {
                col.set_type(tp, score);
            }
            used_slots.insert(slot);
            used_types.insert(tp);
        }
        debug!(
            page = self.page_idx,
            scorer = self.scorer.name(),
            types = ?self.columns.types(),
            "column types assigned"
        );
        let count = self.columns.known();
        self.finish(step, StepOutcome::Completed { count })
    }

    // ----------------------------------------------------------------
    // parse

    /// Parse the grid rows into line items; `count` is the number of items.
    pub fn parse(&mut self) -> StepOutcome {
        let step = PipelineStep::Parse;
        if !self.gate(step) {
            return StepOutcome::Skipped;
        }
        if self.columns.known() == 0 {
            self.items.clear();
            return self.finish(step, StepOutcome::NoResult);
        }
        if self.rows.is_empty() && self.assigned.is_empty() {
            self.assign_words();
        }
        let h = self.h_param();
        let max_gap = self.params.continuation_gap_factor * h;
        let slots: Vec<(usize, ColumnType)> = self
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.enabled() && c.tp().is_known())
            .map(|(i, c)| (i, c.tp()))
            .collect();

        let mut items: Vec<LineItem> = Vec::new();
        let mut confs: Vec<(f64, usize)> = Vec::new();
        for (ri, row) in self.rows.rows_mut().iter_mut().enumerate() {
            if row.non_empty() == 0 {
                continue;
            }
            if self.text_debug {
                debug!(page = self.page_idx, row = ri, text = %row.text(true), "grid row");
            }
            let fields: Vec<Field> = slots
                .iter()
                .filter_map(|&(i, tp)| {
                    let text = row.cell(i)?.text();
                    (!text.is_empty()).then(|| Field::new(tp, i, text))
                })
                .collect();
            if fields.is_empty() {
                row.mark_ignored();
                continue;
            }
            let words: Vec<&Word> = slots
                .iter()
                .filter_map(|&(i, _)| row.cell(i))
                .flat_map(|c| c.words())
                .collect();
            let Some(extent) = bbox_union(words.iter().map(|w| &w.bbox)) else {
                row.mark_ignored();
                continue;
            };
            let conf_sum: f64 = words.iter().map(|w| w.conf).sum();

            if fields.iter().any(Field::is_anchor) {
                items.push(LineItem {
                    bbox: extent,
                    fields,
                    rows: vec![ri],
                    conf: 0.0,
                });
                confs.push((conf_sum, words.len()));
                continue;
            }
            let text_only = fields.iter().all(|f| f.column == ColumnType::Description);
            match (items.last_mut(), confs.last_mut()) {
                (Some(prev), Some(acc)) if text_only && extent.ylt - prev.bbox.yrb <= max_gap => {
                    for f in &fields {
                        prev.append_text(f.column, f.slot, &f.raw);
                    }
                    prev.bbox = prev.bbox.union(&extent);
                    prev.rows.push(ri);
                    acc.0 += conf_sum;
                    acc.1 += words.len();
                    row.mark_wrapped();
                }
                _ => {
                    trace!(page = self.page_idx, row = ri, "row without anchor ignored");
                    row.mark_ignored();
                }
            }
        }
        for (item, (sum, n)) in items.iter_mut().zip(confs) {
            item.conf = if n > 0 { sum / n as f64 } else { 0.0 };
        }

        self.formats = self.resolve_formats(&items);
        let year = self.params.default_year.or_else(|| common_year(&items));
        for &(slot, tp) in &slots {
            let format = self.formats.get(slot).copied().unwrap_or_default();
            apply_format(&mut items, tp, format, year);
        }

        let count = items.len();
        self.items = items;
        self.finish(step, StepOutcome::Completed { count })
    }

    /// Jump straight to `parse` once column types are known.
    ///
    /// `None` when no column is known. Partially known columns are parsed
    /// too; unknown slots contribute nothing.
    pub fn pre_parse(&mut self) -> Option<StepOutcome> {
        if self.columns.known() == 0 {
            return None;
        }
        if !self.columns.fully_known() {
            debug!(
                page = self.page_idx,
                known = self.columns.known(),
                columns = self.columns.size(),
                "parsing with partially known columns"
            );
        }
        Some(self.parse())
    }

    /// Run a single step.
    pub fn run_step(&mut self, step: PipelineStep) -> StepOutcome {
        match step {
            PipelineStep::FindColumns => self.find_columns(),
            PipelineStep::HandleCornerCase => self.handle_corner_case(),
            PipelineStep::ExtendGrid => self.extend_grid(),
            PipelineStep::WordsToColumns => self.words_to_columns(),
            PipelineStep::BestColumns => self.best_columns(),
            PipelineStep::Parse => self.parse(),
        }
    }

    /// Run every step in pipeline order.
    pub fn run(&mut self) -> Vec<(PipelineStep, StepOutcome)> {
        PipelineStep::ALL
            .into_iter()
            .map(|step| (step, self.run_step(step)))
            .collect()
    }

    /// Run the steps that follow the last completed one.
    pub fn resume(&mut self) -> Vec<(PipelineStep, StepOutcome)> {
        let start = PipelineStep::ALL
            .iter()
            .rposition(|s| self.completed.contains(s))
            .map_or(0, |i| i + 1);
        PipelineStep::ALL[start..]
            .iter()
            .map(|&step| (step, self.run_step(step)))
            .collect()
    }

    /// Per-slot formats: detected sparsity, overridden by the template.
    fn resolve_formats(&self, items: &[LineItem]) -> Vec<ColumnFormat> {
        let declared = self
            .template
            .as_ref()
            .map(FormTemplate::subtypes)
            .unwrap_or_default();
        self.columns
            .iter()
            .map(|col| {
                let tp = col.tp();
                let mut detected = ColumnFormat::default();
                if matches!(tp, ColumnType::Dos | ColumnType::RevCode) {
                    let present: Vec<bool> = items.iter().map(|it| it.get(tp).is_some()).collect();
                    detected.fill = detect_fill(&present);
                }
                if tp == ColumnType::Dos {
                    let dates: Vec<&str> = items
                        .iter()
                        .filter_map(|it| match &it.get(tp)?.value {
                            FieldValue::Date(d) => Some(d.as_str()),
                            _ => None,
                        })
                        .collect();
                    if !dates.is_empty() && dates.iter().all(|d| date_year(d).is_none()) {
                        detected.missing = Some(Missing::Year);
                    }
                }
                detected.merged(declared.get(tp))
            })
            .collect()
    }

    // ----------------------------------------------------------------
    // checkpoints

    /// Snapshot of the current state.
    pub fn checkpoint(&self) -> ReportCheckpoint {
        ReportCheckpoint {
            page: self.page_idx,
            completed: self.completed.clone(),
            min_cols: self.columns.min_cols(),
            slots: self
                .columns
                .iter()
                .map(|c| SlotState {
                    bbox: c.bbox(),
                    tp: c.tp(),
                    confidence: c.confidence(),
                    enabled: c.enabled(),
                    values: c.values().to_vec(),
                    header: c.header_words().to_vec(),
                })
                .collect(),
            moves: self.columns.move_log().to_vec(),
            target: self.grid.target(),
            hlines: self.grid.hlines().to_vec(),
            vlines: self.grid.vlines().to_vec(),
            cell_labels: self.grid.cell_labels().map(|labels| {
                labels
                    .iter()
                    .map(|(&(r, c), label)| (r, c, label.clone()))
                    .collect()
            }),
            assigned: self.assigned.clone(),
            orphans: self.orphans.clone(),
            items: self.items.clone(),
        }
    }

    /// Save a checkpoint; failures are logged and never interrupt the
    /// pipeline.
    pub fn save_checkpoint(&self, key: &str, tags: &[String]) {
        match self.sink.save(key, tags, &self.checkpoint()) {
            Ok(()) => debug!(page = self.page_idx, key, "checkpoint saved"),
            Err(e) => warn!(page = self.page_idx, key, error = %e, "checkpoint not saved"),
        }
    }

    /// Restore state saved by [`Report::checkpoint`]; the remaining steps
    /// can then be run with [`Report::resume`].
    pub fn restore(&mut self, state: &ReportCheckpoint) -> Result<()> {
        if state.page != self.page_idx {
            return Err(IbError::InvalidInput(format!(
                "checkpoint of page {} restored into page {}",
                state.page, self.page_idx
            )));
        }
        self.columns = Columns::restore(
            state.min_cols,
            state
                .slots
                .iter()
                .map(|s| (s.bbox, s.tp, s.confidence, s.enabled)),
            state.moves.clone(),
        )
        .with_lines(self.page().lines());
        let typed = state.completed.contains(&PipelineStep::BestColumns);
        for (col, saved) in self.columns.slots_mut().zip(&state.slots) {
            col.set_contents(saved.values.clone(), saved.header.clone());
            if typed {
                col.set_features(slot_features(col));
            }
        }
        self.grid.set_target_segment(state.target);
        self.grid.set_hlines(state.hlines.clone());
        self.grid.set_vlines(state.vlines.clone());
        self.grid.set_cell_labels(state.cell_labels.as_ref().map(|labels| {
            labels
                .iter()
                .map(|(r, c, label)| ((*r, *c), label.clone()))
                .collect()
        }));
        self.completed = state.completed.clone();
        self.items = state.items.clone();
        self.assigned = state.assigned.clone();
        self.orphans = state.orphans.clone();
        self.rows = self.rebuild_rows();
        self.formats.clear();
        Ok(())
    }

    /// Grid rows holding the assigned words, marked the way `parse` left
    /// them when it already ran.
    fn rebuild_rows(&self) -> GridRows {
        if self.assigned.is_empty() {
            return GridRows::default();
        }
        let mut rows = GridRows::for_page(self.page(), &self.columns, &self.grid, &self.params);
        for a in &self.assigned {
            rows.place(a.slot, &a.word);
        }
        if self.completed.contains(&PipelineStep::Parse) {
            let anchors: FxHashSet<usize> =
                self.items.iter().filter_map(|it| it.rows.first().copied()).collect();
            let wrapped: FxHashSet<usize> = self
                .items
                .iter()
                .flat_map(|it| it.rows.iter().skip(1).copied())
                .collect();
            for (ri, row) in rows.rows_mut().iter_mut().enumerate() {
                if row.non_empty() == 0 || anchors.contains(&ri) {
                    continue;
                }
                if wrapped.contains(&ri) {
                    row.mark_wrapped();
                } else {
                    row.mark_ignored();
                }
            }
        }
        rows
    }

    // ----------------------------------------------------------------
    // accessors

    pub fn columns(&self) -> &Columns {
        &self.columns
    }

    pub fn gridline(&self) -> &Gridline {
        &self.grid
    }

    pub fn rows(&self) -> &GridRows {
        &self.rows
    }

    pub fn types(&self) -> Vec<ColumnType> {
        self.columns.types()
    }

    pub fn bboxes(&self) -> Vec<BBox> {
        self.columns.bboxes()
    }

    /// Per-slot value formats. Before `parse` these come from the
    /// template alone.
    pub fn formats(&self) -> Vec<ColumnFormat> {
        if self.formats.len() == self.columns.size() {
            return self.formats.clone();
        }
        let declared = self
            .template
            .as_ref()
            .map(FormTemplate::subtypes)
            .unwrap_or_default();
        self.columns.iter().map(|c| declared.get(c.tp())).collect()
    }

    /// Number of parsed items.
    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn assigned(&self) -> &[AssignedWord] {
        &self.assigned
    }

    pub fn orphans(&self) -> &[Word] {
        &self.orphans
    }

    pub fn completed(&self) -> &[PipelineStep] {
        &self.completed
    }

    pub fn move_log(&self) -> &[ColumnMove] {
        self.columns.move_log()
    }
}

/// Features of a slot's accumulated values and header.
fn slot_features(col: &Column) -> ColFeats {
    column_features(col.values(), &header_hint(col.header_text(), col.values()))
}

/// Text searched for header keywords: the header words, or the first value
/// when it carries no digits (a header row inside the rulings).
fn header_hint(header: String, values: &[String]) -> String {
    if !header.is_empty() {
        return header;
    }
    values
        .iter()
        .map(|v| v.trim())
        .find(|v| !v.is_empty())
        .filter(|v| !v.chars().any(|c| c.is_ascii_digit()))
        .unwrap_or_default()
        .to_string()
}

/// Widest vertical gap between the words inside `band`, at least `min_gap`
/// wide. Returns its midpoint.
fn widest_word_gap(page: &Page, band: BBox, min_gap: f64) -> Option<f64> {
    let mut spans: Vec<(f64, f64)> = page
        .words()
        .map(|w| w.bbox)
        .filter(|b| band.contains_x(b.x_mid()) && band.contains_y(b.y_mid()))
        .map(|b| (b.xlt, b.xrb))
        .collect();
    spans.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mut merged: Vec<(f64, f64)> = Vec::new();
    for (lo, hi) in spans {
        match merged.last_mut() {
            Some(last) if lo <= last.1 => last.1 = last.1.max(hi),
            _ => merged.push((lo, hi)),
        }
    }
    merged
        .windows(2)
        .map(|w| (w[1].0 - w[0].1, (w[0].1 + w[1].0) / 2.0))
        .filter(|(gap, _)| *gap >= min_gap)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, mid)| mid)
}

/// Median distance between consecutive sorted positions.
fn median_step(ys: &[f64]) -> Option<f64> {
    let mut steps: Vec<f64> = ys.windows(2).map(|w| w[1] - w[0]).collect();
    if steps.is_empty() {
        return None;
    }
    steps.sort_by(f64::total_cmp);
    Some(steps[steps.len() / 2])
}

/// Most common explicit year among the items' dates of service.
fn common_year(items: &[LineItem]) -> Option<i32> {
    let mut counts: FxHashMap<i32, usize> = FxHashMap::default();
    for item in items {
        if let Some(Field {
            value: FieldValue::Date(d),
            ..
        }) = item.get(ColumnType::Dos)
            && let Some(y) = date_year(d)
        {
            *counts.entry(y).or_default() += 1;
        }
    }
    counts
        .into_iter()
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(y, _)| y)
}

/// Apply a column's fill and missing-part rules to the items.
fn apply_format(items: &mut [LineItem], tp: ColumnType, format: ColumnFormat, year: Option<i32>) {
    match format.fill {
        Some(Fill::Down) => fill_from(items.iter_mut(), tp),
        Some(Fill::Up) => fill_from(items.iter_mut().rev(), tp),
        None => {}
    }
    if format.missing == Some(Missing::Year) && tp == ColumnType::Dos {
        let Some(year) = year else {
            return;
        };
        for item in items.iter_mut() {
            if let Some(f) = item.get_mut(tp)
                && let FieldValue::Date(d) = &f.value
                && date_year(d).is_none()
                && let Some(full) = parse_date(&f.raw, Some(year))
            {
                f.value = FieldValue::Date(full);
            }
        }
    }
}

fn fill_from<'a>(items: impl Iterator<Item = &'a mut LineItem>, tp: ColumnType) {
    let mut carry: Option<Field> = None;
    for item in items {
        match item.get(tp) {
            Some(f) => carry = Some(f.clone()),
            None => {
                if let Some(c) = &carry {
                    item.fields.push(Field {
                        filled: true,
                        ..c.clone()
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocConfig, Line};
    use crate::forms::checkpoint::MemoryCheckpointStore;

    /// Four ruled columns (dos, description, units, charge) and five rows.
    fn ruled_doc(config: DocConfig) -> Document {
        let edges = [50.0, 150.0, 400.0, 470.0, 560.0];
        let rows = [
            ["01/02/2021", "PHARMACY", "1", "$10.00"],
            ["01/02/2021", "LABORATORY", "2", "$22.50"],
            ["01/03/2021", "RADIOLOGY", "1", "$310.00"],
            ["01/04/2021", "EMERGENCY", "1", "$1,204.50"],
            ["01/04/2021", "SUPPLIES", "3", "$8.25"],
        ];
        let lines = rows
            .iter()
            .enumerate()
            .map(|(r, texts)| {
                let y = 110.0 + 20.0 * r as f64;
                Line::new(
                    texts
                        .iter()
                        .enumerate()
                        .map(|(c, t)| {
                            let x = edges[c] + 5.0;
                            Word::new(BBox::new(x, y, x + 60.0, y + 10.0), *t, 90.0)
                        })
                        .collect(),
                )
            })
            .collect();
        let mut page = Page::new(BBox::new(0.0, 0.0, 612.0, 792.0), lines);
        page.set_ia_bboxes(
            crate::document::IA_RULING_VERTICAL,
            edges
                .iter()
                .map(|x| BBox::new(*x, 100.0, *x + 1.0, 210.0))
                .collect(),
        );
        let mut doc = Document::new(config);
        doc.push_page(page);
        doc
    }

    fn report(config: DocConfig, template: Option<FormTemplate>) -> Report {
        Report::for_page(Arc::new(ruled_doc(config)), 0, template).unwrap()
    }

    #[test]
    fn full_pipeline_on_ruled_page() {
        let mut r = report(DocConfig::new(), None);
        let outcomes = r.run();
        assert_eq!(outcomes[0].1, StepOutcome::Completed { count: 4 });
        assert_eq!(r.orphans().len(), 0);
        assert_eq!(r.assigned().len(), 20);
        assert_eq!(
            r.types(),
            vec![
                ColumnType::Dos,
                ColumnType::Description,
                ColumnType::Units,
                ColumnType::Charge
            ]
        );
        assert_eq!(r.size(), 5);
        assert!(r.items().iter().all(LineItem::valid));
        assert_eq!(
            r.items()[3].str(),
            "dos=01/04/2021 | description=EMERGENCY | units=1 | charge=$1,204.50"
        );
        assert_eq!(r.completed().len(), PipelineStep::ALL.len());
    }

    #[test]
    fn denied_step_is_a_noop() {
        let tpl = FormTemplate::permissive("t").deny(PipelineStep::HandleCornerCase);
        let mut r = report(DocConfig::new(), Some(tpl));
        r.find_columns();
        let log = r.move_log().to_vec();
        assert_eq!(r.handle_corner_case(), StepOutcome::Skipped);
        assert_eq!(r.move_log(), &log[..]);
        assert!(r.words_to_columns().is_completed());
    }

    #[test]
    fn unknown_columns_parse_nothing() {
        let mut r = report(DocConfig::new(), None);
        r.find_columns();
        r.words_to_columns();
        assert_eq!(r.pre_parse(), None);
        assert_eq!(r.parse(), StepOutcome::NoResult);
        assert_eq!(r.size(), 0);
    }

    #[test]
    fn template_column_types_win() {
        let tpl = FormTemplate::permissive("t").with_column_types(vec![
            ColumnType::Dos,
            ColumnType::Description,
            ColumnType::UnitCost,
            ColumnType::Charge,
        ]);
        let mut r = report(DocConfig::new(), Some(tpl));
        r.find_columns();
        r.words_to_columns();
        assert_eq!(r.best_columns(), StepOutcome::Completed { count: 4 });
        assert_eq!(r.types()[2], ColumnType::UnitCost);
    }

    #[test]
    fn checkpoints_each_step_and_restore() {
        let mut config = DocConfig::new();
        config.insert("ib.checkpoint_each_step".into(), "true".into());
        let store = Arc::new(MemoryCheckpointStore::new());
        let mut r = report(config.clone(), None).with_checkpoint_sink(store.clone());
        r.run();
        assert_eq!(store.len(), PipelineStep::ALL.len());
        let saved = store.load("page-0-parse").unwrap();
        assert_eq!(saved.tags, vec!["parse".to_string()]);

        let mut fresh = report(config, None);
        fresh.restore(&saved.state).unwrap();
        assert_eq!(fresh.types(), r.types());
        assert_eq!(fresh.items(), r.items());
        assert_eq!(fresh.columns().source(), Some(ColumnSource::Checkpoint));

        let wrong = ReportCheckpoint {
            page: 3,
            ..ReportCheckpoint::default()
        };
        assert!(matches!(fresh.restore(&wrong), Err(IbError::InvalidInput(_))));
    }

    #[test]
    fn sparse_dates_fill_down() {
        let mut items: Vec<LineItem> = ["01/02/2021", "", "", "01/05/2021", ""]
            .iter()
            .map(|d| {
                let mut fields = vec![Field::new(ColumnType::Charge, 1, "$1.00")];
                if !d.is_empty() {
                    fields.push(Field::new(ColumnType::Dos, 0, *d));
                }
                LineItem {
                    fields,
                    ..LineItem::default()
                }
            })
            .collect();
        let present: Vec<bool> = items.iter().map(|i| i.get(ColumnType::Dos).is_some()).collect();
        let format = ColumnFormat {
            fill: detect_fill(&present),
            missing: None,
        };
        apply_format(&mut items, ColumnType::Dos, format, None);
        let dates: Vec<&str> = items
            .iter()
            .map(|i| i.text(ColumnType::Dos).unwrap_or(""))
            .collect();
        assert_eq!(
            dates,
            vec!["01/02/2021", "01/02/2021", "01/02/2021", "01/05/2021", "01/05/2021"]
        );
        assert!(items[1].get(ColumnType::Dos).unwrap().filled);
    }

    #[test]
    fn missing_year_is_completed() {
        let mut items = vec![LineItem {
            fields: vec![Field::new(ColumnType::Dos, 0, "09/18")],
            ..LineItem::default()
        }];
        let format = ColumnFormat {
            fill: None,
            missing: Some(Missing::Year),
        };
        apply_format(&mut items, ColumnType::Dos, format, Some(2020));
        assert_eq!(
            items[0].get(ColumnType::Dos).unwrap().value,
            FieldValue::Date("09/18/2020".into())
        );
    }

    #[test]
    fn gaps_and_steps() {
        assert_eq!(median_step(&[0.0, 10.0, 20.0, 35.0]), Some(10.0));
        assert_eq!(median_step(&[1.0]), None);
        assert_eq!(header_hint(String::new(), &["".into(), "Charges".into()]), "Charges");
        assert_eq!(header_hint(String::new(), &["$1.00".into()]), "");
    }
}
