//! Column slots of a billing table.
//!
//! A [`Columns`] instance is a fixed-length sequence of slots. Detection
//! creates it with its final length; afterwards slot boundaries may move,
//! slots may be typed, cleared or disabled, but never added or removed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::document::Line;
use crate::geometry::{BBox, bbox_union};

/// Semantic type of a billing column.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub enum ColumnType {
    #[default]
    Unknown,
    /// Date of service.
    Dos,
    /// Revenue code.
    RevCode,
    /// CPT/HCPCS service code.
    ServiceCode,
    Description,
    Units,
    UnitCost,
    Charge,
}

impl ColumnType {
    /// All known types, in form order.
    pub const KNOWN: [ColumnType; 7] = [
        ColumnType::Dos,
        ColumnType::RevCode,
        ColumnType::ServiceCode,
        ColumnType::Description,
        ColumnType::Units,
        ColumnType::UnitCost,
        ColumnType::Charge,
    ];

    pub fn is_known(self) -> bool {
        self != ColumnType::Unknown
    }

    /// Values of these columns are parsed as numbers.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            ColumnType::Units | ColumnType::UnitCost | ColumnType::Charge
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ColumnType::Unknown => "unknown",
            ColumnType::Dos => "dos",
            ColumnType::RevCode => "revCode",
            ColumnType::ServiceCode => "serviceCode",
            ColumnType::Description => "description",
            ColumnType::Units => "units",
            ColumnType::UnitCost => "unitCost",
            ColumnType::Charge => "charge",
        }
    }

    pub fn from_name(s: &str) -> Option<Self> {
        std::iter::once(ColumnType::Unknown)
            .chain(Self::KNOWN)
            .find(|t| t.name() == s)
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names of the entries of [`ColFeats::values`].
pub const FEATURE_HEADER: [&str; 8] = [
    "date",
    "rev_code",
    "service_code",
    "money",
    "integer",
    "alpha",
    "mean_len",
    "fill",
];

/// Feature vector of one column.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ColFeats {
    /// Ratios in `0..=1`, indexed like [`FEATURE_HEADER`].
    pub values: Vec<f64>,
    /// Type suggested by the column's header text.
    pub header_hint: Option<ColumnType>,
}

impl ColFeats {
    pub fn header(&self) -> &'static [&'static str] {
        &FEATURE_HEADER
    }

    pub fn get(&self, name: &str) -> f64 {
        FEATURE_HEADER
            .iter()
            .position(|h| *h == name)
            .and_then(|i| self.values.get(i))
            .copied()
            .unwrap_or(0.0)
    }
}

/// One column slot.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    bbox: BBox,
    tp: ColumnType,
    confidence: f64,
    values: Vec<String>,
    header: Vec<String>,
    features: ColFeats,
    enabled: bool,
}

impl Column {
    fn new(bbox: BBox) -> Self {
        Self {
            bbox,
            tp: ColumnType::Unknown,
            confidence: 0.0,
            values: Vec::new(),
            header: Vec::new(),
            features: ColFeats::default(),
            enabled: true,
        }
    }

    pub fn bbox(&self) -> BBox {
        self.bbox
    }

    pub fn tp(&self) -> ColumnType {
        self.tp
    }

    /// Classifier score behind the current type.
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Accumulated per-row cell texts (one entry per table row).
    pub fn values(&self) -> &[String] {
        &self.values
    }

    /// Header words seen above the table body.
    pub fn header_text(&self) -> String {
        self.header.join(" ")
    }

    pub fn features(&self) -> &ColFeats {
        &self.features
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Drop accumulated values, header and features.
    pub fn clear(&mut self) {
        self.values.clear();
        self.header.clear();
        self.features = ColFeats::default();
    }

    /// Header words, one entry per word.
    pub fn header_words(&self) -> &[String] {
        &self.header
    }

    pub(crate) fn set_contents(&mut self, values: Vec<String>, header: Vec<String>) {
        self.values = values;
        self.header = header;
    }

    pub(crate) fn push_value(&mut self, value: String) {
        self.values.push(value);
    }

    pub(crate) fn push_header(&mut self, text: &str) {
        self.header.push(text.to_string());
    }

    pub(crate) fn set_features(&mut self, features: ColFeats) {
        self.features = features;
    }

    pub(crate) fn set_type(&mut self, tp: ColumnType, confidence: f64) {
        self.tp = tp;
        self.confidence = confidence;
    }
}

/// Where the slot geometry came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColumnSource {
    /// Vertical rulings found on the rendered image.
    Image,
    /// Vertical rulings of the bound gridline.
    Gridline,
    /// A generic table region and its sub-cells.
    TableRegion,
    /// Word alignment statistics.
    Text,
    /// A restored checkpoint.
    Checkpoint,
}

/// Slot edge touched by a correction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Edge {
    Left,
    Right,
}

/// Degenerate geometry a correction was applied for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CornerCase {
    /// Two rulings collapsed into a sliver; the boundary was re-split.
    Collapsed,
    /// Collapsed sliver that could not be re-split and was disabled.
    CollapsedDisabled,
    /// The first band was clipped at the page edge.
    ClippedFirst,
    /// The last band was clipped at the page edge.
    ClippedLast,
}

/// One entry of the move log.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnMove {
    pub slot: usize,
    pub edge: Edge,
    pub from: f64,
    pub to: f64,
    pub reason: CornerCase,
}

/// Fixed-length ordered sequence of column slots.
#[derive(Clone, Debug, PartialEq)]
pub struct Columns {
    min_cols: usize,
    /// Text lines of the page; bounds the rows a slot accumulates.
    lines: usize,
    slots: Vec<Column>,
    source: Option<ColumnSource>,
    moves: Vec<ColumnMove>,
}

impl Columns {
    /// An empty instance for a page with `lines`, to be replaced by
    /// detection.
    pub fn new(min_cols: usize, lines: &[Line]) -> Self {
        Self {
            min_cols,
            lines: 0,
            slots: Vec::new(),
            source: None,
            moves: Vec::new(),
        }
        .with_lines(lines)
    }

    pub(crate) fn with_lines(mut self, lines: &[Line]) -> Self {
        self.lines = lines.iter().filter(|l| !l.is_empty()).count();
        self
    }

    /// Slots from left-to-right bands.
    pub fn from_bands(min_cols: usize, mut bands: Vec<BBox>, source: ColumnSource) -> Self {
        bands.sort_by(|a, b| a.xlt.total_cmp(&b.xlt));
        Self {
            min_cols,
            lines: 0,
            slots: bands.into_iter().map(Column::new).collect(),
            source: Some(source),
            moves: Vec::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn min_cols(&self) -> usize {
        self.min_cols
    }

    /// Non-empty text lines of the page the columns belong to.
    pub fn line_count(&self) -> usize {
        self.lines
    }

    pub fn source(&self) -> Option<ColumnSource> {
        self.source
    }

    /// Number of slots with a known type.
    pub fn known(&self) -> usize {
        self.slots.iter().filter(|c| c.tp.is_known()).count()
    }

    pub fn unknown(&self) -> usize {
        self.size() - self.known()
    }

    /// Every enabled slot carries a known type.
    pub fn fully_known(&self) -> bool {
        !self.is_empty()
            && self
                .slots
                .iter()
                .filter(|c| c.enabled)
                .all(|c| c.tp.is_known())
    }

    pub fn get(&self, i: usize) -> Option<&Column> {
        self.slots.get(i)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Column> {
        self.slots.iter()
    }

    pub(crate) fn slot_mut(&mut self, i: usize) -> Option<&mut Column> {
        self.slots.get_mut(i)
    }

    pub(crate) fn slots_mut(&mut self) -> impl Iterator<Item = &mut Column> {
        self.slots.iter_mut()
    }

    pub fn types(&self) -> Vec<ColumnType> {
        self.slots.iter().map(|c| c.tp).collect()
    }

    pub fn bboxes(&self) -> Vec<BBox> {
        self.slots.iter().map(|c| c.bbox).collect()
    }

    /// Covering box of all slots.
    pub fn bbox(&self) -> Option<BBox> {
        bbox_union(self.slots.iter().map(|c| &c.bbox))
    }

    /// Clear the accumulated values of slot `i`.
    pub fn clear(&mut self, i: usize) {
        if let Some(c) = self.slots.get_mut(i) {
            c.clear();
        }
    }

    pub(crate) fn clear_all(&mut self) {
        for c in &mut self.slots {
            c.clear();
            c.values.reserve(self.lines);
        }
    }

    /// Disable slot `i`; its words stay assigned but are not parsed.
    pub fn disable(&mut self, i: usize) {
        if let Some(c) = self.slots.get_mut(i) {
            c.enabled = false;
        }
    }

    pub fn move_log(&self) -> &[ColumnMove] {
        &self.moves
    }

    /// Slot whose horizontal span strictly contains `x`.
    pub fn slot_for_x(&self, x: f64) -> Option<usize> {
        self.slots.iter().position(|c| c.bbox.contains_x(x))
    }

    /// Move one edge of a slot and record it.
    pub(crate) fn move_edge(&mut self, slot: usize, edge: Edge, to: f64, reason: CornerCase) {
        let Some(c) = self.slots.get_mut(slot) else {
            return;
        };
        let from = match edge {
            Edge::Left => std::mem::replace(&mut c.bbox.xlt, to),
            Edge::Right => std::mem::replace(&mut c.bbox.xrb, to),
        };
        self.moves.push(ColumnMove {
            slot,
            edge,
            from,
            to,
            reason,
        });
    }

    /// Disable a slot as a logged correction.
    pub(crate) fn disable_logged(&mut self, slot: usize, reason: CornerCase) {
        let Some(c) = self.slots.get(slot) else {
            return;
        };
        let x = c.bbox.xrb;
        self.disable(slot);
        self.moves.push(ColumnMove {
            slot,
            edge: Edge::Right,
            from: x,
            to: x,
            reason,
        });
    }

    /// Stretch every slot to a new vertical extent.
    pub(crate) fn set_vertical_extent(&mut self, ylt: f64, yrb: f64) {
        for c in &mut self.slots {
            c.bbox.ylt = ylt;
            c.bbox.yrb = yrb;
        }
    }

    /// Restore slots and move log from saved state.
    pub(crate) fn restore(
        min_cols: usize,
        slots: impl IntoIterator<Item = (BBox, ColumnType, f64, bool)>,
        moves: Vec<ColumnMove>,
    ) -> Self {
        let slots = slots
            .into_iter()
            .map(|(bbox, tp, confidence, enabled)| Column {
                tp,
                confidence,
                enabled,
                ..Column::new(bbox)
            })
            .collect();
        Self {
            min_cols,
            lines: 0,
            slots,
            source: Some(ColumnSource::Checkpoint),
            moves,
        }
    }

    /// Row-major view of the accumulated values.
    pub fn all_rows(&self) -> Vec<Vec<String>> {
        let n = self.slots.iter().map(|c| c.values.len()).max().unwrap_or(0);
        (0..n)
            .map(|r| {
                self.slots
                    .iter()
                    .map(|c| c.values.get(r).cloned().unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    /// Accumulated values rendered as `|`-separated rows.
    pub fn text(&self) -> String {
        self.all_rows()
            .iter()
            .map(|row| row.join(" | "))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
