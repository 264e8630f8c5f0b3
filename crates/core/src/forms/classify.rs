//! Billing form and column classification.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::Page;
use crate::geometry::{BBox, bbox_union};
use crate::layout::columns::{ColFeats, ColumnType, FEATURE_HEADER};
use crate::layout::segments::PageSegments;

pub(crate) static DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})[/.-](\d{1,2})(?:[/.-](\d{2}|\d{4}))?$").unwrap()
});

static REV_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^0\d{3}$").unwrap());

static SERVICE_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d{5}|[A-Z]\d{4}|\d{4}[A-Z])(?:-?[A-Z0-9]{2})?$").unwrap()
});

pub(crate) static MONEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\(?-?\$?\d{1,3}(?:,?\d{3})*\.\d{2}\)?(?:-|CR)?$").unwrap()
});

static INTEGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,4}(?:\.0{1,2})?$").unwrap());

static ALPHA_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]{3,}").unwrap());

/// Header keywords, most specific first.
static HEADER_HINTS: Lazy<Vec<(Regex, ColumnType)>> = Lazy::new(|| {
    [
        (r"(?i)\bunit\s*(cost|price)\b|\brate\b|\bprice\b", ColumnType::UnitCost),
        (r"(?i)\brev(enue)?\.?\s*(code|cd)?\b", ColumnType::RevCode),
        (r"(?i)\b(cpt|hcpcs|proc(edure)?)\b|\bcode\b", ColumnType::ServiceCode),
        (r"(?i)\bdate\b|\bdos\b", ColumnType::Dos),
        (r"(?i)\bdesc(ription)?\b", ColumnType::Description),
        (r"(?i)\bunits?\b|\bqty\b|\bquantity\b", ColumnType::Units),
        (r"(?i)\bcharges?\b|\bamount\b|\btotal\b", ColumnType::Charge),
    ]
    .into_iter()
    .map(|(re, tp)| (Regex::new(re).unwrap(), tp))
    .collect()
});

/// Lines needed for a page to count as an itemized bill.
pub const MIN_IB_LINES: usize = 2;

pub fn is_date(s: &str) -> bool {
    DATE_RE.is_match(s.trim())
}

pub fn is_rev_code(s: &str) -> bool {
    REV_CODE_RE.is_match(s.trim())
}

pub fn is_service_code(s: &str) -> bool {
    SERVICE_CODE_RE.is_match(s.trim())
}

pub fn is_money(s: &str) -> bool {
    MONEY_RE.is_match(s.trim())
}

pub fn is_integer(s: &str) -> bool {
    INTEGER_RE.is_match(s.trim())
}

pub fn is_alpha(s: &str) -> bool {
    ALPHA_RE.is_match(s)
}

/// Whether a text line looks like one billing row: a money amount plus a
/// date or a billing code.
pub fn is_ib_line(text: &str) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let money = tokens.iter().any(|t| is_money(t));
    let anchor = tokens
        .iter()
        .any(|t| is_date(t) || is_rev_code(t) || is_service_code(t));
    money && anchor
}

/// Type suggested by a header text.
pub fn header_hint(text: &str) -> Option<ColumnType> {
    HEADER_HINTS
        .iter()
        .find(|(re, _)| re.is_match(text))
        .map(|(_, tp)| *tp)
}

/// Feature vector of a column's per-row values.
pub fn column_features(values: &[String], header: &str) -> ColFeats {
    let filled: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    let n = filled.len() as f64;
    let ratio = |f: fn(&str) -> bool| {
        if filled.is_empty() {
            0.0
        } else {
            filled.iter().filter(|v| f(v)).count() as f64 / n
        }
    };
    let mean_len = if filled.is_empty() {
        0.0
    } else {
        filled.iter().map(|v| v.chars().count()).sum::<usize>() as f64 / n
    };
    let fill = if values.is_empty() {
        0.0
    } else {
        n / values.len() as f64
    };

    let mut feats = vec![0.0; FEATURE_HEADER.len()];
    feats[0] = ratio(is_date);
    feats[1] = ratio(is_rev_code);
    feats[2] = ratio(is_service_code);
    feats[3] = ratio(is_money);
    feats[4] = ratio(is_integer);
    feats[5] = ratio(is_alpha);
    // normalized to ~1 for a typical description
    feats[6] = (mean_len / 16.0).min(1.0);
    feats[7] = fill;
    ColFeats {
        values: feats,
        header_hint: header_hint(header),
    }
}

/// Scores column types from a feature vector.
pub trait ColumnScorer: Send + Sync {
    fn name(&self) -> &str;

    /// Scores of known types for one column; `rel_pos` is the column's
    /// position on the page from 0 (leftmost) to 1 (rightmost).
    fn score(&self, feats: &ColFeats, rel_pos: f64) -> Vec<(ColumnType, f64)>;
}

/// Pattern ratios, header keywords and relative position.
#[derive(Clone, Debug)]
pub struct FeatureScorer {
    pub header_bonus: f64,
    pub position_weight: f64,
}

impl Default for FeatureScorer {
    fn default() -> Self {
        Self {
            header_bonus: 0.5,
            position_weight: 0.05,
        }
    }
}

impl ColumnScorer for FeatureScorer {
    fn name(&self) -> &str {
        "features"
    }

    fn score(&self, feats: &ColFeats, rel_pos: f64) -> Vec<(ColumnType, f64)> {
        let f = |name: &str| feats.get(name);
        ColumnType::KNOWN
            .iter()
            .map(|&tp| {
                let base = match tp {
                    ColumnType::Dos => f("date"),
                    ColumnType::RevCode => f("rev_code"),
                    ColumnType::ServiceCode => f("service_code"),
                    ColumnType::Description => f("alpha") * (0.5 + 0.5 * f("mean_len")),
                    ColumnType::Units => f("integer") * (1.0 - 0.6 * f("rev_code")),
                    ColumnType::UnitCost => 0.9 * f("money"),
                    ColumnType::Charge => f("money") * (1.0 + self.position_weight * rel_pos),
                    ColumnType::Unknown => 0.0,
                };
                let bonus = if feats.header_hint == Some(tp) {
                    self.header_bonus
                } else {
                    0.0
                };
                (tp, base + bonus)
            })
            .collect()
    }
}

/// Kind of a classified page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FormKind {
    ItemizedBill,
    Other,
}

/// Classification of a page as an itemized bill.
#[derive(Clone, Debug, PartialEq)]
pub struct IbForm {
    kind: FormKind,
    ib_lines: usize,
    section: Option<BBox>,
}

impl IbForm {
    pub fn classify(page: &Page) -> Self {
        let flags: Vec<bool> = page
            .lines()
            .iter()
            .map(|l| !l.is_empty() && is_ib_line(&l.text()))
            .collect();
        let ib_lines = flags.iter().filter(|f| **f).count();

        // segment holding most billing lines, first one on ties
        let segments = PageSegments::new(page.lines());
        let mut best: Option<(usize, BBox)> = None;
        for seg in segments.segments() {
            let hits = seg.lines.iter().filter(|&&i| flags[i]).count();
            if hits > 0 && best.is_none_or(|(n, _)| hits > n) {
                best = Some((hits, seg.bbox));
            }
        }
        let kind = if ib_lines >= MIN_IB_LINES {
            FormKind::ItemizedBill
        } else {
            FormKind::Other
        };
        let section = match kind {
            FormKind::ItemizedBill => best.map(|(_, b)| b),
            FormKind::Other => None,
        };
        tracing::debug!(ib_lines, ?kind, section = ?section, "page classified");
        Self {
            kind,
            ib_lines,
            section,
        }
    }

    pub fn is_ib(&self) -> bool {
        self.kind == FormKind::ItemizedBill
    }

    pub fn kind(&self) -> FormKind {
        self.kind
    }

    pub fn str(&self) -> &'static str {
        match self.kind {
            FormKind::ItemizedBill => "ib",
            FormKind::Other => "other",
        }
    }

    pub fn ib_lines(&self) -> usize {
        self.ib_lines
    }

    /// Bbox of the segment holding the billing lines.
    pub fn get_ib_section(&self) -> Option<BBox> {
        self.section
    }
}

/// Covering box of the lines that look like billing rows.
pub fn ib_lines_bbox(page: &Page) -> Option<BBox> {
    let boxes: Vec<BBox> = page
        .lines()
        .iter()
        .filter(|l| !l.is_empty() && is_ib_line(&l.text()))
        .map(|l| l.bbox())
        .collect();
    bbox_union(boxes.iter())
}
