//! Page fixtures shared by the integration tests.

#![allow(dead_code)]

use ibextract_core::document::{DocConfig, Document, IA_RULING_VERTICAL, Line, Page, Word};
use ibextract_core::geometry::BBox;

pub const PAGE: BBox = BBox::new(0.0, 0.0, 612.0, 792.0);

/// Column edges of the standard four-column bill.
pub const EDGES: [f64; 5] = [50.0, 150.0, 400.0, 470.0, 560.0];

pub fn word(x: f64, y: f64, text: &str) -> Word {
    let w = 7.0 * text.chars().count() as f64;
    Word::new(BBox::new(x, y, x + w, y + 10.0), text, 90.0)
}

/// One physical line per entry: `(y, [(x, text)])`.
pub fn page(rows: &[(f64, Vec<(f64, &str)>)]) -> Page {
    let lines = rows
        .iter()
        .map(|(y, words)| Line::new(words.iter().map(|(x, t)| word(*x, *y, t)).collect()))
        .collect();
    Page::new(PAGE, lines)
}

/// Vertical rulings at `xs` spanning `ylt..yrb`.
pub fn with_vlines(mut page: Page, xs: &[f64], ylt: f64, yrb: f64) -> Page {
    page.set_ia_bboxes(
        IA_RULING_VERTICAL,
        xs.iter().map(|x| BBox::new(*x, ylt, *x + 1.0, yrb)).collect(),
    );
    page
}

/// Bill rows laid out in the standard columns, 20 units apart from y=110.
pub fn bill_rows(rows: &[[&'static str; 4]]) -> Vec<(f64, Vec<(f64, &'static str)>)> {
    rows.iter()
        .enumerate()
        .map(|(r, texts)| {
            let y = 110.0 + 20.0 * r as f64;
            let words = texts
                .iter()
                .enumerate()
                .filter(|(_, t)| !t.is_empty())
                .map(|(c, t)| (EDGES[c] + 5.0, *t))
                .collect();
            (y, words)
        })
        .collect()
}

pub const FIVE_ROWS: [[&str; 4]; 5] = [
    ["01/02/2021", "PHARMACY", "1", "$10.00"],
    ["01/02/2021", "LABORATORY", "2", "$22.50"],
    ["01/03/2021", "RADIOLOGY", "1", "$310.00"],
    ["01/04/2021", "EMERGENCY", "1", "$1,204.50"],
    ["01/04/2021", "SUPPLIES", "3", "$8.25"],
];

/// The standard ruled four-column bill with five rows (20 words).
pub fn ruled_bill() -> Page {
    with_vlines(page(&bill_rows(&FIVE_ROWS)), &EDGES, 100.0, 210.0)
}

pub fn doc_of(page: Page, config: DocConfig) -> Document {
    let mut doc = Document::new(config);
    doc.push_page(page);
    doc
}
