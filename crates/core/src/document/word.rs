//! Words and lines as delivered by the OCR stage.

use serde::{Deserialize, Serialize};

use crate::geometry::{BBox, bbox_union};

/// Extra recognition detail attached to a word.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WordDetail {
    /// Baseline offset relative to the word's bottom edge.
    pub baseline: f64,
    /// Warning tags raised by the recognizer.
    pub warnings: Vec<String>,
    /// Dictionary the word was confirmed against, empty if none.
    pub from_dict: String,
}

/// A recognized word.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub bbox: BBox,
    pub text: String,
    /// Recognition confidence in `0..=100`.
    #[serde(default)]
    pub conf: f64,
    #[serde(default)]
    pub detail: WordDetail,
}

impl Word {
    pub fn new(bbox: BBox, text: impl Into<String>, conf: f64) -> Self {
        Self {
            bbox,
            text: text.into(),
            conf,
            detail: WordDetail::default(),
        }
    }

    pub fn conf(&self) -> f64 {
        self.conf
    }
}

/// An ordered run of words on one physical text line.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub words: Vec<Word>,
}

impl Line {
    pub fn new(words: Vec<Word>) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[Word] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Covering box of all words; a default (empty) box for an empty line.
    pub fn bbox(&self) -> BBox {
        bbox_union(self.words.iter().map(|w| &w.bbox)).unwrap_or_default()
    }

    /// Word texts joined by single spaces.
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (i, w) in self.words.iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            out.push_str(&w.text);
        }
        out
    }

    /// Mean word confidence, 0 for an empty line.
    pub fn conf(&self) -> f64 {
        if self.words.is_empty() {
            return 0.0;
        }
        self.words.iter().map(|w| w.conf).sum::<f64>() / self.words.len() as f64
    }
}
