//! Document model - pages of OCR'd lines and words.
//!
//! This module contains:
//! - `word` - words, word detail and physical text lines
//! - `page` - pages with source transform, auxiliary geometry and images

pub mod page;
pub mod word;

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{IbError, Result};

pub use page::{
    IA_RULING_HORIZONTAL, IA_RULING_VERTICAL, IA_TABLE_REGION, IA_TABLE_SUB_REGIONS, Page,
    PageStatistics, SourceTransform,
};
pub use word::{Line, Word, WordDetail};

/// Free-form string configuration carried with a document.
pub type DocConfig = BTreeMap<String, String>;

/// A processed input document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Document {
    #[serde(default)]
    pub config: DocConfig,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl Document {
    pub fn new(config: DocConfig) -> Self {
        Self {
            config,
            pages: Vec::new(),
        }
    }

    pub fn from_json_str(js: &str) -> Result<Self> {
        Ok(serde_json::from_str(js)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    pub fn push_page(&mut self, page: Page) {
        self.pages.push(page);
    }

    pub fn page(&self, idx: usize) -> Result<&Page> {
        self.pages.get(idx).ok_or(IbError::PageOutOfRange(idx))
    }

    pub fn last_page(&self) -> Option<&Page> {
        self.pages.last()
    }

    pub fn config_value(&self, key: &str) -> Option<&str> {
        self.config.get(key).map(String::as_str)
    }
}
