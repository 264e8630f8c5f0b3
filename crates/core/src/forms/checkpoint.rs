//! Report checkpoints.
//!
//! A checkpoint is a snapshot of pipeline state stored under an opaque key.
//! Stores overwrite on re-save; a key is never stored twice.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::error::{IbError, Result};
use crate::document::Word;
use crate::forms::items::LineItem;
use crate::forms::report::AssignedWord;
use crate::forms::template::PipelineStep;
use crate::geometry::BBox;
use crate::layout::columns::{ColumnMove, ColumnType};

/// Saved state of one column slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlotState {
    pub bbox: BBox,
    pub tp: ColumnType,
    pub confidence: f64,
    pub enabled: bool,
    /// Per-row cell texts accumulated by word assignment.
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default)]
    pub header: Vec<String>,
}

/// Snapshot of a report's pipeline state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportCheckpoint {
    pub page: usize,
    pub completed: Vec<PipelineStep>,
    pub min_cols: usize,
    pub slots: Vec<SlotState>,
    pub moves: Vec<ColumnMove>,
    pub target: BBox,
    pub hlines: Vec<BBox>,
    pub vlines: Vec<BBox>,
    /// `(row, column, label)` of labelled grid cells.
    #[serde(default)]
    pub cell_labels: Option<Vec<(usize, usize, String)>>,
    #[serde(default)]
    pub assigned: Vec<AssignedWord>,
    #[serde(default)]
    pub orphans: Vec<Word>,
    pub items: Vec<LineItem>,
}

/// Destination of checkpoints.
pub trait CheckpointSink: Send + Sync {
    fn save(&self, key: &str, tags: &[String], state: &ReportCheckpoint) -> Result<()>;
}

/// Discards every checkpoint.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl CheckpointSink for NullSink {
    fn save(&self, _key: &str, _tags: &[String], _state: &ReportCheckpoint) -> Result<()> {
        Ok(())
    }
}

/// A stored checkpoint with its tags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredCheckpoint {
    pub key: String,
    pub tags: Vec<String>,
    pub state: ReportCheckpoint,
}

/// Keeps checkpoints in memory.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    entries: Mutex<BTreeMap<String, StoredCheckpoint>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&self, key: &str) -> Option<StoredCheckpoint> {
        self.entries.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries
            .lock()
            .map(|e| e.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CheckpointSink for MemoryCheckpointStore {
    fn save(&self, key: &str, tags: &[String], state: &ReportCheckpoint) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|e| IbError::Checkpoint {
            key: key.to_string(),
            msg: e.to_string(),
        })?;
        entries.insert(
            key.to_string(),
            StoredCheckpoint {
                key: key.to_string(),
                tags: tags.to_vec(),
                state: state.clone(),
            },
        );
        Ok(())
    }
}

/// Writes each checkpoint to `<dir>/<key>.json`.
#[derive(Clone, Debug)]
pub struct JsonDirCheckpointStore {
    dir: PathBuf,
}

impl JsonDirCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File of `key`. Bytes other than ASCII alphanumerics, `-`, `_` and
    /// `.` are percent-encoded, so distinct keys never share a file.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let mut name = String::with_capacity(key.len());
        for b in key.bytes() {
            if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.') {
                name.push(b as char);
            } else {
                name.push_str(&format!("%{b:02X}"));
            }
        }
        self.dir.join(format!("{name}.json"))
    }

    pub fn load(&self, key: &str) -> Result<StoredCheckpoint> {
        let data = std::fs::read_to_string(self.path_for(key))?;
        Ok(serde_json::from_str(&data)?)
    }
}

impl CheckpointSink for JsonDirCheckpointStore {
    fn save(&self, key: &str, tags: &[String], state: &ReportCheckpoint) -> Result<()> {
        let stored = StoredCheckpoint {
            key: key.to_string(),
            tags: tags.to_vec(),
            state: state.clone(),
        };
        let js = serde_json::to_string_pretty(&stored)?;
        std::fs::write(self.path_for(key), js)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryCheckpointStore::new();
        let mut state = ReportCheckpoint {
            page: 1,
            ..ReportCheckpoint::default()
        };
        store.save("p1", &["a".into()], &state).unwrap();
        state.min_cols = 4;
        store.save("p1", &["b".into()], &state).unwrap();
        assert_eq!(store.len(), 1);
        let got = store.load("p1").unwrap();
        assert_eq!(got.tags, vec!["b".to_string()]);
        assert_eq!(got.state.min_cols, 4);
        assert!(store.load("p2").is_none());
    }

    #[test]
    fn json_dir_store_round_trip() {
        let dir = std::env::temp_dir().join(format!("ibextract-ckpt-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = JsonDirCheckpointStore::new(&dir);
        let state = ReportCheckpoint {
            completed: vec![PipelineStep::FindColumns],
            ..ReportCheckpoint::default()
        };
        store.save("doc/p0", &[], &state).unwrap();
        store.save("doc/p0", &["again".into()], &state).unwrap();
        assert_eq!(store.path_for("doc/p0").file_name().unwrap(), "doc%2Fp0.json");
        let got = store.load("doc/p0").unwrap();
        assert_eq!(got.state.completed, vec![PipelineStep::FindColumns]);
        assert_eq!(got.tags, vec!["again".to_string()]);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn escaped_keys_keep_their_own_files() {
        let dir = std::env::temp_dir().join(format!("ibextract-ckpt-keys-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let store = JsonDirCheckpointStore::new(&dir);
        let keys = ["doc/p0", "doc_p0", "doc%2Fp0", "doc p0", "doc\u{e9}p0"];
        for (page, key) in keys.iter().enumerate() {
            let state = ReportCheckpoint {
                page,
                ..ReportCheckpoint::default()
            };
            store.save(key, &[], &state).unwrap();
        }
        for (page, key) in keys.iter().enumerate() {
            let got = store.load(key).unwrap();
            assert_eq!(got.key, *key);
            assert_eq!(got.state.page, page);
        }
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), keys.len());
        assert_eq!(
            store.path_for("page-0-find_columns").file_name().unwrap(),
            "page-0-find_columns.json"
        );
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_dir_is_an_error() {
        let store = JsonDirCheckpointStore::new("/nonexistent/ibextract/ckpt");
        let err = store.save("k", &[], &ReportCheckpoint::default()).unwrap_err();
        assert!(matches!(err, IbError::Io(_)));
    }
}
