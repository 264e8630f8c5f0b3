//! Itemized-billing forms: classification, templates and the report
//! pipeline.
//!
//! This module contains:
//! - `checkpoint` - pipeline snapshots and their stores
//! - `classify` - pattern features, column scoring and page classification
//! - `items` - parsed line items and field values
//! - `report` - the per-page pipeline state machine
//! - `subtypes` - column value formats (fill direction, missing year)
//! - `template` - step policies selected per document

pub mod checkpoint;
pub mod classify;
pub mod items;
pub mod report;
pub mod subtypes;
pub mod template;

pub use checkpoint::{
    CheckpointSink, JsonDirCheckpointStore, MemoryCheckpointStore, NullSink, ReportCheckpoint,
    SlotState, StoredCheckpoint,
};
pub use classify::{ColumnScorer, FeatureScorer, FormKind, IbForm, column_features};
pub use items::{Field, FieldValue, LineItem};
pub use report::{AssignedWord, PAGE_IMAGE_KEY, Report, StepOutcome};
pub use subtypes::{ColumnFormat, Fill, Missing, Subtypes, subtypes_from_tags};
pub use template::{DEFAULT_TEMPLATE_ID, FormTemplate, PipelineStep, StepPolicy, TemplateSet};
