//! ibextract - itemized-billing table extraction from OCR page geometry.
//!
//! A page arrives as lines of recognized words plus optional auxiliary
//! geometry (ruling lines, a table region) and a rendered image. The
//! [`forms::Report`] pipeline finds the table's columns, repairs their
//! geometry, distributes words into cells, types the columns and parses
//! billing line items. [`rotation::RotationDetector`] decides how a page
//! image must be turned before any of that.

pub mod document;
pub mod error;
pub mod forms;
pub mod geometry;
pub mod ia;
pub mod layout;
pub mod ocr;
pub mod params;
pub mod raster;
pub mod rotation;

pub use document::{Document, Line, Page, Word};
pub use error::{IbError, Result};
pub use forms::{FormTemplate, LineItem, PipelineStep, Report, StepOutcome, TemplateSet};
pub use geometry::BBox;
pub use params::ReportParams;
pub use raster::Raster;
pub use rotation::{Rotation, RotationDetector, RotationOutcome, RotationParams};
