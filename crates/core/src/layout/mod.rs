//! Layout model for billing tables.
//!
//! This module contains:
//! - `columns` - typed column slots and the correction move log
//! - `detect` - column geometry detection (rulings, table region, text)
//! - `gridline` - ruling lines bound to a target segment
//! - `gridrows` - rows and cells of a table segment
//! - `segments` - vertical page segments

pub mod columns;
pub mod detect;
pub mod gridline;
pub mod gridrows;
pub mod segments;

pub use columns::{
    ColFeats, Column, ColumnMove, ColumnSource, ColumnType, Columns, CornerCase, Edge,
    FEATURE_HEADER,
};
pub use detect::ColumnDetector;
pub use gridline::{Axis, Gridline};
pub use gridrows::{Cell, GridRow, GridRows};
pub use segments::{PageSegments, Segment};
