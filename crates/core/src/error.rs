//! Error types for the ibextract library.

use thiserror::Error;

/// Primary error type for loading inputs and driving external engines.
///
/// Pipeline outcomes such as "too few columns" or "step denied by the
/// template" are not errors; see [`crate::forms::StepOutcome`].
#[derive(Error, Debug)]
pub enum IbError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unknown pipeline step: {0}")]
    UnknownStep(String),

    #[error("template error: {0}")]
    Template(String),

    #[error("ocr engine {engine} failed: {msg}")]
    Engine { engine: String, msg: String },

    #[error("checkpoint {key} not stored: {msg}")]
    Checkpoint { key: String, msg: String },

    #[error("page index {0} out of range")]
    PageOutOfRange(usize),
}

/// Convenience Result type alias for IbError.
pub type Result<T> = std::result::Result<T, IbError>;
