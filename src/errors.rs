//! Unified error types and result handling.
//!
//! Fatal pipeline conditions (no OCR text, storage failure, cancellation)
//! are error variants here; degraded parse/recognition conditions are
//! recorded as validation warnings on the receipt instead (see
//! [`crate::models::ValidationWarning`]) and never abort processing.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Database error: {0}")]
    Database(Box<sea_orm::DbErr>),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported file type: {extension}")]
    UnsupportedFileType { extension: String },

    #[error("OCR unavailable: {message}")]
    OcrUnavailable { message: String },

    #[error("OCR failed: {message}")]
    OcrFailed { message: String },

    #[error("Recognition model error: {message}")]
    Recognition { message: String },

    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    #[error("Not found: {what}")]
    NotFound { what: String },

    #[error("Invalid review action: {message}")]
    InvalidReviewAction { message: String },
}

impl From<sea_orm::DbErr> for Error {
    fn from(value: sea_orm::DbErr) -> Self {
        Error::Database(Box::new(value))
    }
}

// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;
