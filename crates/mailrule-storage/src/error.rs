//! Store error types

use thiserror::Error;

/// Store error types
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Unsupported store backend: type '{kind}', format '{format}'")]
    Unsupported { kind: String, format: String },
    #[error("Duplicate store identifier: {0}")]
    Duplicate(String),
    #[error("Store backend error: {0}")]
    Backend(String),
}

/// Store result type
pub type StoreResult<T> = Result<T, StoreError>;
