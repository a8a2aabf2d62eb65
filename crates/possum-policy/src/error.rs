//! Policy error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("Reason already registered: {0}")]
    DuplicateReason(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Storage error: {0}")]
    Storage(#[from] possum_storage::StorageError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Persistence writer has shut down")]
    WriterClosed,
}
