//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Storage error: {0}")]
    Storage(#[from] possum_storage::StorageError),

    #[error("Tab error: {0}")]
    Tab(#[from] possum_tabs::TabError),

    #[error("Policy error: {0}")]
    Policy(#[from] possum_policy::PolicyError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Message has no sending tab: {0}")]
    MissingSender(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),
}
