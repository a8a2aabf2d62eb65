//! Possum Storage Layer
//!
//! SQLite-backed key-value persistence for recorded request decisions.
//! Every entry is an opaque JSON string; decoding belongs to the caller so a
//! single unreadable row never prevents the rest from loading.

mod database;
mod error;
mod migrations;

pub use database::{Database, StoredEntry};
pub use error::StorageError;

pub type Result<T> = std::result::Result<T, StorageError>;
