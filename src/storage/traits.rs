//! Storage traits and error types
//!
//! This module defines the trait interface for record stores and the
//! associated error type.

use crate::storage::RecordSet;
use std::path::Path;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: String,
        source: tempfile::PersistError,
    },

    #[error("Output location not writable: {0}")]
    NotWritable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for record store implementations
///
/// A store holds the complete record set of a list. It is read once when a
/// run starts and rewritten as a whole after every page, so the stored copy
/// is always a fully merged snapshot.
pub trait RecordStore {
    /// Location of the stored data, for log and summary output
    fn location(&self) -> &Path;

    /// Checks the store can be written before any network activity
    fn ensure_writable(&self) -> StorageResult<()>;

    /// Loads the previously stored records
    ///
    /// # Returns
    ///
    /// An empty set when nothing has been stored yet
    fn load(&self) -> StorageResult<RecordSet>;

    /// Replaces the stored records with `records`
    ///
    /// Implementations must leave the previous contents intact when the
    /// write fails.
    fn persist(&self, records: &RecordSet) -> StorageResult<()>;
}
