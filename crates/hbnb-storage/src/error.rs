//! Storage error types for hbnb-storage.
//!
//! [`StorageError`] covers all anticipated failure modes in the storage layer:
//! registry faults bubbled up from hbnb-core, serialization, database and
//! file I/O failures, and lifecycle misuse.
//!
//! "Not found" is never an error here; lookups return `Ok(None)`.

use std::path::PathBuf;

use hbnb_core::CoreError;
use thiserror::Error;

/// Errors produced by storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Registry or model fault (unknown type, invalid record, bad key).
    #[error(transparent)]
    Model(#[from] CoreError),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A statement against the database failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The database could not be opened or configured.
    #[error("failed to connect to database at '{path}': {source}", path = path.display())]
    Connection {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// A commit failed; the unit-of-work has been rolled back.
    #[error("transaction failed and was rolled back: {source}")]
    Transaction {
        #[source]
        source: rusqlite::Error,
    },

    /// Reading or writing the backing document failed.
    #[error("I/O error on '{path}': {source}", path = path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing document exists but is not a JSON object of records.
    #[error("corrupt document '{path}': {reason}", path = path.display())]
    CorruptDocument { path: PathBuf, reason: String },

    /// Stored data contradicts itself.
    #[error("integrity error: {reason}")]
    Integrity { reason: String },

    /// The session backend was closed and has not been reloaded.
    #[error("session is closed; reload() before further use")]
    SessionClosed,

    /// Configuration named a backend that does not exist.
    #[error("unknown storage backend: '{0}'")]
    UnknownBackend(String),
}

impl StorageError {
    /// True when the error is a registry miss on a type name.
    pub fn is_unknown_type(&self) -> bool {
        matches!(self, StorageError::Model(CoreError::UnknownType { .. }))
    }
}
