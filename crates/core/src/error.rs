//! Low-level error types shared by the store, codec, and executor layers
//!
//! Errors are split into transient (worth retrying inside a transaction) and
//! fatal. The registry wraps these in its own taxonomy before they reach a
//! caller.

use thiserror::Error;

/// Errors raised by the durable store and the record codec
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from a file-backed store
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Value could not be encoded or decoded
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Concurrent modification of the same record; retry may succeed
    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    /// Store temporarily unreachable; retry may succeed
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Persisted data failed validation
    #[error("corruption: {0}")]
    Corruption(String),

    /// Caller supplied a malformed value
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Check if this error may succeed when the unit of work is re-run
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::TransactionConflict(_) | Error::StorageUnavailable(_)
        )
    }
}

/// Result type for store and codec operations
pub type Result<T> = std::result::Result<T, Error>;
