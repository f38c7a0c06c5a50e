//! Error types for the carrier-store crate.

use std::io;

use thiserror::Error;

/// Top-level store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// No record exists under the requested key.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Key is empty or contains characters the backend cannot address safely.
    #[error("Invalid record key: {0:?}")]
    InvalidKey(String),

    /// Query named an index that was never declared.
    #[error("Unknown index: {0}")]
    UnknownIndex(String),

    /// Query is malformed (zero limit and the like).
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Storage location is unusable (relative, traversal, not a directory).
    #[error("Invalid store path: {0}")]
    InvalidPath(String),

    /// Backend temporarily refused the operation.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// I/O failure in a file-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Record bytes could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] SerializationError),

    /// Internal error (lock poisoning, etc.).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Failures that may succeed if the same operation is repeated later
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Io(_))
    }
}

/// Serialization and deserialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Bincode encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("Bincode decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}

/// Specialized `Result` type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        Self::Internal(format!("Lock poisoned: {e}"))
    }
}
