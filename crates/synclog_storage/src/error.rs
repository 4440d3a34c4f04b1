//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store log is corrupted.
    #[error("store corrupted: {0}")]
    Corrupted(String),

    /// A row could not be encoded.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// A row could not be decoded.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The store name cannot be used as a file name.
    #[error("invalid store name {0:?}")]
    InvalidName(String),
}
