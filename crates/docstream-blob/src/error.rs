//! Error types for blob store operations

use docstream_common::Retryable;
use thiserror::Error;

/// Result type alias for blob operations
pub type BlobResult<T> = Result<T, BlobError>;

/// Errors that can occur during blob store operations
#[derive(Error, Debug)]
pub enum BlobError {
    /// The requested object does not exist
    #[error("blob not found: {path}")]
    NotFound { path: String },

    /// Backend I/O failure
    #[error("blob storage error: {0}")]
    Storage(#[from] object_store::Error),

    /// A snapshot object could not be decoded
    #[error("corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

impl Retryable for BlobError {
    fn is_transient(&self) -> bool {
        // A missing object or a corrupt snapshot will not appear or heal by
        // retrying; backend I/O failures can.
        matches!(self, Self::Storage(_))
    }
}
