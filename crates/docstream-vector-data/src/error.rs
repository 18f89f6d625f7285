//! Error types for vector index operations

use docstream_common::Retryable;
use thiserror::Error;

/// Result type alias for vector index operations
pub type VectorResult<T> = Result<T, VectorDataError>;

/// Errors that can occur during vector index operations
#[derive(Error, Debug)]
pub enum VectorDataError {
    /// Index backend is unavailable or the request failed
    #[error("vector storage error: {0}")]
    Storage(String),

    /// Query or point vector has the wrong dimension
    #[error("vector dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Collection bootstrap or configuration problem
    #[error("collection error: {0}")]
    Collection(String),

    /// A search result carried a tenant tag that does not match the
    /// mandatory filter. This is a consistency violation, never filtered
    /// silently.
    #[error("tenant isolation violation: point {point} tagged {actual}, expected {expected}")]
    IsolationViolation {
        point: String,
        actual: String,
        expected: String,
    },
}

impl Retryable for VectorDataError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}
