//! Error types for the docstream-embeddings crate

use docstream_common::Retryable;
use thiserror::Error;

/// Result type alias for embedding operations
pub type EmbeddingResult<T> = Result<T, EmbeddingError>;

/// Errors that can occur during embedding generation
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Network failure or non-success response from the provider
    #[error("embedding provider unavailable: {0}")]
    Network(String),

    /// The provider rejected the input itself
    #[error("embedder rejected input: {0}")]
    InvalidInput(String),

    /// The provider returned vectors of an unexpected dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The response body could not be decoded
    #[error("malformed provider response: {0}")]
    MalformedResponse(String),
}

impl Retryable for EmbeddingError {
    fn is_transient(&self) -> bool {
        // Rejected input and wrong dimensions fail identically forever; a
        // malformed response usually means a transient upstream problem.
        matches!(self, Self::Network(_) | Self::MalformedResponse(_))
    }
}
