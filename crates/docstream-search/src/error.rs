//! Error types for semantic search

use docstream_common::{CorrelationId, Retryable};
use thiserror::Error;

/// Result type alias for search operations
pub type SearchResult<T> = Result<T, SearchError>;

/// Errors that can occur during semantic search
#[derive(Error, Debug)]
pub enum SearchError {
    /// The query could not be embedded
    #[error("failed to embed query (correlation_id: {correlation_id}): {message}")]
    EmbeddingFailed {
        message: String,
        correlation_id: CorrelationId,
    },

    /// The vector index query failed
    #[error(transparent)]
    Vector(#[from] docstream_vector_data::VectorDataError),

    /// The search exceeded its time budget
    #[error("search timed out after {timeout_ms}ms (correlation_id: {correlation_id})")]
    Timeout {
        timeout_ms: u64,
        correlation_id: CorrelationId,
    },
}

impl Retryable for SearchError {
    fn is_transient(&self) -> bool {
        match self {
            Self::EmbeddingFailed { .. } | Self::Timeout { .. } => true,
            Self::Vector(e) => e.is_transient(),
        }
    }
}
