//! Error taxonomy for the worker pipeline
//!
//! Every failure funnels into [`PipelineError`] and is classified as
//! transient (retry with backoff) or permanent (dead-letter) through the
//! shared [`Retryable`] trait.

use docstream_common::Retryable;
use thiserror::Error;

use docstream_blob::BlobError;
use docstream_chunking::ChunkingError;
use docstream_embeddings::EmbeddingError;
use docstream_extract::ExtractError;
use docstream_meta_data::DatabaseError;
use docstream_queue::QueueError;
use docstream_vector_data::VectorDataError;

/// Result type alias for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors that can occur inside the ingestion pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Blob(#[from] BlobError),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Vector(#[from] VectorDataError),

    /// A job carried a payload that does not match its stage, or referenced
    /// state that cannot exist. Always permanent.
    #[error("invalid job: {0}")]
    InvalidJob(String),

    /// A stage exceeded its wall-clock budget. Retried like any transient
    /// infrastructure failure.
    #[error("stage budget of {budget_secs}s exceeded")]
    BudgetExceeded { budget_secs: u64 },
}

impl Retryable for PipelineError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Database(e) => e.is_transient(),
            Self::Queue(e) => e.is_transient(),
            Self::Blob(e) => e.is_transient(),
            Self::Extract(e) => e.is_transient(),
            Self::Embedding(e) => e.is_transient(),
            Self::Vector(e) => e.is_transient(),
            Self::Chunking(_) | Self::InvalidJob(_) => false,
            Self::BudgetExceeded { .. } => true,
        }
    }
}
