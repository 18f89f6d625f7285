//! Error types for the queue substrate and scheduler

use docstream_common::Retryable;
use thiserror::Error;

/// Result type alias for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Errors that can occur in the queue substrate
#[derive(Error, Debug)]
pub enum QueueError {
    /// A queue query failed at the driver level
    #[error("queue operation {operation} failed: {source}")]
    Query {
        operation: &'static str,
        #[source]
        source: sqlx::Error,
    },

    /// The rotation pointer could not be read or advanced
    #[error("rotation store failure: {0}")]
    Rotation(String),
}

impl QueueError {
    pub const fn query(operation: &'static str, source: sqlx::Error) -> Self {
        Self::Query { operation, source }
    }
}

impl Retryable for QueueError {
    fn is_transient(&self) -> bool {
        true
    }
}
