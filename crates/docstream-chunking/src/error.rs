//! Error types for chunking

use thiserror::Error;

/// Result type alias for chunking operations
pub type ChunkingResult<T> = Result<T, ChunkingError>;

/// Errors that can occur while configuring or running the chunker
#[derive(Error, Debug)]
pub enum ChunkingError {
    /// Chunker parameters are out of range
    #[error("invalid chunker configuration: {0}")]
    InvalidConfig(String),
}
