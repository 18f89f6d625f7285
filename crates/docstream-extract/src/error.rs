//! Error types for text extraction

use docstream_common::Retryable;
use thiserror::Error;

/// Result type alias for extraction operations
pub type ExtractResult<T> = Result<T, ExtractError>;

/// Errors that can occur during text extraction
#[derive(Error, Debug)]
pub enum ExtractError {
    /// The file cannot be decoded and never will be (binary content,
    /// malformed PDF structure). Dead-letters the job without retry.
    #[error("corrupt document: {0}")]
    CorruptDocument(String),

    /// No extractor handles this file type
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Decoder-level I/O failure worth retrying
    #[error("extractor I/O failure: {0}")]
    Io(String),
}

impl Retryable for ExtractError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
