//! Common error handling utilities and patterns
//!
//! Traits shared by the per-crate error enums: lightweight context
//! attachment, and the transient/permanent classification that drives the
//! pipeline's retry policy.

use std::fmt;

/// Classification of a failure for retry purposes.
///
/// Transient failures (I/O, timeouts, unavailable backends) are retried
/// with exponential backoff; permanent failures (corrupt input, dimension
/// mismatch) dead-letter the job immediately.
pub trait Retryable {
    /// Whether retrying this error can ever succeed
    fn is_transient(&self) -> bool;
}

/// Trait for adding context to errors
///
/// Provides a consistent way to add context to errors across all crates,
/// similar to anyhow's context() but for custom error types.
pub trait ErrorContext<T> {
    /// Add context to an error
    fn context<C>(self, context: C) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Add context with a closure (lazy evaluation)
    fn with_context<C, F>(self, f: F) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ErrorContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context<C>(self, context: C) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| format!("{context}: {e}"))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, String>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| format!("{}: {}", f(), e))
    }
}
