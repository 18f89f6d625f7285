//! Error types for configuration loading and validation

use thiserror::Error;

/// Result type alias for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors produced while loading or validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value fell outside its permitted range
    #[error("invalid value for {field}: {message}")]
    OutOfRange { field: &'static str, message: String },

    /// An environment override could not be parsed
    #[error("cannot parse environment variable {var}: {message}")]
    BadEnvValue { var: String, message: String },

    /// Two settings contradict each other
    #[error("inconsistent configuration: {0}")]
    Inconsistent(String),
}
