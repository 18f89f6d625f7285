//! Error types for metadata store operations
//!
//! Errors carry the attempted operation and an optional correlation id so
//! worker logs can identify exactly which query failed for which request.

use docstream_common::Retryable;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for metadata store operations
pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// The database operation that was being attempted when an error occurred
#[derive(Debug, Clone)]
pub enum DatabaseOperation {
    Query { description: String },
    ClaimJob { job_id: Uuid },
    AdvanceDocumentStatus { document_id: Uuid },
    InsertChunks { document_id: Uuid, chunk_count: usize },
    TenantLookup,
}

impl std::fmt::Display for DatabaseOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query { description } => write!(f, "{description}"),
            Self::ClaimJob { job_id } => write!(f, "claim_job({job_id})"),
            Self::AdvanceDocumentStatus { document_id } => {
                write!(f, "advance_document_status({document_id})")
            }
            Self::InsertChunks {
                document_id,
                chunk_count,
            } => write!(f, "insert_chunks({document_id}, {chunk_count})"),
            Self::TenantLookup => write!(f, "tenant_lookup"),
        }
    }
}

/// Errors that can occur during metadata store operations
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// A query failed at the driver level
    #[error("database operation {operation} failed: {source}")]
    QueryFailed {
        operation: Box<DatabaseOperation>,
        #[source]
        source: sqlx::Error,
        correlation_id: Option<String>,
    },

    /// Stored data violates an invariant the code relies on
    #[error("data integrity violation during {operation}: {message}")]
    DataIntegrity {
        operation: Box<DatabaseOperation>,
        message: String,
        correlation_id: Option<String>,
    },

    /// Connection pool could not be created or has shut down
    #[error("database connection failed: {0}")]
    ConnectionFailed(String),
}

impl DatabaseError {
    /// Whether this failure is a unique-constraint violation (Postgres
    /// SQLSTATE 23505), e.g. a duplicate tenant name or fingerprint
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            Self::QueryFailed {
                source: sqlx::Error::Database(db),
                ..
            } if db.code().as_deref() == Some("23505")
        )
    }

    pub fn query_failed(
        operation: DatabaseOperation,
        source: sqlx::Error,
        correlation_id: Option<String>,
    ) -> Self {
        Self::QueryFailed {
            operation: Box::new(operation),
            source,
            correlation_id,
        }
    }

    pub fn integrity(operation: DatabaseOperation, message: impl Into<String>) -> Self {
        Self::DataIntegrity {
            operation: Box::new(operation),
            message: message.into(),
            correlation_id: None,
        }
    }
}

impl Retryable for DatabaseError {
    fn is_transient(&self) -> bool {
        // Driver-level failures are worth retrying; integrity violations
        // will fail identically on every attempt.
        match self {
            Self::QueryFailed { .. } | Self::ConnectionFailed(_) => true,
            Self::DataIntegrity { .. } => false,
        }
    }
}

/// Extension trait mapping raw sqlx errors into [`DatabaseError`]
pub trait DatabaseErrorExt<T> {
    fn map_db_err(
        self,
        operation: DatabaseOperation,
        correlation_id: Option<String>,
    ) -> DatabaseResult<T>;
}

impl<T> DatabaseErrorExt<T> for Result<T, sqlx::Error> {
    fn map_db_err(
        self,
        operation: DatabaseOperation,
        correlation_id: Option<String>,
    ) -> DatabaseResult<T> {
        self.map_err(|e| DatabaseError::query_failed(operation, e, correlation_id))
    }
}
