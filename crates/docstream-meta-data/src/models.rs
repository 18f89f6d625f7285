//! Domain models for database entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A tenant of the ingestion service
///
/// Created by an admin; never mutated except credential rotation.
/// Deletion cascades to every row, blob, and vector the tenant owns.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Tenant {
    pub tenant_id: Uuid,
    pub name: String,
    /// Lowercase hex SHA-256 of the API key; raw keys are never stored
    pub credential_fingerprint: String,
    pub rate_limit_per_minute: i32,
    pub created_at: DateTime<Utc>,
}

/// Pipeline stage of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Extract,
    Chunk,
    Embed,
}

impl Stage {
    pub const ALL: [Self; 3] = [Self::Extract, Self::Chunk, Self::Embed];
}

impl std::str::FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extract" => Ok(Self::Extract),
            "chunk" => Ok(Self::Chunk),
            "embed" => Ok(Self::Embed),
            _ => Err(format!("Invalid stage: {s}")),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let stage = match self {
            Self::Extract => "extract",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
        };
        write!(f, "{stage}")
    }
}

/// Lifecycle status of a document
///
/// Advances monotonically through the pipeline; `Failed` is reachable from
/// any non-terminal state. Retries never regress the document row - the
/// job's `retry_count` records them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Pending,
    Extracting,
    Chunking,
    Embedding,
    Completed,
    Failed,
}

impl DocumentStatus {
    /// Position in the pipeline, used for the monotonic-advance guard
    pub const fn rank(self) -> i32 {
        match self {
            Self::Pending => 0,
            Self::Extracting => 1,
            Self::Chunking => 2,
            Self::Embedding => 3,
            Self::Completed => 4,
            Self::Failed => 5,
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "extracting" => Ok(Self::Extracting),
            "chunking" => Ok(Self::Chunking),
            "embedding" => Ok(Self::Embedding),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid document status: {s}")),
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{status}")
    }
}

/// An uploaded document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub document_id: Uuid,
    pub tenant_id: Uuid,
    pub filename: String,
    /// Path of the raw upload in the blob store
    pub blob_path: String,
    pub size_bytes: i64,
    pub status: DocumentStatus,
    /// Opaque key-value metadata supplied at upload; stored unindexed
    pub metadata: serde_json::Value,
    /// Set when a cascading delete was interrupted; the reconciler retries
    pub failed_deletion: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to register a new document
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub document_id: Uuid,
    pub tenant_id: Uuid,
    pub filename: String,
    pub blob_path: String,
    pub size_bytes: i64,
    pub metadata: serde_json::Value,
}

/// A text chunk of a document
///
/// For a given document, `chunk_index` forms 0..N-1 with no gaps; chunks
/// always share the document's `tenant_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub tenant_id: Uuid,
    pub chunk_index: i32,
    pub text: String,
    /// Null until the embed stage has checkpointed this chunk's vector
    pub vector_snapshot_path: Option<String>,
    pub metadata: serde_json::Value,
}

/// Status of a pipeline job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Dead,
}

impl JobStatus {
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Dead)
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "dead" => Ok(Self::Dead),
            _ => Err(format!("Invalid job status: {s}")),
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Dead => "dead",
        };
        write!(f, "{status}")
    }
}

/// Stage-specific job payload, persisted as stage-discriminated JSONB
///
/// Every variant carries the correlation id so worker logs can be tied
/// back to the originating upload request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "stage", rename_all = "lowercase")]
pub enum JobPayload {
    Extract {
        blob_path: String,
        correlation_id: Uuid,
    },
    Chunk {
        text_path: String,
        correlation_id: Uuid,
    },
    Embed {
        chunk_ids: Vec<Uuid>,
        correlation_id: Uuid,
    },
}

impl JobPayload {
    pub const fn stage(&self) -> Stage {
        match self {
            Self::Extract { .. } => Stage::Extract,
            Self::Chunk { .. } => Stage::Chunk,
            Self::Embed { .. } => Stage::Embed,
        }
    }

    pub const fn correlation_id(&self) -> Uuid {
        match self {
            Self::Extract { correlation_id, .. }
            | Self::Chunk { correlation_id, .. }
            | Self::Embed { correlation_id, .. } => *correlation_id,
        }
    }
}

/// A unit of work at a single stage for a single document
/// (or chunk batch, for embed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub stage: Stage,
    pub status: JobStatus,
    pub payload: JobPayload,
    pub retry_count: i32,
    pub max_retries: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields needed to create a new job
#[derive(Debug, Clone)]
pub struct NewJob {
    pub job_id: Uuid,
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub payload: JobPayload,
    pub max_retries: i32,
}

/// Per-tenant usage counters for `GET /metrics/me`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TenantMetrics {
    pub documents_total: i64,
    pub documents_completed: i64,
    pub documents_failed: i64,
    pub chunks_total: i64,
    pub bytes_total: i64,
    pub last_upload_at: Option<DateTime<Utc>>,
}

/// Service-wide counters for the internal stats endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceStats {
    pub tenants: i64,
    pub documents: i64,
    pub chunks: i64,
    pub jobs_pending: i64,
    pub jobs_processing: i64,
    pub jobs_completed: i64,
    pub jobs_dead: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_strings() {
        for status in [
            DocumentStatus::Pending,
            DocumentStatus::Extracting,
            DocumentStatus::Chunking,
            DocumentStatus::Embedding,
            DocumentStatus::Completed,
            DocumentStatus::Failed,
        ] {
            let parsed: DocumentStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        for status in [
            JobStatus::Pending,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Dead,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn document_status_ranks_are_monotonic() {
        assert!(DocumentStatus::Pending.rank() < DocumentStatus::Extracting.rank());
        assert!(DocumentStatus::Extracting.rank() < DocumentStatus::Chunking.rank());
        assert!(DocumentStatus::Chunking.rank() < DocumentStatus::Embedding.rank());
        assert!(DocumentStatus::Embedding.rank() < DocumentStatus::Completed.rank());
    }

    #[test]
    fn payload_serializes_with_stage_discriminator() {
        let payload = JobPayload::Embed {
            chunk_ids: vec![Uuid::new_v4()],
            correlation_id: Uuid::new_v4(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json.get("stage").and_then(|v| v.as_str()), Some("embed"));

        let back: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(back, payload);
        assert_eq!(back.stage(), Stage::Embed);
    }
}
