//! Repository abstraction for the metadata store
//!
//! All tenant-scoped operations take the caller's `tenant_id` and include
//! it in query construction - this is where the tenant isolation invariant
//! is enforced for relational data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseResult;
use crate::models::{
    Chunk, Document, DocumentStatus, Job, NewDocument, NewJob, ServiceStats, Tenant, TenantMetrics,
};

/// Repository over tenants, documents, chunks, and jobs
#[async_trait]
pub trait MetaRepository: Send + Sync {
    // ------------------------------------------------------------------
    // Tenants
    // ------------------------------------------------------------------

    /// Register a new tenant. `name` and `credential_fingerprint` are
    /// unique; violations surface as query errors.
    async fn create_tenant(
        &self,
        name: &str,
        credential_fingerprint: &str,
        rate_limit_per_minute: i32,
    ) -> DatabaseResult<Tenant>;

    async fn get_tenant(&self, tenant_id: &Uuid) -> DatabaseResult<Option<Tenant>>;

    /// Resolve an API-key fingerprint to its tenant. The only credential
    /// lookup path - raw keys never reach the store.
    async fn get_tenant_by_fingerprint(&self, fingerprint: &str)
    -> DatabaseResult<Option<Tenant>>;

    async fn list_tenants(&self) -> DatabaseResult<Vec<Tenant>>;

    /// Replace a tenant's credential fingerprint. Returns false if the
    /// tenant does not exist.
    async fn rotate_tenant_credential(
        &self,
        tenant_id: &Uuid,
        new_fingerprint: &str,
    ) -> DatabaseResult<bool>;

    /// Remove the tenant row and every document/chunk/job row it owns.
    /// Blob and vector cleanup is the delete service's responsibility.
    async fn delete_tenant(&self, tenant_id: &Uuid) -> DatabaseResult<bool>;

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    async fn insert_document(&self, doc: NewDocument) -> DatabaseResult<Document>;

    async fn get_document(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<Option<Document>>;

    /// Cross-tenant lookup, internal scope only
    async fn get_document_any_tenant(&self, document_id: &Uuid)
    -> DatabaseResult<Option<Document>>;

    /// Most recent documents; `tenant_id = None` is internal scope
    async fn list_documents(
        &self,
        tenant_id: Option<&Uuid>,
        limit: i64,
    ) -> DatabaseResult<Vec<Document>>;

    /// Conditional status transition `from -> to`. Returns false when the
    /// row was not in `from` (another worker advanced it first); the status
    /// never regresses.
    async fn advance_document_status(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> DatabaseResult<bool>;

    /// Transition to `failed` from any non-terminal state, recording the
    /// terminal job's error message.
    async fn mark_document_failed(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
        error: &str,
    ) -> DatabaseResult<bool>;

    /// Flag an interrupted cascading delete for the reconciler
    async fn mark_failed_deletion(&self, tenant_id: &Uuid, document_id: &Uuid)
    -> DatabaseResult<()>;

    async fn delete_document_row(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<bool>;

    async fn tenant_metrics(&self, tenant_id: &Uuid) -> DatabaseResult<TenantMetrics>;

    async fn service_stats(&self) -> DatabaseResult<ServiceStats>;

    // ------------------------------------------------------------------
    // Chunks
    // ------------------------------------------------------------------

    /// Batch-insert chunk rows. Idempotent on `chunk_id`.
    async fn insert_chunks(&self, chunks: &[Chunk]) -> DatabaseResult<()>;

    /// All chunks of a document in `chunk_index` order
    async fn get_chunks(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<Vec<Chunk>>;

    /// Chunks by id, tenant-filtered, in `chunk_index` order
    async fn get_chunks_by_ids(
        &self,
        tenant_id: &Uuid,
        chunk_ids: &[Uuid],
    ) -> DatabaseResult<Vec<Chunk>>;

    /// Record the snapshot checkpoint path on the given chunks
    async fn set_vector_snapshot_path(
        &self,
        tenant_id: &Uuid,
        chunk_ids: &[Uuid],
        snapshot_path: &str,
    ) -> DatabaseResult<()>;

    /// True when every chunk of the document has a snapshot path set
    async fn all_chunks_embedded(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<bool>;

    /// Delete the document's chunk rows, returning the count removed
    async fn delete_chunks(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<u64>;

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    async fn create_job(&self, job: NewJob) -> DatabaseResult<Job>;

    async fn get_job(&self, job_id: &Uuid) -> DatabaseResult<Option<Job>>;

    /// Lease fence: conditional `pending -> processing`. Returns None when
    /// the job was not pending (already claimed, completed, or dead), so a
    /// worker that race-lost moves on.
    async fn claim_job(&self, job_id: &Uuid) -> DatabaseResult<Option<Job>>;

    async fn complete_job(&self, job_id: &Uuid) -> DatabaseResult<()>;

    /// Complete a job, advance its document `from -> to`, and insert the
    /// successor-stage jobs, all in one metadata transaction. Returns the
    /// created jobs so the caller can enqueue them.
    async fn complete_job_and_advance(
        &self,
        job_id: &Uuid,
        tenant_id: &Uuid,
        document_id: &Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        next_jobs: Vec<NewJob>,
    ) -> DatabaseResult<Vec<Job>>;

    /// Transient failure: `processing -> pending`, increment `retry_count`,
    /// record the error. Returns the new retry count.
    async fn release_job_for_retry(&self, job_id: &Uuid, error: &str) -> DatabaseResult<i32>;

    /// Terminal failure: retries exhausted or permanent error. Dead jobs
    /// are retained for operator inspection.
    async fn mark_job_dead(&self, job_id: &Uuid, error: &str) -> DatabaseResult<()>;

    /// Crash recovery: move every `processing` job whose last update is
    /// older than `cutoff` back to `pending`, returning the reset jobs so
    /// the caller can re-enqueue them. The inverse of the claim fence - a
    /// worker that died holding a lease loses it here.
    async fn reset_stale_processing_jobs(
        &self,
        cutoff: DateTime<Utc>,
    ) -> DatabaseResult<Vec<Job>>;

    async fn jobs_for_document(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<Vec<Job>>;

    async fn delete_jobs(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<u64>;
}
