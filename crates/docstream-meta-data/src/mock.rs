//! In-memory mock repository for tests and single-process development
//!
//! Implements the same guarded transitions as the Postgres repository so
//! pipeline tests exercise real state-machine behavior.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::error::DatabaseResult;
use crate::models::{
    Chunk, Document, DocumentStatus, Job, JobStatus, NewDocument, NewJob, ServiceStats, Tenant,
    TenantMetrics,
};
use crate::traits::MetaRepository;

#[derive(Default)]
struct State {
    tenants: HashMap<Uuid, Tenant>,
    documents: HashMap<Uuid, Document>,
    chunks: HashMap<Uuid, Chunk>,
    jobs: HashMap<Uuid, Job>,
}

/// In-memory implementation of [`MetaRepository`]
#[derive(Default)]
pub struct MockMetaRepository {
    state: Mutex<State>,
}

impl MockMetaRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl MetaRepository for MockMetaRepository {
    async fn create_tenant(
        &self,
        name: &str,
        credential_fingerprint: &str,
        rate_limit_per_minute: i32,
    ) -> DatabaseResult<Tenant> {
        let tenant = Tenant {
            tenant_id: Uuid::new_v4(),
            name: name.to_string(),
            credential_fingerprint: credential_fingerprint.to_string(),
            rate_limit_per_minute,
            created_at: Utc::now(),
        };
        self.lock().tenants.insert(tenant.tenant_id, tenant.clone());
        Ok(tenant)
    }

    async fn get_tenant(&self, tenant_id: &Uuid) -> DatabaseResult<Option<Tenant>> {
        Ok(self.lock().tenants.get(tenant_id).cloned())
    }

    async fn get_tenant_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> DatabaseResult<Option<Tenant>> {
        Ok(self
            .lock()
            .tenants
            .values()
            .find(|t| t.credential_fingerprint == fingerprint)
            .cloned())
    }

    async fn list_tenants(&self) -> DatabaseResult<Vec<Tenant>> {
        let mut tenants: Vec<Tenant> = self.lock().tenants.values().cloned().collect();
        tenants.sort_by_key(|t| t.created_at);
        Ok(tenants)
    }

    async fn rotate_tenant_credential(
        &self,
        tenant_id: &Uuid,
        new_fingerprint: &str,
    ) -> DatabaseResult<bool> {
        let mut state = self.lock();
        match state.tenants.get_mut(tenant_id) {
            Some(tenant) => {
                tenant.credential_fingerprint = new_fingerprint.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_tenant(&self, tenant_id: &Uuid) -> DatabaseResult<bool> {
        let mut state = self.lock();
        let existed = state.tenants.remove(tenant_id).is_some();
        state.documents.retain(|_, d| d.tenant_id != *tenant_id);
        state.chunks.retain(|_, c| c.tenant_id != *tenant_id);
        state.jobs.retain(|_, j| j.tenant_id != *tenant_id);
        Ok(existed)
    }

    async fn insert_document(&self, doc: NewDocument) -> DatabaseResult<Document> {
        let now = Utc::now();
        let document = Document {
            document_id: doc.document_id,
            tenant_id: doc.tenant_id,
            filename: doc.filename,
            blob_path: doc.blob_path,
            size_bytes: doc.size_bytes,
            status: DocumentStatus::Pending,
            metadata: doc.metadata,
            failed_deletion: false,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.lock()
            .documents
            .insert(document.document_id, document.clone());
        Ok(document)
    }

    async fn get_document(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<Option<Document>> {
        Ok(self
            .lock()
            .documents
            .get(document_id)
            .filter(|d| d.tenant_id == *tenant_id)
            .cloned())
    }

    async fn get_document_any_tenant(
        &self,
        document_id: &Uuid,
    ) -> DatabaseResult<Option<Document>> {
        Ok(self.lock().documents.get(document_id).cloned())
    }

    async fn list_documents(
        &self,
        tenant_id: Option<&Uuid>,
        limit: i64,
    ) -> DatabaseResult<Vec<Document>> {
        let state = self.lock();
        let mut docs: Vec<Document> = state
            .documents
            .values()
            .filter(|d| tenant_id.is_none_or(|tid| d.tenant_id == *tid))
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        docs.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(docs)
    }

    async fn advance_document_status(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
    ) -> DatabaseResult<bool> {
        let mut state = self.lock();
        match state
            .documents
            .get_mut(document_id)
            .filter(|d| d.tenant_id == *tenant_id && d.status == from)
        {
            Some(doc) => {
                doc.status = to;
                doc.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_document_failed(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
        error: &str,
    ) -> DatabaseResult<bool> {
        let mut state = self.lock();
        match state
            .documents
            .get_mut(document_id)
            .filter(|d| d.tenant_id == *tenant_id && !d.status.is_terminal())
        {
            Some(doc) => {
                doc.status = DocumentStatus::Failed;
                doc.error_message = Some(error.to_string());
                doc.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_failed_deletion(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<()> {
        let mut state = self.lock();
        if let Some(doc) = state
            .documents
            .get_mut(document_id)
            .filter(|d| d.tenant_id == *tenant_id)
        {
            doc.failed_deletion = true;
            doc.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn delete_document_row(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<bool> {
        let mut state = self.lock();
        let matches = state
            .documents
            .get(document_id)
            .is_some_and(|d| d.tenant_id == *tenant_id);
        if matches {
            state.documents.remove(document_id);
        }
        Ok(matches)
    }

    async fn tenant_metrics(&self, tenant_id: &Uuid) -> DatabaseResult<TenantMetrics> {
        let state = self.lock();
        let docs: Vec<&Document> = state
            .documents
            .values()
            .filter(|d| d.tenant_id == *tenant_id)
            .collect();
        Ok(TenantMetrics {
            documents_total: docs.len() as i64,
            documents_completed: docs
                .iter()
                .filter(|d| d.status == DocumentStatus::Completed)
                .count() as i64,
            documents_failed: docs
                .iter()
                .filter(|d| d.status == DocumentStatus::Failed)
                .count() as i64,
            chunks_total: state
                .chunks
                .values()
                .filter(|c| c.tenant_id == *tenant_id)
                .count() as i64,
            bytes_total: docs.iter().map(|d| d.size_bytes).sum(),
            last_upload_at: docs.iter().map(|d| d.created_at).max(),
        })
    }

    async fn service_stats(&self) -> DatabaseResult<ServiceStats> {
        let state = self.lock();
        let job_count =
            |status: JobStatus| state.jobs.values().filter(|j| j.status == status).count() as i64;
        Ok(ServiceStats {
            tenants: state.tenants.len() as i64,
            documents: state.documents.len() as i64,
            chunks: state.chunks.len() as i64,
            jobs_pending: job_count(JobStatus::Pending),
            jobs_processing: job_count(JobStatus::Processing),
            jobs_completed: job_count(JobStatus::Completed),
            jobs_dead: job_count(JobStatus::Dead),
        })
    }

    async fn insert_chunks(&self, chunks: &[Chunk]) -> DatabaseResult<()> {
        let mut state = self.lock();
        for chunk in chunks {
            state.chunks.entry(chunk.chunk_id).or_insert(chunk.clone());
        }
        Ok(())
    }

    async fn get_chunks(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<Vec<Chunk>> {
        let state = self.lock();
        let mut chunks: Vec<Chunk> = state
            .chunks
            .values()
            .filter(|c| c.tenant_id == *tenant_id && c.document_id == *document_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn get_chunks_by_ids(
        &self,
        tenant_id: &Uuid,
        chunk_ids: &[Uuid],
    ) -> DatabaseResult<Vec<Chunk>> {
        let state = self.lock();
        let mut chunks: Vec<Chunk> = chunk_ids
            .iter()
            .filter_map(|id| state.chunks.get(id))
            .filter(|c| c.tenant_id == *tenant_id)
            .cloned()
            .collect();
        chunks.sort_by_key(|c| c.chunk_index);
        Ok(chunks)
    }

    async fn set_vector_snapshot_path(
        &self,
        tenant_id: &Uuid,
        chunk_ids: &[Uuid],
        snapshot_path: &str,
    ) -> DatabaseResult<()> {
        let mut state = self.lock();
        for id in chunk_ids {
            if let Some(chunk) = state
                .chunks
                .get_mut(id)
                .filter(|c| c.tenant_id == *tenant_id)
            {
                chunk.vector_snapshot_path = Some(snapshot_path.to_string());
            }
        }
        Ok(())
    }

    async fn all_chunks_embedded(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<bool> {
        let state = self.lock();
        Ok(state
            .chunks
            .values()
            .filter(|c| c.tenant_id == *tenant_id && c.document_id == *document_id)
            .all(|c| c.vector_snapshot_path.is_some()))
    }

    async fn delete_chunks(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<u64> {
        let mut state = self.lock();
        let before = state.chunks.len();
        state
            .chunks
            .retain(|_, c| !(c.tenant_id == *tenant_id && c.document_id == *document_id));
        Ok((before - state.chunks.len()) as u64)
    }

    async fn create_job(&self, job: NewJob) -> DatabaseResult<Job> {
        let now = Utc::now();
        let job = Job {
            job_id: job.job_id,
            tenant_id: job.tenant_id,
            document_id: job.document_id,
            stage: job.payload.stage(),
            status: JobStatus::Pending,
            payload: job.payload,
            retry_count: 0,
            max_retries: job.max_retries,
            error_message: None,
            created_at: now,
            updated_at: now,
        };
        self.lock().jobs.insert(job.job_id, job.clone());
        Ok(job)
    }

    async fn get_job(&self, job_id: &Uuid) -> DatabaseResult<Option<Job>> {
        Ok(self.lock().jobs.get(job_id).cloned())
    }

    async fn claim_job(&self, job_id: &Uuid) -> DatabaseResult<Option<Job>> {
        let mut state = self.lock();
        match state
            .jobs
            .get_mut(job_id)
            .filter(|j| j.status == JobStatus::Pending)
        {
            Some(job) => {
                job.status = JobStatus::Processing;
                job.updated_at = Utc::now();
                Ok(Some(job.clone()))
            }
            None => Ok(None),
        }
    }

    async fn complete_job(&self, job_id: &Uuid) -> DatabaseResult<()> {
        let mut state = self.lock();
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.status = JobStatus::Completed;
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete_job_and_advance(
        &self,
        job_id: &Uuid,
        tenant_id: &Uuid,
        document_id: &Uuid,
        from: DocumentStatus,
        to: DocumentStatus,
        next_jobs: Vec<NewJob>,
    ) -> DatabaseResult<Vec<Job>> {
        self.complete_job(job_id).await?;
        self.advance_document_status(tenant_id, document_id, from, to)
            .await?;
        let mut created = Vec::with_capacity(next_jobs.len());
        for job in next_jobs {
            created.push(self.create_job(job).await?);
        }
        Ok(created)
    }

    async fn release_job_for_retry(&self, job_id: &Uuid, error: &str) -> DatabaseResult<i32> {
        let mut state = self.lock();
        match state
            .jobs
            .get_mut(job_id)
            .filter(|j| j.status == JobStatus::Processing)
        {
            Some(job) => {
                job.status = JobStatus::Pending;
                job.retry_count += 1;
                job.error_message = Some(error.to_string());
                job.updated_at = Utc::now();
                Ok(job.retry_count)
            }
            None => Ok(0),
        }
    }

    async fn mark_job_dead(&self, job_id: &Uuid, error: &str) -> DatabaseResult<()> {
        let mut state = self.lock();
        if let Some(job) = state.jobs.get_mut(job_id) {
            job.status = JobStatus::Dead;
            job.error_message = Some(error.to_string());
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn reset_stale_processing_jobs(
        &self,
        cutoff: chrono::DateTime<Utc>,
    ) -> DatabaseResult<Vec<Job>> {
        let mut state = self.lock();
        let mut reset = Vec::new();
        for job in state.jobs.values_mut() {
            if job.status == JobStatus::Processing && job.updated_at < cutoff {
                job.status = JobStatus::Pending;
                job.updated_at = Utc::now();
                reset.push(job.clone());
            }
        }
        Ok(reset)
    }

    async fn jobs_for_document(
        &self,
        tenant_id: &Uuid,
        document_id: &Uuid,
    ) -> DatabaseResult<Vec<Job>> {
        let state = self.lock();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|j| j.tenant_id == *tenant_id && j.document_id == *document_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn delete_jobs(&self, tenant_id: &Uuid, document_id: &Uuid) -> DatabaseResult<u64> {
        let mut state = self.lock();
        let before = state.jobs.len();
        state
            .jobs
            .retain(|_, j| !(j.tenant_id == *tenant_id && j.document_id == *document_id));
        Ok((before - state.jobs.len()) as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::models::JobPayload;

    fn new_doc(tenant_id: Uuid) -> NewDocument {
        let document_id = Uuid::new_v4();
        NewDocument {
            document_id,
            tenant_id,
            filename: "report.txt".to_string(),
            blob_path: format!("raw/{document_id}/report.txt"),
            size_bytes: 42,
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn document_status_never_regresses() {
        let repo = MockMetaRepository::new();
        let tenant = repo.create_tenant("acme", "fp-1", 60).await.unwrap();
        let doc = repo.insert_document(new_doc(tenant.tenant_id)).await.unwrap();

        assert!(
            repo.advance_document_status(
                &tenant.tenant_id,
                &doc.document_id,
                DocumentStatus::Pending,
                DocumentStatus::Extracting,
            )
            .await
            .unwrap()
        );

        // A replayed transition out of the old state must be a no-op
        assert!(
            !repo
                .advance_document_status(
                    &tenant.tenant_id,
                    &doc.document_id,
                    DocumentStatus::Pending,
                    DocumentStatus::Extracting,
                )
                .await
                .unwrap()
        );

        let current = repo
            .get_document(&tenant.tenant_id, &doc.document_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.status, DocumentStatus::Extracting);
    }

    #[tokio::test]
    async fn claim_job_is_a_lease_fence() {
        let repo = MockMetaRepository::new();
        let tenant = repo.create_tenant("acme", "fp-2", 60).await.unwrap();
        let doc = repo.insert_document(new_doc(tenant.tenant_id)).await.unwrap();

        let job = repo
            .create_job(NewJob {
                job_id: Uuid::new_v4(),
                tenant_id: tenant.tenant_id,
                document_id: doc.document_id,
                payload: JobPayload::Extract {
                    blob_path: doc.blob_path.clone(),
                    correlation_id: Uuid::new_v4(),
                },
                max_retries: 3,
            })
            .await
            .unwrap();

        assert!(repo.claim_job(&job.job_id).await.unwrap().is_some());
        // Second claim loses the fence
        assert!(repo.claim_job(&job.job_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn tenant_filter_hides_foreign_documents() {
        let repo = MockMetaRepository::new();
        let a = repo.create_tenant("a", "fp-a", 60).await.unwrap();
        let b = repo.create_tenant("b", "fp-b", 60).await.unwrap();
        let doc = repo.insert_document(new_doc(a.tenant_id)).await.unwrap();

        assert!(
            repo.get_document(&b.tenant_id, &doc.document_id)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            repo.get_document(&a.tenant_id, &doc.document_id)
                .await
                .unwrap()
                .is_some()
        );
    }
}
