//! Upload admission and status reporting
//!
//! The dispatcher side of the pipeline: store the raw bytes, register the
//! document, and enqueue the initial extract job. Everything downstream is
//! driven by the workers.

use bytes::Bytes;
use uuid::Uuid;

use docstream_blob::BlobStore;
use docstream_common::CorrelationId;
use docstream_meta_data::{
    Document, Job, JobPayload, JobStatus, NewDocument, NewJob, Stage,
};
use docstream_queue::now_score;
use tracing::info;

use crate::context::PipelineContext;
use crate::error::PipelineResult;

/// An accepted upload, already validated by the API surface
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub filename: String,
    pub bytes: Bytes,
    pub metadata: serde_json::Value,
}

/// Per-stage rollup for a document's status report
#[derive(Debug, Clone, serde::Serialize)]
pub struct StageReport {
    pub stage: Stage,
    /// Aggregate over the stage's jobs; None when the stage has none yet
    pub status: Option<JobStatus>,
    pub jobs: usize,
}

/// Full status of a document: the row plus its per-stage job rollups
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub document: Document,
    pub stages: Vec<StageReport>,
}

/// Aggregate a stage's jobs into one reportable status
fn rollup(jobs: &[&Job]) -> Option<JobStatus> {
    if jobs.is_empty() {
        return None;
    }
    if jobs.iter().any(|j| j.status == JobStatus::Dead) {
        return Some(JobStatus::Dead);
    }
    if jobs.iter().any(|j| j.status == JobStatus::Failed) {
        return Some(JobStatus::Failed);
    }
    if jobs.iter().any(|j| j.status == JobStatus::Processing) {
        return Some(JobStatus::Processing);
    }
    if jobs.iter().any(|j| j.status == JobStatus::Pending) {
        return Some(JobStatus::Pending);
    }
    Some(JobStatus::Completed)
}

/// Dispatcher: admits uploads into the pipeline and answers status queries
#[derive(Clone)]
pub struct IngestService {
    ctx: PipelineContext,
}

impl IngestService {
    pub const fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Admit one upload: blob write, document row, initial extract job,
    /// queue entry. Returns the pending document.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the underlying stores fail; no job is
    /// enqueued in that case.
    #[tracing::instrument(skip(self, upload), fields(%tenant_id, filename = %upload.filename, size = upload.bytes.len()))]
    pub async fn ingest(
        &self,
        tenant_id: Uuid,
        upload: UploadRequest,
    ) -> PipelineResult<Document> {
        let document_id = Uuid::new_v4();
        let correlation_id = CorrelationId::new();
        let blob_path = BlobStore::raw_path(&document_id, &upload.filename);

        self.ctx.blob.put(&blob_path, upload.bytes.clone()).await?;

        let document = self
            .ctx
            .repository
            .insert_document(NewDocument {
                document_id,
                tenant_id,
                filename: upload.filename.clone(),
                blob_path: blob_path.to_string(),
                size_bytes: upload.bytes.len() as i64,
                metadata: upload.metadata,
            })
            .await?;

        let job = self
            .ctx
            .repository
            .create_job(NewJob {
                job_id: Uuid::new_v4(),
                tenant_id,
                document_id,
                payload: JobPayload::Extract {
                    blob_path: blob_path.to_string(),
                    correlation_id: correlation_id.as_uuid(),
                },
                max_retries: self.ctx.max_retries,
            })
            .await?;

        // Tenant-visible priority defaults to the insertion epoch.
        self.ctx
            .queue
            .enqueue(tenant_id, Stage::Extract, job.job_id, now_score())
            .await?;

        info!(
            %correlation_id,
            %document_id,
            job_id = %job.job_id,
            "upload admitted into pipeline"
        );
        Ok(document)
    }

    /// Status of a document and each pipeline stage, tenant-scoped
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata store fails.
    pub async fn document_status(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> PipelineResult<Option<StatusReport>> {
        let Some(document) = self
            .ctx
            .repository
            .get_document(&tenant_id, &document_id)
            .await?
        else {
            return Ok(None);
        };

        let jobs = self
            .ctx
            .repository
            .jobs_for_document(&tenant_id, &document_id)
            .await?;

        let stages = Stage::ALL
            .iter()
            .map(|stage| {
                let stage_jobs: Vec<&Job> = jobs.iter().filter(|j| j.stage == *stage).collect();
                StageReport {
                    stage: *stage,
                    status: rollup(&stage_jobs),
                    jobs: stage_jobs.len(),
                }
            })
            .collect();

        Ok(Some(StatusReport { document, stages }))
    }
}
