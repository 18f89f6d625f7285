//! Cascading document deletion
//!
//! Cross-store and best-effort-ordered: vectors first, then chunk rows,
//! then queue entries and job rows, then blob objects, and the document
//! row last. An interrupted delete leaves only discoverable orphans behind
//! the surviving document row, which is flagged for the reconciler.

use uuid::Uuid;

use docstream_blob::BlobStore;
use docstream_meta_data::Stage;
use tracing::{info, warn};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

/// Truthful counts from a completed cascade
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct DeleteOutcome {
    pub chunks_deleted: u64,
    pub vectors_deleted: u64,
}

/// Cascading delete over the metadata store, vector index, queue, and blobs
#[derive(Clone)]
pub struct DeleteService {
    ctx: PipelineContext,
}

impl DeleteService {
    pub const fn new(ctx: PipelineContext) -> Self {
        Self { ctx }
    }

    /// Delete a document and everything derived from it. Returns None when
    /// the document is not visible to this tenant.
    ///
    /// # Errors
    ///
    /// Returns an error when a step fails; the document row is then marked
    /// `failed_deletion` and retained so the cascade can be retried.
    #[tracing::instrument(skip(self), fields(%tenant_id, %document_id))]
    pub async fn delete_document(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> PipelineResult<Option<DeleteOutcome>> {
        let Some(document) = self
            .ctx
            .repository
            .get_document(&tenant_id, &document_id)
            .await?
        else {
            return Ok(None);
        };

        match self.cascade(tenant_id, &document).await {
            Ok(outcome) => {
                info!(
                    chunks = outcome.chunks_deleted,
                    vectors = outcome.vectors_deleted,
                    "document deleted"
                );
                Ok(Some(outcome))
            }
            Err(e) => {
                warn!("cascade interrupted, marking for reconciler: {e}");
                self.ctx
                    .repository
                    .mark_failed_deletion(&tenant_id, &document_id)
                    .await?;
                Err(e)
            }
        }
    }

    async fn cascade(
        &self,
        tenant_id: Uuid,
        document: &docstream_meta_data::Document,
    ) -> PipelineResult<DeleteOutcome> {
        let document_id = document.document_id;

        // 1. Vector points by document filter
        let vectors_deleted = self
            .ctx
            .vector_index
            .delete_by_document(tenant_id, document_id)
            .await?;

        // 2. Chunk rows
        let chunks_deleted = self
            .ctx
            .repository
            .delete_chunks(&tenant_id, &document_id)
            .await?;

        // 3. Queue entries, then job rows. Removing queue entries first
        // means no worker can claim a job we are about to delete; a worker
        // already holding one short-circuits when the document is gone.
        let jobs = self
            .ctx
            .repository
            .jobs_for_document(&tenant_id, &document_id)
            .await?;
        let job_ids: Vec<Uuid> = jobs.iter().map(|j| j.job_id).collect();
        self.ctx.queue.remove_jobs(&job_ids).await.map_err(PipelineError::Queue)?;
        self.ctx
            .repository
            .delete_jobs(&tenant_id, &document_id)
            .await?;

        // 4. Blob objects: raw upload, extracted text, every embed snapshot
        self.ctx
            .blob
            .delete(&document.blob_path.as_str().into())
            .await?;
        self.ctx
            .blob
            .delete(&BlobStore::extracted_path(&document_id))
            .await?;
        for job in jobs.iter().filter(|j| j.stage == Stage::Embed) {
            self.ctx
                .blob
                .delete(&BlobStore::snapshot_path(&job.job_id))
                .await?;
        }

        // 5. The document row goes last so an interrupted cascade stays
        // discoverable.
        self.ctx
            .repository
            .delete_document_row(&tenant_id, &document_id)
            .await?;

        Ok(DeleteOutcome {
            chunks_deleted,
            vectors_deleted,
        })
    }
}
