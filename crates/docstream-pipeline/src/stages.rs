//! The three pipeline stages
//!
//! Each stage function takes a claimed job (the caller already won the
//! lease fence) and either finishes it - completing the job, advancing the
//! document, and enqueueing the successor stage - or returns an error for
//! the retry policy to classify.
//!
//! Stage ordering per document is enforced structurally: a stage enqueues
//! its successor only from its own success path.

use bytes::Bytes;
use uuid::Uuid;

use docstream_blob::{BlobStore, decode_snapshot, encode_snapshot};
use docstream_meta_data::{
    Chunk, Document, DocumentStatus, Job, JobPayload, NewJob, deterministic_chunk_id,
};
use docstream_queue::now_score;
use docstream_vector_data::{VectorPayload, VectorPoint};
use tracing::{debug, info};

use crate::context::PipelineContext;
use crate::error::{PipelineError, PipelineResult};

/// Fetch the job's document, or None when it was deleted out from under
/// the pipeline. Callers short-circuit the job as dead in that case.
async fn load_document(ctx: &PipelineContext, job: &Job) -> PipelineResult<Option<Document>> {
    Ok(ctx
        .repository
        .get_document(&job.tenant_id, &job.document_id)
        .await?)
}

/// Mark a job whose document vanished mid-pipeline. Not an error: the
/// cascade already removed the rest of the document's state.
async fn short_circuit_deleted(ctx: &PipelineContext, job: &Job) -> PipelineResult<()> {
    info!(job_id = %job.job_id, document_id = %job.document_id,
        "document no longer exists, dead-lettering job");
    ctx.repository
        .mark_job_dead(&job.job_id, "document no longer exists")
        .await?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Extract
// ---------------------------------------------------------------------------

/// Extract stage: raw bytes -> UTF-8 text in the blob store
#[tracing::instrument(skip(ctx, job), fields(job_id = %job.job_id, document_id = %job.document_id, correlation_id = %job.payload.correlation_id()))]
pub async fn run_extract(ctx: &PipelineContext, job: &Job) -> PipelineResult<()> {
    let JobPayload::Extract {
        blob_path,
        correlation_id,
    } = &job.payload
    else {
        return Err(PipelineError::InvalidJob(format!(
            "extract job {} carries a {} payload",
            job.job_id,
            job.payload.stage()
        )));
    };

    let Some(document) = load_document(ctx, job).await? else {
        return short_circuit_deleted(ctx, job).await;
    };

    // First attempt moves the document out of pending; on a retry the
    // transition is already done and the guarded update is a no-op.
    ctx.repository
        .advance_document_status(
            &job.tenant_id,
            &job.document_id,
            DocumentStatus::Pending,
            DocumentStatus::Extracting,
        )
        .await?;

    let bytes = ctx.blob.get(&blob_path.as_str().into()).await?;

    // Extraction is CPU-bound; run it off the async workers.
    let extractor = std::sync::Arc::clone(&ctx.extractor);
    let filename = document.filename.clone();
    let text = tokio::task::spawn_blocking(move || extractor.extract(&bytes, &filename))
        .await
        .map_err(|e| PipelineError::InvalidJob(format!("extractor task panicked: {e}")))??;

    let text_path = BlobStore::extracted_path(&job.document_id);
    ctx.blob.put(&text_path, Bytes::from(text)).await?;

    let chunk_job = NewJob {
        job_id: Uuid::new_v4(),
        tenant_id: job.tenant_id,
        document_id: job.document_id,
        payload: JobPayload::Chunk {
            text_path: text_path.to_string(),
            correlation_id: *correlation_id,
        },
        max_retries: ctx.max_retries,
    };

    let created = ctx
        .repository
        .complete_job_and_advance(
            &job.job_id,
            &job.tenant_id,
            &job.document_id,
            DocumentStatus::Extracting,
            DocumentStatus::Chunking,
            vec![chunk_job],
        )
        .await?;

    for next in &created {
        ctx.queue
            .enqueue(next.tenant_id, next.stage, next.job_id, now_score())
            .await?;
    }

    debug!(document_id = %job.document_id, "extraction complete, chunk stage enqueued");
    Ok(())
}

// ---------------------------------------------------------------------------
// Chunk
// ---------------------------------------------------------------------------

/// Chunk stage: extracted text -> chunk rows + embed jobs
#[tracing::instrument(skip(ctx, job), fields(job_id = %job.job_id, document_id = %job.document_id, correlation_id = %job.payload.correlation_id()))]
pub async fn run_chunk(ctx: &PipelineContext, job: &Job) -> PipelineResult<()> {
    let JobPayload::Chunk {
        text_path,
        correlation_id,
    } = &job.payload
    else {
        return Err(PipelineError::InvalidJob(format!(
            "chunk job {} carries a {} payload",
            job.job_id,
            job.payload.stage()
        )));
    };

    let Some(document) = load_document(ctx, job).await? else {
        return short_circuit_deleted(ctx, job).await;
    };

    let bytes = ctx.blob.get(&text_path.as_str().into()).await?;
    let text = String::from_utf8_lossy(&bytes);

    let pieces = ctx.chunker.chunk(&text);

    // Empty text produces zero chunks; nothing to embed, so the document
    // is already done.
    if pieces.is_empty() {
        ctx.repository
            .complete_job_and_advance(
                &job.job_id,
                &job.tenant_id,
                &job.document_id,
                DocumentStatus::Chunking,
                DocumentStatus::Completed,
                Vec::new(),
            )
            .await?;
        info!(document_id = %job.document_id, "empty document completed without chunks");
        return Ok(());
    }

    // Deterministic chunk ids make a replay of this stage converge instead
    // of duplicating rows.
    let chunks: Vec<Chunk> = pieces
        .iter()
        .map(|piece| Chunk {
            chunk_id: deterministic_chunk_id(&job.document_id, piece.index as i32),
            document_id: job.document_id,
            tenant_id: job.tenant_id,
            chunk_index: piece.index as i32,
            text: piece.text.clone(),
            vector_snapshot_path: None,
            metadata: document.metadata.clone(),
        })
        .collect();

    ctx.repository.insert_chunks(&chunks).await?;

    let embed_jobs: Vec<NewJob> = chunks
        .chunks(ctx.embed_batch_size.max(1))
        .map(|batch| NewJob {
            job_id: Uuid::new_v4(),
            tenant_id: job.tenant_id,
            document_id: job.document_id,
            payload: JobPayload::Embed {
                chunk_ids: batch.iter().map(|c| c.chunk_id).collect(),
                correlation_id: *correlation_id,
            },
            max_retries: ctx.max_retries,
        })
        .collect();

    let created = ctx
        .repository
        .complete_job_and_advance(
            &job.job_id,
            &job.tenant_id,
            &job.document_id,
            DocumentStatus::Chunking,
            DocumentStatus::Embedding,
            embed_jobs,
        )
        .await?;

    for next in &created {
        ctx.queue
            .enqueue(next.tenant_id, next.stage, next.job_id, now_score())
            .await?;
    }

    info!(
        document_id = %job.document_id,
        chunk_count = chunks.len(),
        embed_jobs = created.len(),
        "chunking complete"
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// Embed
// ---------------------------------------------------------------------------

/// Embed stage: chunk texts -> snapshot checkpoint -> vector index
#[tracing::instrument(skip(ctx, job), fields(job_id = %job.job_id, document_id = %job.document_id, correlation_id = %job.payload.correlation_id()))]
pub async fn run_embed(ctx: &PipelineContext, job: &Job) -> PipelineResult<()> {
    let JobPayload::Embed {
        chunk_ids,
        correlation_id,
    } = &job.payload
    else {
        return Err(PipelineError::InvalidJob(format!(
            "embed job {} carries a {} payload",
            job.job_id,
            job.payload.stage()
        )));
    };

    let Some(document) = load_document(ctx, job).await? else {
        return short_circuit_deleted(ctx, job).await;
    };

    let chunks = ctx
        .repository
        .get_chunks_by_ids(&job.tenant_id, chunk_ids)
        .await?;
    if chunks.len() != chunk_ids.len() {
        return Err(PipelineError::InvalidJob(format!(
            "embed job {} references {} chunks but {} exist",
            job.job_id,
            chunk_ids.len(),
            chunks.len()
        )));
    }

    let snapshot_path = BlobStore::snapshot_path(&job.job_id);

    // Checkpoint-or-replay: a retry that crashed after the snapshot was
    // written reuses it instead of calling the embedder again.
    let entries: Vec<(Uuid, Vec<f32>)> = if ctx.blob.exists(&snapshot_path).await? {
        debug!(job_id = %job.job_id, "reusing vector snapshot from prior attempt");
        decode_snapshot(ctx.blob.get(&snapshot_path).await?)?
    } else {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let vectors = ctx.embedder.generate_embeddings(texts).await?;

        let entries: Vec<(Uuid, Vec<f32>)> = chunks
            .iter()
            .map(|c| c.chunk_id)
            .zip(vectors)
            .collect();

        ctx.blob
            .put(&snapshot_path, encode_snapshot(&entries)?)
            .await?;
        entries
    };

    // Pair vectors to chunks by id, not position: a snapshot from a prior
    // attempt is authoritative regardless of row ordering.
    let vectors_by_chunk: std::collections::HashMap<Uuid, &Vec<f32>> =
        entries.iter().map(|(id, vector)| (*id, vector)).collect();
    let mut points = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        let vector = vectors_by_chunk.get(&chunk.chunk_id).ok_or_else(|| {
            PipelineError::Blob(docstream_blob::BlobError::CorruptSnapshot(format!(
                "snapshot for job {} is missing chunk {}",
                job.job_id, chunk.chunk_id
            )))
        })?;
        points.push(VectorPoint {
            chunk_id: chunk.chunk_id,
            vector: (*vector).clone(),
            payload: VectorPayload {
                tenant_id: chunk.tenant_id,
                document_id: chunk.document_id,
                chunk_id: chunk.chunk_id,
                filename: document.filename.clone(),
                chunk_index: chunk.chunk_index,
                text: chunk.text.clone(),
                metadata: chunk.metadata.clone(),
            },
        });
    }

    ctx.vector_index
        .upsert_points(&points, &(*correlation_id).into())
        .await?;

    ctx.repository
        .set_vector_snapshot_path(&job.tenant_id, chunk_ids, snapshot_path.as_ref())
        .await?;

    // Last embed job over the finish line flips the document; the guarded
    // transition means exactly one of the racers wins.
    if ctx
        .repository
        .all_chunks_embedded(&job.tenant_id, &job.document_id)
        .await?
    {
        ctx.repository
            .advance_document_status(
                &job.tenant_id,
                &job.document_id,
                DocumentStatus::Embedding,
                DocumentStatus::Completed,
            )
            .await?;
    }

    ctx.repository.complete_job(&job.job_id).await?;

    info!(
        document_id = %job.document_id,
        points = points.len(),
        "embed batch stored"
    );
    Ok(())
}

/// Dispatch a claimed job to its stage function
pub async fn run_stage(ctx: &PipelineContext, job: &Job) -> PipelineResult<()> {
    match job.payload.stage() {
        docstream_meta_data::Stage::Extract => run_extract(ctx, job).await,
        docstream_meta_data::Stage::Chunk => run_chunk(ctx, job).await,
        docstream_meta_data::Stage::Embed => run_embed(ctx, job).await,
    }
}
