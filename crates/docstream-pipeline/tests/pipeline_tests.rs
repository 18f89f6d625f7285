//! End-to-end pipeline tests over in-memory backends
//!
//! Drives real stage code (extract -> chunk -> embed) against the mock
//! repository, in-memory queue, in-memory blob store, deterministic mock
//! embedder, and in-memory vector index.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use uuid::Uuid;

use docstream_blob::BlobStore;
use docstream_chunking::{ChunkerConfig, SentenceChunker};
use docstream_embeddings::{DefaultEmbeddingService, MockEmbedder};
use docstream_extract::{ExtractError, ExtractResult, Extractor, FormatDispatchExtractor};
use docstream_meta_data::{
    DocumentStatus, JobStatus, MetaRepository, MockMetaRepository, Stage,
};
use docstream_pipeline::{
    FailureOutcome, IngestService, PipelineContext, UploadRequest, handle_failure,
    stages::run_stage,
};
use docstream_queue::{InMemoryJobQueue, JobQueue};
use docstream_vector_data::{MockVectorIndex, VectorIndex};

/// Clock value far past any backoff-deferred score, so tests drain retry
/// entries without waiting out the real delays.
const DRAIN_CLOCK: f64 = 1e12;

const DIMENSION: usize = 16;

/// An extractor that fails transiently a fixed number of times
struct FlakyExtractor {
    remaining_failures: AtomicUsize,
    inner: FormatDispatchExtractor,
}

impl FlakyExtractor {
    fn new(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            inner: FormatDispatchExtractor::new(),
        }
    }
}

impl Extractor for FlakyExtractor {
    fn extract(&self, bytes: &[u8], filename: &str) -> ExtractResult<String> {
        let remaining = self.remaining_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.remaining_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ExtractError::Io("simulated blob read failure".to_string()));
        }
        self.inner.extract(bytes, filename)
    }
}

struct Harness {
    ctx: PipelineContext,
    ingest: IngestService,
    delete: docstream_pipeline::DeleteService,
    repository: Arc<MockMetaRepository>,
    queue: Arc<InMemoryJobQueue>,
    vectors: Arc<MockVectorIndex>,
    blob: BlobStore,
}

impl Harness {
    fn new(chunk_size: usize, overlap: usize, embed_batch: usize) -> Self {
        Self::with_extractor(
            chunk_size,
            overlap,
            embed_batch,
            Arc::new(FormatDispatchExtractor::new()),
        )
    }

    fn with_extractor(
        chunk_size: usize,
        overlap: usize,
        embed_batch: usize,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        let repository = Arc::new(MockMetaRepository::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let vectors = Arc::new(MockVectorIndex::new());
        let blob = BlobStore::in_memory();

        let ctx = PipelineContext {
            repository: Arc::clone(&repository) as Arc<dyn MetaRepository>,
            queue: Arc::clone(&queue) as Arc<dyn JobQueue>,
            blob: blob.clone(),
            extractor,
            chunker: SentenceChunker::new(ChunkerConfig {
                chunk_size,
                overlap,
            })
            .unwrap(),
            embedder: Arc::new(DefaultEmbeddingService::new(
                Arc::new(MockEmbedder::new(DIMENSION)),
                embed_batch.max(1),
            )),
            vector_index: Arc::clone(&vectors) as Arc<dyn VectorIndex>,
            embed_batch_size: embed_batch,
            max_retries: 3,
        };

        Self {
            ingest: IngestService::new(ctx.clone()),
            delete: docstream_pipeline::DeleteService::new(ctx.clone()),
            ctx,
            repository,
            queue,
            vectors,
            blob,
        }
    }

    async fn upload(&self, tenant_id: Uuid, filename: &str, content: &[u8]) -> Uuid {
        self.ingest
            .ingest(
                tenant_id,
                UploadRequest {
                    filename: filename.to_string(),
                    bytes: Bytes::copy_from_slice(content),
                    metadata: serde_json::json!({}),
                },
            )
            .await
            .unwrap()
            .document_id
    }

    /// Process one ready job at the given stage for a tenant, applying the
    /// failure policy on error. Returns false when nothing was ready.
    async fn step(&self, tenant_id: Uuid, stage: Stage) -> bool {
        let Some(job_id) = self.queue.pop_min(tenant_id, stage, DRAIN_CLOCK).await.unwrap() else {
            return false;
        };
        let Some(job) = self.repository.claim_job(&job_id).await.unwrap() else {
            return true;
        };
        if let Err(failure) = run_stage(&self.ctx, &job).await {
            handle_failure(&self.ctx, &job, &failure).await.unwrap();
        }
        true
    }

    /// Drain every queue across all stages, retries included
    async fn drive(&self) {
        loop {
            let mut worked = false;
            for stage in Stage::ALL {
                loop {
                    let tenants = self
                        .queue
                        .list_active_tenants(stage, DRAIN_CLOCK)
                        .await
                        .unwrap();
                    if tenants.is_empty() {
                        break;
                    }
                    for tenant in tenants {
                        if self.step(tenant, stage).await {
                            worked = true;
                        }
                    }
                }
            }
            if !worked {
                break;
            }
        }
    }

    async fn tenant(&self, name: &str) -> Uuid {
        self.repository
            .create_tenant(name, &format!("fp-{name}"), 60)
            .await
            .unwrap()
            .tenant_id
    }
}

// ---------------------------------------------------------------------------
// Scenario: single plain-text upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn single_upload_flows_to_completion_with_sentence_chunks() {
    // Sentence-aware breaks: each sentence closes its own chunk even
    // though the whole text fits inside one window
    let harness = Harness::new(10, 2, 100);
    let tenant = harness.tenant("acme").await;

    let document_id = harness.upload(tenant, "hello.txt", b"one. two. three.").await;
    harness.drive().await;

    let document = harness
        .repository
        .get_document(&tenant, &document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);

    let chunks = harness
        .repository
        .get_chunks(&tenant, &document_id)
        .await
        .unwrap();
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    assert_eq!(texts, ["one.", "two.", "three."]);

    // Every chunk carries its snapshot checkpoint
    assert!(chunks.iter().all(|c| c.vector_snapshot_path.is_some()));

    // Three points, all tagged with the uploading tenant
    let points = harness.vectors.all_points();
    assert_eq!(points.len(), 3);
    assert!(points.iter().all(|p| p.payload.tenant_id == tenant));
}

#[tokio::test]
async fn chunk_indexes_are_contiguous_from_zero() {
    let harness = Harness::new(4, 1, 2);
    let tenant = harness.tenant("acme").await;

    let text = b"alpha beta gamma. delta epsilon zeta eta theta. iota kappa lambda mu";
    let document_id = harness.upload(tenant, "words.txt", text).await;
    harness.drive().await;

    let chunks = harness
        .repository
        .get_chunks(&tenant, &document_id)
        .await
        .unwrap();
    assert!(!chunks.is_empty());
    for (i, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.chunk_index, i as i32);
    }
}

#[tokio::test]
async fn empty_document_completes_without_chunks() {
    let harness = Harness::new(512, 50, 100);
    let tenant = harness.tenant("acme").await;

    let document_id = harness.upload(tenant, "empty.txt", b"   \n  ").await;
    harness.drive().await;

    let document = harness
        .repository
        .get_document(&tenant, &document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);
    assert!(
        harness
            .repository
            .get_chunks(&tenant, &document_id)
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(harness.vectors.count().await.unwrap(), 0);

    // No embed stage was ever created
    let jobs = harness
        .repository
        .jobs_for_document(&tenant, &document_id)
        .await
        .unwrap();
    assert!(jobs.iter().all(|j| j.stage != Stage::Embed));
}

// ---------------------------------------------------------------------------
// Scenario: stage ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stages_run_in_order_per_document() {
    let harness = Harness::new(2, 0, 1);
    let tenant = harness.tenant("acme").await;

    let document_id = harness
        .upload(tenant, "doc.txt", b"first sentence here. second sentence follows.")
        .await;
    harness.drive().await;

    let jobs = harness
        .repository
        .jobs_for_document(&tenant, &document_id)
        .await
        .unwrap();

    let extract = jobs.iter().find(|j| j.stage == Stage::Extract).unwrap();
    let chunk = jobs.iter().find(|j| j.stage == Stage::Chunk).unwrap();
    let embeds: Vec<_> = jobs.iter().filter(|j| j.stage == Stage::Embed).collect();

    assert_eq!(extract.status, JobStatus::Completed);
    assert_eq!(chunk.status, JobStatus::Completed);
    assert!(!embeds.is_empty());
    assert!(embeds.iter().all(|j| j.status == JobStatus::Completed));

    // Successor jobs only exist because their predecessor succeeded, and
    // are created no earlier than it.
    assert!(chunk.created_at >= extract.created_at);
    assert!(embeds.iter().all(|j| j.created_at >= chunk.created_at));
}

// ---------------------------------------------------------------------------
// Scenario: transient failure with backoff
// ---------------------------------------------------------------------------

#[tokio::test]
async fn transient_failures_retry_with_exponential_backoff_then_succeed() {
    let harness = Harness::with_extractor(1, 0, 100, Arc::new(FlakyExtractor::new(2)));
    let tenant = harness.tenant("acme").await;
    let document_id = harness.upload(tenant, "doc.txt", b"one. two.").await;

    // Attempt 1: fails, requeued with a 2s-deferred score
    let job_id = harness
        .queue
        .pop_min(tenant, Stage::Extract, DRAIN_CLOCK)
        .await
        .unwrap()
        .unwrap();
    let job = harness.repository.claim_job(&job_id).await.unwrap().unwrap();
    let failure = run_stage(&harness.ctx, &job).await.unwrap_err();
    assert_eq!(
        handle_failure(&harness.ctx, &job, &failure).await.unwrap(),
        FailureOutcome::Retried { retry_count: 1, delay_secs: 2 }
    );

    // Attempt 2: fails again, deferred 4s
    let job_id = harness
        .queue
        .pop_min(tenant, Stage::Extract, DRAIN_CLOCK)
        .await
        .unwrap()
        .unwrap();
    let job = harness.repository.claim_job(&job_id).await.unwrap().unwrap();
    let failure = run_stage(&harness.ctx, &job).await.unwrap_err();
    assert_eq!(
        handle_failure(&harness.ctx, &job, &failure).await.unwrap(),
        FailureOutcome::Retried { retry_count: 2, delay_secs: 4 }
    );

    // Attempt 3 succeeds; the rest of the pipeline drains normally
    harness.drive().await;

    let extract_job = harness
        .repository
        .get_job(&job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(extract_job.status, JobStatus::Completed);
    assert_eq!(extract_job.retry_count, 2);

    let document = harness
        .repository
        .get_document(&tenant, &document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);
}

#[tokio::test]
async fn retries_never_exceed_the_configured_bound() {
    // Extractor that never recovers
    let harness = Harness::with_extractor(1, 0, 100, Arc::new(FlakyExtractor::new(usize::MAX)));
    let tenant = harness.tenant("acme").await;
    let document_id = harness.upload(tenant, "doc.txt", b"text").await;

    harness.drive().await;

    let jobs = harness
        .repository
        .jobs_for_document(&tenant, &document_id)
        .await
        .unwrap();
    let extract = jobs.iter().find(|j| j.stage == Stage::Extract).unwrap();
    assert_eq!(extract.status, JobStatus::Dead);
    assert_eq!(extract.retry_count, extract.max_retries);

    let document = harness
        .repository
        .get_document(&tenant, &document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Failed);
}

// ---------------------------------------------------------------------------
// Scenario: permanent failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn corrupt_pdf_dead_letters_without_retry() {
    let harness = Harness::new(512, 50, 100);
    let tenant = harness.tenant("acme").await;

    let document_id = harness
        .upload(tenant, "broken.pdf", b"this is not a pdf at all")
        .await;
    harness.drive().await;

    let jobs = harness
        .repository
        .jobs_for_document(&tenant, &document_id)
        .await
        .unwrap();
    let extract = jobs.iter().find(|j| j.stage == Stage::Extract).unwrap();
    assert_eq!(extract.status, JobStatus::Dead);
    assert_eq!(extract.retry_count, 0, "permanent errors skip retry");
    assert!(extract.error_message.as_deref().is_some_and(|m| !m.is_empty()));

    let document = harness
        .repository
        .get_document(&tenant, &document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Failed);
    assert!(document.error_message.is_some());

    // No successor stage was ever enqueued
    assert!(jobs.iter().all(|j| j.stage == Stage::Extract));
}

// ---------------------------------------------------------------------------
// Scenario: fairness under bulk upload
// ---------------------------------------------------------------------------

#[tokio::test]
async fn newcomer_is_served_within_one_rotation_of_a_bulk_uploader() {
    use docstream_queue::{InFlightTracker, InMemoryRotationStore, Scheduler, TenantCaps};

    let harness = Harness::new(1, 0, 100);
    let a = harness.tenant("bulk").await;
    let b = harness.tenant("small").await;

    for i in 0..100 {
        harness
            .upload(a, &format!("bulk-{i}.txt"), b"text here.")
            .await;
    }
    harness.upload(b, "single.txt", b"just one.").await;

    let scheduler = Scheduler::new(
        Arc::clone(&harness.queue) as Arc<dyn JobQueue>,
        Arc::new(InMemoryRotationStore::new()),
        InFlightTracker::new(),
        TenantCaps::default(),
    );

    // With one extract worker, B starts no later than the second pick.
    let (first, _) = scheduler.next_job(Stage::Extract).await.unwrap().unwrap();
    let (second, _) = scheduler.next_job(Stage::Extract).await.unwrap().unwrap();
    assert!(first == b || second == b, "tenant B must not wait behind the bulk");
}

// ---------------------------------------------------------------------------
// Scenario: crash recovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stranded_processing_jobs_are_swept_back_to_pending() {
    let harness = Harness::new(10, 2, 100);
    let tenant = harness.tenant("acme").await;
    let document_id = harness.upload(tenant, "doc.txt", b"one. two. three.").await;

    // A worker claims the extract job, then dies without finishing it
    let job_id = harness
        .queue
        .pop_min(tenant, Stage::Extract, DRAIN_CLOCK)
        .await
        .unwrap()
        .unwrap();
    let claimed = harness.repository.claim_job(&job_id).await.unwrap().unwrap();
    assert_eq!(claimed.status, JobStatus::Processing);

    // Let the lease age past the (zero) staleness threshold
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let recovered = docstream_pipeline::recover_stale_jobs(&harness.ctx, 0)
        .await
        .unwrap();
    assert_eq!(recovered, 1);

    let job = harness.repository.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Pending);

    // The sweep re-enqueued it, so the pipeline finishes normally
    harness.drive().await;
    let document = harness
        .repository
        .get_document(&tenant, &document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(document.status, DocumentStatus::Completed);
}

#[tokio::test]
async fn live_leases_survive_the_sweep() {
    let harness = Harness::new(10, 2, 100);
    let tenant = harness.tenant("acme").await;
    harness.upload(tenant, "doc.txt", b"one.").await;

    let job_id = harness
        .queue
        .pop_min(tenant, Stage::Extract, DRAIN_CLOCK)
        .await
        .unwrap()
        .unwrap();
    harness.repository.claim_job(&job_id).await.unwrap().unwrap();

    // A generous staleness threshold leaves the fresh lease alone
    let recovered = docstream_pipeline::recover_stale_jobs(&harness.ctx, 3_600)
        .await
        .unwrap();
    assert_eq!(recovered, 0);

    let job = harness.repository.get_job(&job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Processing);
}

// ---------------------------------------------------------------------------
// Scenario: embed idempotence
// ---------------------------------------------------------------------------

#[tokio::test]
async fn replaying_a_completed_embed_job_changes_nothing() {
    let harness = Harness::new(1, 0, 100);
    let tenant = harness.tenant("acme").await;
    let document_id = harness.upload(tenant, "doc.txt", b"one. two. three.").await;
    harness.drive().await;

    let jobs = harness
        .repository
        .jobs_for_document(&tenant, &document_id)
        .await
        .unwrap();
    let embed = jobs.iter().find(|j| j.stage == Stage::Embed).unwrap();

    let points_before = {
        let mut points = harness.vectors.all_points();
        points.sort_by_key(|p| p.chunk_id);
        points
    };
    let chunks_before = harness
        .repository
        .get_chunks(&tenant, &document_id)
        .await
        .unwrap();

    // Replay as after a crash between snapshot write and index upsert:
    // the snapshot exists, so no re-embedding happens and the upsert
    // overwrites points with identical content.
    run_stage(&harness.ctx, embed).await.unwrap();

    let points_after = {
        let mut points = harness.vectors.all_points();
        points.sort_by_key(|p| p.chunk_id);
        points
    };
    assert_eq!(points_before.len(), points_after.len());
    for (before, after) in points_before.iter().zip(points_after.iter()) {
        assert_eq!(before.chunk_id, after.chunk_id);
        assert_eq!(before.vector, after.vector);
        assert_eq!(before.payload, after.payload);
    }

    let chunks_after = harness
        .repository
        .get_chunks(&tenant, &document_id)
        .await
        .unwrap();
    assert_eq!(chunks_before.len(), chunks_after.len());
    for (before, after) in chunks_before.iter().zip(chunks_after.iter()) {
        assert_eq!(before.vector_snapshot_path, after.vector_snapshot_path);
    }
}

// ---------------------------------------------------------------------------
// Scenario: cascading delete mid-embedding
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cascading_delete_mid_embedding_removes_everything_and_reports_counts() {
    // 10 single-token chunks, one embed job per chunk
    let harness = Harness::new(1, 0, 1);
    let tenant = harness.tenant("acme").await;
    let document_id = harness
        .upload(tenant, "doc.txt", b"a1 a2 a3 a4 a5 a6 a7 a8 a9 a10")
        .await;

    // Run extract and chunk fully, then exactly 6 of the 10 embed jobs
    while harness.step(tenant, Stage::Extract).await {}
    while harness.step(tenant, Stage::Chunk).await {}
    for _ in 0..6 {
        assert!(harness.step(tenant, Stage::Embed).await);
    }

    assert_eq!(harness.vectors.count().await.unwrap(), 6);
    assert_eq!(harness.queue.len(tenant, Stage::Embed).await.unwrap(), 4);

    let jobs = harness
        .repository
        .jobs_for_document(&tenant, &document_id)
        .await
        .unwrap();
    let snapshot_paths: Vec<_> = jobs
        .iter()
        .filter(|j| j.stage == Stage::Embed && j.status == JobStatus::Completed)
        .map(|j| BlobStore::snapshot_path(&j.job_id))
        .collect();
    assert_eq!(snapshot_paths.len(), 6);

    let outcome = harness
        .delete
        .delete_document(tenant, document_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(outcome.chunks_deleted, 10);
    assert_eq!(outcome.vectors_deleted, 6);

    // Pending embed jobs were removed from the queue
    assert_eq!(harness.queue.len(tenant, Stage::Embed).await.unwrap(), 0);

    // Blobs are gone: raw upload, extracted text, all six snapshots
    assert!(
        !harness
            .blob
            .exists(&BlobStore::raw_path(&document_id, "doc.txt"))
            .await
            .unwrap()
    );
    assert!(
        !harness
            .blob
            .exists(&BlobStore::extracted_path(&document_id))
            .await
            .unwrap()
    );
    for path in snapshot_paths {
        assert!(!harness.blob.exists(&path).await.unwrap());
    }

    // Rows are gone
    assert!(
        harness
            .repository
            .get_document(&tenant, &document_id)
            .await
            .unwrap()
            .is_none()
    );
    assert_eq!(harness.vectors.count().await.unwrap(), 0);
}

#[tokio::test]
async fn embed_job_claimed_before_delete_short_circuits() {
    let harness = Harness::new(1, 0, 1);
    let tenant = harness.tenant("acme").await;
    let document_id = harness.upload(tenant, "doc.txt", b"w1 w2 w3").await;

    while harness.step(tenant, Stage::Extract).await {}
    while harness.step(tenant, Stage::Chunk).await {}

    // A worker pops and claims one embed job, then the delete races in
    let job_id = harness
        .queue
        .pop_min(tenant, Stage::Embed, DRAIN_CLOCK)
        .await
        .unwrap()
        .unwrap();
    let job = harness.repository.claim_job(&job_id).await.unwrap().unwrap();

    harness
        .delete
        .delete_document(tenant, document_id)
        .await
        .unwrap()
        .unwrap();

    // The in-flight worker finds the document gone and short-circuits
    // without touching the vector index; the cascade already removed the
    // job row.
    run_stage(&harness.ctx, &job).await.unwrap();
    assert!(harness.repository.get_job(&job_id).await.unwrap().is_none());
    assert_eq!(harness.vectors.count().await.unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Tenant isolation across the pipeline
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pipeline_state_is_partitioned_by_tenant() {
    let harness = Harness::new(1, 0, 100);
    let a = harness.tenant("a").await;
    let b = harness.tenant("b").await;

    let doc_a = harness.upload(a, "a.txt", b"apple pie.").await;
    let doc_b = harness.upload(b, "b.txt", b"banana bread.").await;
    harness.drive().await;

    // Tenant B cannot see A's document or chunks through scoped reads
    assert!(
        harness
            .repository
            .get_document(&b, &doc_a)
            .await
            .unwrap()
            .is_none()
    );
    assert!(
        harness
            .repository
            .get_chunks(&b, &doc_a)
            .await
            .unwrap()
            .is_empty()
    );

    // Every vector point carries the tenant that uploaded its document
    for point in harness.vectors.all_points() {
        let expected = if point.payload.document_id == doc_a { a } else { b };
        assert_eq!(point.payload.tenant_id, expected);
        assert_eq!(point.payload.document_id, if expected == a { doc_a } else { doc_b });
    }
}
