//! Process bootstrap: build every service from validated configuration
//!
//! Explicit process-wide lifecycle: constructed at startup, passed by
//! reference to workers and handlers, torn down on graceful shutdown.

use std::sync::Arc;

use anyhow::Context;

use docstream_blob::BlobStore;
use docstream_chunking::{ChunkerConfig, SentenceChunker};
use docstream_config::ApplicationConfig;
use docstream_embeddings::{DefaultEmbeddingService, HttpEmbedder};
use docstream_extract::FormatDispatchExtractor;
use docstream_meta_data::{
    MetaRepository, PgMetaRepository, PoolConfig, PoolManager, run_migrations,
};
use docstream_pipeline::{
    DeleteService, IngestService, PipelineContext, WorkerRuntime, recover_stale_jobs,
};
use docstream_queue::{
    InFlightTracker, JobQueue, PostgresJobQueue, PostgresRotationStore, Scheduler,
    SlidingWindowLimiter, TenantCaps,
};
use docstream_search::SearchService;
use docstream_vector_data::{QdrantIndex, VectorIndex};

use crate::state::AppState;

/// Fully wired application: HTTP state plus the worker runtime
pub struct Application {
    pub state: AppState,
    pub worker_runtime: WorkerRuntime,
    pub pools: PoolManager,
}

/// Build the application from configuration
///
/// # Errors
///
/// Returns an error if any backing store is unreachable or migrations
/// fail. Changing `vector.dimension` against an existing collection is
/// rejected by the index backend; re-ingestion is the supported path.
pub async fn build(config: ApplicationConfig) -> anyhow::Result<Application> {
    config.validate().context("configuration invalid")?;

    let pools = PoolManager::new(&config.database, PoolConfig::default())
        .await
        .context("database connection failed")?;
    run_migrations(pools.write_pool())
        .await
        .context("migrations failed")?;

    let repository: Arc<dyn MetaRepository> = Arc::new(PgMetaRepository::new(pools.clone()));
    let queue: Arc<dyn JobQueue> = Arc::new(PostgresJobQueue::new(pools.write_pool().clone()));
    let rotation = Arc::new(PostgresRotationStore::new(pools.write_pool().clone()));

    let blob = BlobStore::local(&config.blob.root).context("blob store unavailable")?;

    let embed_provider = Arc::new(HttpEmbedder::new(&config.embedding)?);
    let embedder = Arc::new(DefaultEmbeddingService::new(
        embed_provider,
        config.embedding.batch_size,
    ));

    let vector_index: Arc<dyn VectorIndex> = Arc::new(QdrantIndex::new(
        &config.vector.url,
        config.vector.collection.clone(),
        config.vector.dimension,
    )?);
    vector_index
        .ensure_collection()
        .await
        .context("vector collection bootstrap failed")?;

    let chunker = SentenceChunker::new(ChunkerConfig {
        chunk_size: config.chunking.chunk_size,
        overlap: config.chunking.chunk_overlap,
    })?;

    let ctx = PipelineContext {
        repository: Arc::clone(&repository),
        queue: Arc::clone(&queue),
        blob,
        extractor: Arc::new(FormatDispatchExtractor::new()),
        chunker,
        embedder: Arc::clone(&embedder) as Arc<dyn docstream_embeddings::EmbeddingService>,
        vector_index: Arc::clone(&vector_index),
        embed_batch_size: config.embedding.batch_size,
        max_retries: config.pipeline.max_retries,
    };

    // Startup sweep: anything left in processing by a previous process -
    // crash, drain deadline, or kill - goes back to pending before the new
    // worker pools start claiming.
    recover_stale_jobs(&ctx, config.pipeline.stale_job_after_secs).await?;

    let caps = config.pipeline.per_tenant_concurrency_cap;
    let scheduler = Arc::new(Scheduler::new(
        Arc::clone(&queue),
        rotation,
        InFlightTracker::new(),
        TenantCaps {
            extract: caps.extract,
            chunk: caps.chunk,
            embed: caps.embed,
        },
    ));

    let worker_runtime = WorkerRuntime::new(ctx.clone(), scheduler, config.pipeline.clone());

    let rate_limiter = Arc::new(SlidingWindowLimiter::new(std::time::Duration::from_secs(
        config.rate_limit.window_seconds,
    )));

    let search = Arc::new(SearchService::new(
        embedder,
        Arc::clone(&vector_index),
    ));

    let state = AppState {
        repository,
        ingest: IngestService::new(ctx.clone()),
        delete: DeleteService::new(ctx),
        search,
        rate_limiter,
        vector_index,
        config: Arc::new(config),
    };

    Ok(Application {
        state,
        worker_runtime,
        pools,
    })
}
