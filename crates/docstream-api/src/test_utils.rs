//! In-memory application wiring for tests
//!
//! Builds the same `AppState` the bootstrap produces, over mock backends:
//! mock repository, in-memory queue and blob store, deterministic mock
//! embedder, and in-memory vector index.

use std::sync::Arc;
use std::time::Duration;

use docstream_blob::BlobStore;
use docstream_chunking::{ChunkerConfig, SentenceChunker};
use docstream_config::ApplicationConfig;
use docstream_embeddings::{DefaultEmbeddingService, Embedder, MockEmbedder};
use docstream_extract::FormatDispatchExtractor;
use docstream_meta_data::{MetaRepository, MockMetaRepository, Tenant};
use docstream_pipeline::{DeleteService, IngestService, PipelineContext};
use docstream_queue::{InMemoryJobQueue, JobQueue, SlidingWindowLimiter};
use docstream_search::SearchService;
use docstream_vector_data::{MockVectorIndex, VectorIndex};

use crate::auth::{fingerprint, generate_api_key};
use crate::state::AppState;

pub const TEST_INTERNAL_TOKEN: &str = "test-internal-token";
const TEST_DIMENSION: usize = 16;

/// A fully in-memory application for route tests
pub struct TestApp {
    pub state: AppState,
    pub repository: Arc<MockMetaRepository>,
    pub queue: Arc<InMemoryJobQueue>,
    pub vectors: Arc<MockVectorIndex>,
    pub ctx: PipelineContext,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Build with a tweaked configuration (e.g. a tiny file size limit)
    pub fn with_config(adjust: impl FnOnce(&mut ApplicationConfig)) -> Self {
        let mut config = ApplicationConfig::default();
        config.api.internal_token = TEST_INTERNAL_TOKEN.to_string();
        config.embedding.dimension = TEST_DIMENSION;
        config.vector.dimension = TEST_DIMENSION;
        adjust(&mut config);

        let repository = Arc::new(MockMetaRepository::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let vectors = Arc::new(MockVectorIndex::new());
        let blob = BlobStore::in_memory();

        let embedder = Arc::new(DefaultEmbeddingService::new(
            Arc::new(MockEmbedder::new(TEST_DIMENSION)) as Arc<dyn Embedder>,
            config.embedding.batch_size,
        ));

        let chunker = SentenceChunker::new(ChunkerConfig {
            chunk_size: config.chunking.chunk_size,
            overlap: config.chunking.chunk_overlap,
        })
        .unwrap_or_else(|_| unreachable!("default chunker config is valid"));

        let ctx = PipelineContext {
            repository: Arc::clone(&repository) as Arc<dyn MetaRepository>,
            queue: Arc::clone(&queue) as Arc<dyn JobQueue>,
            blob,
            extractor: Arc::new(FormatDispatchExtractor::new()),
            chunker,
            embedder: Arc::clone(&embedder)
                as Arc<dyn docstream_embeddings::EmbeddingService>,
            vector_index: Arc::clone(&vectors) as Arc<dyn VectorIndex>,
            embed_batch_size: config.embedding.batch_size,
            max_retries: config.pipeline.max_retries,
        };

        let state = AppState {
            repository: Arc::clone(&repository) as Arc<dyn MetaRepository>,
            ingest: IngestService::new(ctx.clone()),
            delete: DeleteService::new(ctx.clone()),
            search: Arc::new(SearchService::with_retry_config(
                embedder,
                Arc::clone(&vectors) as Arc<dyn VectorIndex>,
                1,
                Duration::from_millis(1),
                Duration::from_secs(5),
            )),
            rate_limiter: Arc::new(SlidingWindowLimiter::new(Duration::from_secs(
                config.rate_limit.window_seconds,
            ))),
            vector_index: Arc::clone(&vectors) as Arc<dyn VectorIndex>,
            config: Arc::new(config),
        };

        Self {
            state,
            repository,
            queue,
            vectors,
            ctx,
        }
    }

    pub fn router(&self) -> axum::Router {
        crate::routes::create_router(self.state.clone())
    }

    /// Register a tenant and return it with its raw API key
    pub async fn create_tenant(&self, name: &str, rate_limit: i32) -> (Tenant, String) {
        let api_key = generate_api_key();
        let tenant = self
            .repository
            .create_tenant(name, &fingerprint(&api_key), rate_limit)
            .await
            .unwrap_or_else(|_| unreachable!("mock repository does not fail"));
        (tenant, api_key)
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a multipart request body with one file part
pub fn multipart_file_body(boundary: &str, filename: &str, content: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Disposition: form-data; name=\"file\"; \
             filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}
