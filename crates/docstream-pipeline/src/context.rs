//! Shared handles for pipeline services
//!
//! Built once at startup from validated configuration and passed by
//! reference to workers and handlers; no module-level singletons.

use std::sync::Arc;

use docstream_blob::BlobStore;
use docstream_chunking::SentenceChunker;
use docstream_embeddings::EmbeddingService;
use docstream_extract::Extractor;
use docstream_meta_data::MetaRepository;
use docstream_queue::JobQueue;
use docstream_vector_data::VectorIndex;

/// Everything a stage worker needs to process a job
#[derive(Clone)]
pub struct PipelineContext {
    pub repository: Arc<dyn MetaRepository>,
    pub queue: Arc<dyn JobQueue>,
    pub blob: BlobStore,
    pub extractor: Arc<dyn Extractor>,
    pub chunker: SentenceChunker,
    pub embedder: Arc<dyn EmbeddingService>,
    pub vector_index: Arc<dyn VectorIndex>,
    /// Chunks per embed job
    pub embed_batch_size: usize,
    /// Retry ceiling stamped onto new jobs
    pub max_retries: i32,
}
