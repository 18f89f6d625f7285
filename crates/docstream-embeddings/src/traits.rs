//! Trait abstractions for embedding generation
//!
//! These traits abstract embedding providers so local models, API services,
//! and test doubles can be used interchangeably.

use crate::EmbeddingResult;
use async_trait::async_trait;

/// Capability producing fixed-dimension vectors for text batches
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for a batch of texts
    ///
    /// Returns one vector per input text, each of [`Self::dimension`]
    /// elements.
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// Dimensionality of the vectors this provider produces. A deploy-time
    /// constant that must match the vector index's configured dimension.
    fn dimension(&self) -> usize;

    /// The model identifier behind this provider
    fn model_name(&self) -> &str;
}

/// Service coordinating embedding generation: batching and statistics on
/// top of a provider
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Generate embeddings, batching inputs to the provider's batch size
    async fn generate_embeddings(&self, texts: Vec<&str>) -> EmbeddingResult<Vec<Vec<f32>>>;

    /// The provider in use
    fn provider(&self) -> &dyn Embedder;

    /// Service statistics
    async fn stats(&self) -> EmbeddingStats;
}

/// Statistics about embedding generation
#[derive(Debug, Clone, Default)]
pub struct EmbeddingStats {
    /// Total number of embeddings generated
    pub total_embeddings: usize,

    /// Total number of batches processed
    pub total_batches: usize,

    /// Average batch processing time in milliseconds
    pub avg_batch_time_ms: f64,

    /// Model name being used
    pub model_name: String,

    /// Model dimension
    pub dimension: usize,
}
