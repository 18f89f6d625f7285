//! Concrete implementation of the `EmbeddingService`

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::EmbeddingResult;
use crate::traits::{Embedder, EmbeddingService, EmbeddingStats};

/// Default implementation of [`EmbeddingService`]
///
/// Splits inputs into provider-sized batches and keeps running statistics.
pub struct DefaultEmbeddingService {
    provider: Arc<dyn Embedder>,
    stats: Arc<RwLock<EmbeddingStats>>,
    batch_size: usize,
}

impl DefaultEmbeddingService {
    pub fn new(provider: Arc<dyn Embedder>, batch_size: usize) -> Self {
        let stats = Arc::new(RwLock::new(EmbeddingStats {
            model_name: provider.model_name().to_string(),
            dimension: provider.dimension(),
            ..Default::default()
        }));

        Self {
            provider,
            stats,
            batch_size: batch_size.max(1),
        }
    }
}

#[async_trait]
impl EmbeddingService for DefaultEmbeddingService {
    async fn generate_embeddings(&self, texts: Vec<&str>) -> EmbeddingResult<Vec<Vec<f32>>> {
        let mut all_embeddings = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.batch_size) {
            let start = Instant::now();

            let embeddings = self.provider.embed_batch(batch).await?;
            all_embeddings.extend(embeddings);

            let elapsed = start.elapsed().as_millis() as f64;
            let mut stats = self.stats.write().await;
            stats.total_embeddings += batch.len();
            stats.total_batches += 1;

            let prev_avg = stats.avg_batch_time_ms;
            let count = stats.total_batches as f64;
            stats.avg_batch_time_ms = (prev_avg * (count - 1.0) + elapsed) / count;
        }

        Ok(all_embeddings)
    }

    fn provider(&self) -> &dyn Embedder {
        self.provider.as_ref()
    }

    async fn stats(&self) -> EmbeddingStats {
        self.stats.read().await.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mock::MockEmbedder;

    #[tokio::test]
    async fn batches_inputs_and_tracks_stats() {
        let provider = Arc::new(MockEmbedder::new(8));
        let service = DefaultEmbeddingService::new(provider, 2);

        let texts = vec!["text1", "text2", "text3", "text4", "text5"];
        let embeddings = service.generate_embeddings(texts).await.unwrap();
        assert_eq!(embeddings.len(), 5);
        assert_eq!(embeddings[0].len(), 8);

        let stats = service.stats().await;
        assert_eq!(stats.total_embeddings, 5);
        assert_eq!(stats.total_batches, 3); // 5 texts at batch size 2
        assert_eq!(stats.dimension, 8);
    }

    #[tokio::test]
    async fn provider_errors_propagate() {
        let provider = Arc::new(MockEmbedder::new(8).failing());
        let service = DefaultEmbeddingService::new(provider, 2);

        assert!(service.generate_embeddings(vec!["text"]).await.is_err());
    }
}
