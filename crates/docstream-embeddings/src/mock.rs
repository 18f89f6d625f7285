//! Deterministic mock embedder for tests
//!
//! Vectors are derived from a hash of the input text, so identical texts
//! always embed identically (cosine similarity 1.0) and distinct texts
//! almost never collide. This makes search and idempotence tests exact.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::traits::Embedder;

/// Hash-based deterministic embedder
pub struct MockEmbedder {
    dimension: usize,
    fail: bool,
    calls: AtomicUsize,
}

impl MockEmbedder {
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    /// Variant whose every call fails with a transient error
    pub const fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// Number of `embed_batch` calls served so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    /// The deterministic vector for a text, unit-normalized
    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector: Vec<f32> = (0..self.dimension)
            .map(|i| {
                let mut hasher = DefaultHasher::new();
                text.hash(&mut hasher);
                i.hash(&mut hasher);
                // Map the hash into [-1.0, 1.0]
                (hasher.finish() % 2000) as f32 / 1000.0 - 1.0
            })
            .collect();

        let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut vector {
                *value /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.fail {
            return Err(EmbeddingError::Network("mock embedder failure".to_string()));
        }
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedder"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_texts_embed_identically() {
        let embedder = MockEmbedder::new(16);
        let a = embedder.embed_batch(&["apple"]).await.unwrap();
        let b = embedder.embed_batch(&["apple"]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.call_count(), 2);
    }

    #[tokio::test]
    async fn distinct_texts_embed_differently() {
        let embedder = MockEmbedder::new(16);
        let vectors = embedder.embed_batch(&["apple", "orange"]).await.unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[test]
    fn vectors_are_unit_length() {
        let embedder = MockEmbedder::new(32);
        let v = embedder.vector_for("anything");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }
}
