//! In-memory vector index for tests
//!
//! Exact cosine similarity over a map of points. Upsert replaces by chunk
//! id, exactly like the Qdrant backend, so idempotence tests are faithful.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use docstream_common::CorrelationId;

use crate::error::{VectorDataError, VectorResult};
use crate::traits::{VectorIndex, VectorPoint, VectorSearchHit};

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// In-memory implementation of [`VectorIndex`]
#[derive(Default)]
pub struct MockVectorIndex {
    points: Mutex<HashMap<Uuid, VectorPoint>>,
}

impl MockVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, VectorPoint>> {
        self.points.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the stored points, for test assertions
    pub fn all_points(&self) -> Vec<VectorPoint> {
        self.lock().values().cloned().collect()
    }

    fn ranked(&self, query: &[f32], limit: usize, tenant: Option<Uuid>) -> Vec<VectorSearchHit> {
        let points = self.lock();
        let mut hits: Vec<VectorSearchHit> = points
            .values()
            .filter(|p| tenant.is_none_or(|t| p.payload.tenant_id == t))
            .map(|p| VectorSearchHit {
                payload: p.payload.clone(),
                score: cosine_similarity(query, &p.vector),
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }
}

#[async_trait]
impl VectorIndex for MockVectorIndex {
    async fn ensure_collection(&self) -> VectorResult<()> {
        Ok(())
    }

    async fn upsert_points(
        &self,
        points: &[VectorPoint],
        _correlation_id: &CorrelationId,
    ) -> VectorResult<()> {
        let dimension = {
            let existing = self.lock();
            existing.values().next().map(|p| p.vector.len())
        };
        if let (Some(dim), Some(point)) = (dimension, points.first()) {
            if point.vector.len() != dim {
                return Err(VectorDataError::DimensionMismatch(format!(
                    "point has {} dimensions, index holds {dim}",
                    point.vector.len()
                )));
            }
        }

        let mut map = self.lock();
        for point in points {
            map.insert(point.chunk_id, point.clone());
        }
        Ok(())
    }

    async fn search(
        &self,
        tenant_id: Uuid,
        query: Vec<f32>,
        limit: usize,
        _correlation_id: &CorrelationId,
    ) -> VectorResult<Vec<VectorSearchHit>> {
        Ok(self.ranked(&query, limit, Some(tenant_id)))
    }

    async fn search_all_tenants(
        &self,
        query: Vec<f32>,
        limit: usize,
        _correlation_id: &CorrelationId,
    ) -> VectorResult<Vec<VectorSearchHit>> {
        Ok(self.ranked(&query, limit, None))
    }

    async fn delete_by_document(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> VectorResult<u64> {
        let mut points = self.lock();
        let before = points.len();
        points.retain(|_, p| {
            !(p.payload.tenant_id == tenant_id && p.payload.document_id == document_id)
        });
        Ok((before - points.len()) as u64)
    }

    async fn count(&self) -> VectorResult<u64> {
        Ok(self.lock().len() as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use crate::traits::VectorPayload;

    fn point(tenant_id: Uuid, document_id: Uuid, vector: Vec<f32>, text: &str) -> VectorPoint {
        let chunk_id = Uuid::new_v4();
        VectorPoint {
            chunk_id,
            vector,
            payload: VectorPayload {
                tenant_id,
                document_id,
                chunk_id,
                filename: "f.txt".to_string(),
                chunk_index: 0,
                text: text.to_string(),
                metadata: serde_json::Value::Null,
            },
        }
    }

    #[tokio::test]
    async fn search_is_tenant_scoped() {
        let index = MockVectorIndex::new();
        let correlation_id = CorrelationId::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let doc = Uuid::new_v4();

        index
            .upsert_points(
                &[
                    point(a, doc, vec![1.0, 0.0], "apple"),
                    point(b, doc, vec![1.0, 0.0], "apple"),
                ],
                &correlation_id,
            )
            .await
            .unwrap();

        let hits = index
            .search(b, vec![1.0, 0.0], 10, &correlation_id)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].payload.tenant_id, b);
    }

    #[tokio::test]
    async fn upsert_by_chunk_id_is_idempotent() {
        let index = MockVectorIndex::new();
        let correlation_id = CorrelationId::new();
        let tenant = Uuid::new_v4();
        let p = point(tenant, Uuid::new_v4(), vec![0.0, 1.0], "text");

        index.upsert_points(&[p.clone()], &correlation_id).await.unwrap();
        index.upsert_points(&[p], &correlation_id).await.unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delete_by_document_reports_exact_count() {
        let index = MockVectorIndex::new();
        let correlation_id = CorrelationId::new();
        let tenant = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let other_doc = Uuid::new_v4();

        index
            .upsert_points(
                &[
                    point(tenant, doc, vec![1.0, 0.0], "a"),
                    point(tenant, doc, vec![0.0, 1.0], "b"),
                    point(tenant, other_doc, vec![0.5, 0.5], "c"),
                ],
                &correlation_id,
            )
            .await
            .unwrap();

        assert_eq!(index.delete_by_document(tenant, doc).await.unwrap(), 2);
        assert_eq!(index.count().await.unwrap(), 1);
    }

    #[test]
    fn cosine_ranks_closer_vectors_higher() {
        let query = [1.0, 0.0];
        assert!(
            cosine_similarity(&query, &[1.0, 0.0]) > cosine_similarity(&query, &[0.5, 0.5])
        );
    }
}
