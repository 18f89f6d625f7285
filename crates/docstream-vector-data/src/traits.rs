//! Vector index abstraction
//!
//! Abstracts the ANN index so Qdrant and in-memory test implementations
//! are interchangeable. Tenant-scoped search takes a mandatory tenant id;
//! implementations must filter server-side, and callers treat any result
//! with a foreign tenant tag as a hard error.

use async_trait::async_trait;
use docstream_common::CorrelationId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::VectorResult;

/// Payload stored alongside every vector point
///
/// `tenant_id` always equals the corresponding chunk's tenant. The chunk
/// text rides along so search results need no enrichment query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VectorPayload {
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub chunk_id: Uuid,
    pub filename: String,
    pub chunk_index: i32,
    pub text: String,
    pub metadata: serde_json::Value,
}

/// A point to upsert: id is the chunk id, so replays are idempotent
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub chunk_id: Uuid,
    pub vector: Vec<f32>,
    pub payload: VectorPayload,
}

/// A search hit with its cosine similarity (higher is better)
#[derive(Debug, Clone)]
pub struct VectorSearchHit {
    pub payload: VectorPayload,
    pub score: f32,
}

/// Trait for vector index backends
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Create the collection (dimension, cosine distance, tenant payload
    /// index) if it does not exist. Idempotent.
    async fn ensure_collection(&self) -> VectorResult<()>;

    /// Upsert points; point id = chunk id makes this idempotent
    async fn upsert_points(
        &self,
        points: &[VectorPoint],
        correlation_id: &CorrelationId,
    ) -> VectorResult<()>;

    /// Tenant-scoped ANN search with a mandatory server-side tenant filter
    async fn search(
        &self,
        tenant_id: Uuid,
        query: Vec<f32>,
        limit: usize,
        correlation_id: &CorrelationId,
    ) -> VectorResult<Vec<VectorSearchHit>>;

    /// Cross-tenant ANN search; internal admin scope only
    async fn search_all_tenants(
        &self,
        query: Vec<f32>,
        limit: usize,
        correlation_id: &CorrelationId,
    ) -> VectorResult<Vec<VectorSearchHit>>;

    /// Delete every point of a document, returning the count removed
    async fn delete_by_document(&self, tenant_id: Uuid, document_id: Uuid)
    -> VectorResult<u64>;

    /// Total number of points in the collection
    async fn count(&self) -> VectorResult<u64>;
}
