//! Qdrant vector index backend
//!
//! Stores chunk embeddings as points whose id is the chunk id (idempotent
//! upsert) and whose payload carries the tenant tag. The collection keeps a
//! keyword payload index on `tenant_id` so the mandatory tenant filter is
//! cheap.

use async_trait::async_trait;
use qdrant_client::qdrant::{
    CollectionExistsRequest, Condition, CountPoints, CreateCollection,
    CreateFieldIndexCollection, DeletePoints, Distance, FieldType, Filter, PointStruct,
    PointsSelector, SearchPoints, UpsertPoints, Value, VectorParams,
    points_selector::PointsSelectorOneOf,
};
use qdrant_client::{Payload, Qdrant};
use std::collections::HashMap;
use uuid::Uuid;

use docstream_common::CorrelationId;

use crate::error::{VectorDataError, VectorResult};
use crate::traits::{VectorIndex, VectorPayload, VectorPoint, VectorSearchHit};

/// Qdrant-backed implementation of [`VectorIndex`]
#[derive(Clone)]
pub struct QdrantIndex {
    client: std::sync::Arc<Qdrant>,
    collection_name: String,
    dimension: usize,
}

impl QdrantIndex {
    /// Connect to a Qdrant server and bind to a collection
    ///
    /// # Errors
    ///
    /// Returns `VectorDataError::Storage` if the client cannot be built.
    pub fn new(url: &str, collection_name: String, dimension: usize) -> VectorResult<Self> {
        let mut builder = Qdrant::from_url(url);

        if let Ok(api_key) = std::env::var("QDRANT_API_KEY") {
            builder = builder.api_key(api_key);
        }

        let client = builder
            .build()
            .map_err(|e| VectorDataError::Storage(format!("failed to create client: {e}")))?;

        Ok(Self {
            client: std::sync::Arc::new(client),
            collection_name,
            dimension,
        })
    }

    fn tenant_filter(tenant_id: Uuid) -> Filter {
        Filter::must([Condition::matches(
            "tenant_id",
            tenant_id.to_string(),
        )])
    }

    fn document_filter(tenant_id: Uuid, document_id: Uuid) -> Filter {
        Filter::must([
            Condition::matches("tenant_id", tenant_id.to_string()),
            Condition::matches("document_id", document_id.to_string()),
        ])
    }

    fn payload_to_map(payload: &VectorPayload) -> HashMap<String, Value> {
        let mut map = HashMap::new();
        map.insert(
            "tenant_id".to_string(),
            Value::from(payload.tenant_id.to_string()),
        );
        map.insert(
            "document_id".to_string(),
            Value::from(payload.document_id.to_string()),
        );
        map.insert(
            "chunk_id".to_string(),
            Value::from(payload.chunk_id.to_string()),
        );
        map.insert(
            "filename".to_string(),
            Value::from(payload.filename.clone()),
        );
        map.insert(
            "chunk_index".to_string(),
            Value::from(i64::from(payload.chunk_index)),
        );
        map.insert("text".to_string(), Value::from(payload.text.clone()));
        map.insert(
            "metadata".to_string(),
            Value::from(payload.metadata.to_string()),
        );
        map
    }

    fn map_to_payload(map: &HashMap<String, Value>) -> VectorResult<VectorPayload> {
        let get_str = |key: &str| -> VectorResult<String> {
            map.get(key)
                .and_then(|v| v.as_str())
                .map(ToString::to_string)
                .ok_or_else(|| {
                    VectorDataError::Storage(format!("payload missing field {key}"))
                })
        };
        let get_uuid = |key: &str| -> VectorResult<Uuid> {
            Uuid::try_parse(&get_str(key)?)
                .map_err(|e| VectorDataError::Storage(format!("payload field {key}: {e}")))
        };

        let metadata = serde_json::from_str(&get_str("metadata")?)
            .unwrap_or(serde_json::Value::Null);

        Ok(VectorPayload {
            tenant_id: get_uuid("tenant_id")?,
            document_id: get_uuid("document_id")?,
            chunk_id: get_uuid("chunk_id")?,
            filename: get_str("filename")?,
            chunk_index: map
                .get("chunk_index")
                .and_then(qdrant_client::qdrant::Value::as_integer)
                .unwrap_or(0) as i32,
            text: get_str("text")?,
            metadata,
        })
    }

    async fn run_search(
        &self,
        query: Vec<f32>,
        limit: usize,
        filter: Option<Filter>,
    ) -> VectorResult<Vec<VectorSearchHit>> {
        if query.len() != self.dimension {
            return Err(VectorDataError::DimensionMismatch(format!(
                "query has {} dimensions, collection expects {}",
                query.len(),
                self.dimension
            )));
        }

        let request = SearchPoints {
            collection_name: self.collection_name.clone(),
            vector: query,
            limit: limit as u64,
            with_payload: Some(true.into()),
            filter,
            ..Default::default()
        };

        let response = self
            .client
            .search_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("search failed: {e}")))?;

        response
            .result
            .into_iter()
            .map(|point| {
                let payload = Self::map_to_payload(&point.payload)?;
                Ok(VectorSearchHit {
                    payload,
                    score: point.score,
                })
            })
            .collect()
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn ensure_collection(&self) -> VectorResult<()> {
        let exists = self
            .client
            .collection_exists(CollectionExistsRequest {
                collection_name: self.collection_name.clone(),
            })
            .await
            .map_err(|e| VectorDataError::Collection(format!("existence check failed: {e}")))?;

        if !exists {
            let request = CreateCollection {
                collection_name: self.collection_name.clone(),
                vectors_config: Some(
                    VectorParams {
                        size: self.dimension as u64,
                        distance: Distance::Cosine as i32,
                        ..Default::default()
                    }
                    .into(),
                ),
                ..Default::default()
            };

            if let Err(e) = self.client.create_collection(request).await {
                // Race: another process created it between the check and
                // the create.
                if !e.to_string().contains("already exists") {
                    return Err(VectorDataError::Collection(format!(
                        "failed to create collection '{}': {e}",
                        self.collection_name
                    )));
                }
            }
        }

        // Keyword index on tenant_id keeps the mandatory filter O(1)
        // eligible. Idempotent.
        let index_request = CreateFieldIndexCollection {
            collection_name: self.collection_name.clone(),
            field_name: "tenant_id".to_string(),
            field_type: Some(FieldType::Keyword as i32),
            ..Default::default()
        };
        if let Err(e) = self.client.create_field_index(index_request).await {
            tracing::debug!("tenant_id payload index: {e}");
        }

        Ok(())
    }

    #[tracing::instrument(skip(self, points, correlation_id), fields(point_count = points.len(), %correlation_id))]
    async fn upsert_points(
        &self,
        points: &[VectorPoint],
        correlation_id: &CorrelationId,
    ) -> VectorResult<()> {
        if points.is_empty() {
            return Ok(());
        }

        for point in points {
            if point.vector.len() != self.dimension {
                return Err(VectorDataError::DimensionMismatch(format!(
                    "point {} has {} dimensions, collection expects {}",
                    point.chunk_id,
                    point.vector.len(),
                    self.dimension
                )));
            }
        }

        let qdrant_points: Vec<PointStruct> = points
            .iter()
            .map(|point| {
                PointStruct::new(
                    point.chunk_id.to_string(),
                    point.vector.clone(),
                    Payload::from(Self::payload_to_map(&point.payload)),
                )
            })
            .collect();

        let request = UpsertPoints {
            collection_name: self.collection_name.clone(),
            points: qdrant_points,
            ..Default::default()
        };

        self.client
            .upsert_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("upsert failed: {e}")))?;

        Ok(())
    }

    #[tracing::instrument(skip(self, query, correlation_id), fields(%tenant_id, limit, %correlation_id))]
    async fn search(
        &self,
        tenant_id: Uuid,
        query: Vec<f32>,
        limit: usize,
        correlation_id: &CorrelationId,
    ) -> VectorResult<Vec<VectorSearchHit>> {
        self.run_search(query, limit, Some(Self::tenant_filter(tenant_id)))
            .await
    }

    async fn search_all_tenants(
        &self,
        query: Vec<f32>,
        limit: usize,
        _correlation_id: &CorrelationId,
    ) -> VectorResult<Vec<VectorSearchHit>> {
        self.run_search(query, limit, None).await
    }

    async fn delete_by_document(
        &self,
        tenant_id: Uuid,
        document_id: Uuid,
    ) -> VectorResult<u64> {
        let filter = Self::document_filter(tenant_id, document_id);

        // Count first so the caller can report a truthful number; the
        // delete itself does not say how many points it removed.
        let count_request = CountPoints {
            collection_name: self.collection_name.clone(),
            filter: Some(filter.clone()),
            exact: Some(true),
            ..Default::default()
        };
        let count = self
            .client
            .count(count_request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("count failed: {e}")))?
            .result
            .map_or(0, |r| r.count);

        let request = DeletePoints {
            collection_name: self.collection_name.clone(),
            points: Some(PointsSelector {
                points_selector_one_of: Some(PointsSelectorOneOf::Filter(filter)),
            }),
            ..Default::default()
        };

        self.client
            .delete_points(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("filter delete failed: {e}")))?;

        Ok(count)
    }

    async fn count(&self) -> VectorResult<u64> {
        let request = CountPoints {
            collection_name: self.collection_name.clone(),
            exact: Some(true),
            ..Default::default()
        };

        let response = self
            .client
            .count(request)
            .await
            .map_err(|e| VectorDataError::Storage(format!("count failed: {e}")))?;

        Ok(response.result.map_or(0, |r| r.count))
    }
}
