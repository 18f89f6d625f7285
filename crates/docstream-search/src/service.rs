//! Search service implementation
//!
//! Read path of the ingestion pipeline: embed the query with the same
//! model as ingestion, run a tenant-filtered vector query, verify the
//! tenant tag on every hit, and apply the score threshold. Results are
//! cached per (tenant, query, limit) and the embed+search attempt retries
//! transient failures with exponential backoff.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{Duration, sleep};
use uuid::Uuid;

use docstream_common::CorrelationId;
use docstream_embeddings::EmbeddingService;
use docstream_vector_data::{VectorDataError, VectorIndex, VectorSearchHit};

use crate::error::{SearchError, SearchResult};

const CACHE_CAPACITY: usize = 100;

type ResultCache = Mutex<lru::LruCache<String, Vec<SearchMatch>>>;

/// Parameters of one search request
#[derive(Debug, Clone)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
    /// Cosine similarity floor applied after retrieval
    pub min_score: Option<f32>,
}

/// A ranked search result
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchMatch {
    pub chunk_id: Uuid,
    pub document_id: Uuid,
    pub filename: String,
    pub chunk_index: i32,
    pub text: String,
    pub score: f32,
    pub metadata: serde_json::Value,
}

/// Semantic search over the ingested corpus
pub struct SearchService {
    embedder: Arc<dyn EmbeddingService>,
    vector_index: Arc<dyn VectorIndex>,
    max_retries: usize,
    retry_delay: Duration,
    search_timeout: Duration,
    cache: ResultCache,
}

impl SearchService {
    pub fn new(embedder: Arc<dyn EmbeddingService>, vector_index: Arc<dyn VectorIndex>) -> Self {
        Self::with_retry_config(
            embedder,
            vector_index,
            3,
            Duration::from_millis(100),
            Duration::from_secs(30),
        )
    }

    /// Create with custom retry configuration for production tuning
    pub fn with_retry_config(
        embedder: Arc<dyn EmbeddingService>,
        vector_index: Arc<dyn VectorIndex>,
        max_retries: usize,
        retry_delay: Duration,
        search_timeout: Duration,
    ) -> Self {
        Self {
            embedder,
            vector_index,
            max_retries,
            retry_delay,
            search_timeout,
            cache: Mutex::new(lru::LruCache::new(
                NonZeroUsize::new(CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN),
            )),
        }
    }

    /// Tenant-scoped search
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the vector query fail after
    /// retries, or if any hit violates tenant isolation - violations are a
    /// hard failure, never silently filtered out.
    #[tracing::instrument(skip(self, request), fields(%tenant_id, query = %request.query, limit = request.limit, %correlation_id, cached = false))]
    pub async fn search(
        &self,
        tenant_id: Uuid,
        request: &SearchQuery,
        correlation_id: &CorrelationId,
    ) -> SearchResult<Vec<SearchMatch>> {
        let cache_key = format!("{tenant_id}:{}:{}", request.query, request.limit);
        if let Some(cached) = self.cache_get(&cache_key) {
            tracing::Span::current().record("cached", true);
            return Ok(Self::apply_threshold(cached, request.min_score));
        }

        let hits = self
            .search_with_retry(Some(tenant_id), &request.query, request.limit, correlation_id)
            .await?;

        // Isolation assertion: a hit tagged with a foreign tenant means the
        // mandatory filter failed somewhere; abort loudly.
        for hit in &hits {
            if hit.payload.tenant_id != tenant_id {
                let violation = VectorDataError::IsolationViolation {
                    point: hit.payload.chunk_id.to_string(),
                    actual: hit.payload.tenant_id.to_string(),
                    expected: tenant_id.to_string(),
                };
                tracing::error!(%correlation_id, "{violation}");
                return Err(SearchError::Vector(violation));
            }
        }

        let matches: Vec<SearchMatch> = hits.into_iter().map(Self::to_match).collect();
        self.cache_put(cache_key, matches.clone());

        Ok(Self::apply_threshold(matches, request.min_score))
    }

    /// Cross-tenant search for the internal admin surface. Uncached.
    ///
    /// # Errors
    ///
    /// Returns an error if embedding or the vector query fail after
    /// retries.
    pub async fn search_all_tenants(
        &self,
        request: &SearchQuery,
        correlation_id: &CorrelationId,
    ) -> SearchResult<Vec<SearchMatch>> {
        let hits = self
            .search_with_retry(None, &request.query, request.limit, correlation_id)
            .await?;
        let matches = hits.into_iter().map(Self::to_match).collect();
        Ok(Self::apply_threshold(matches, request.min_score))
    }

    async fn search_with_retry(
        &self,
        tenant_id: Option<Uuid>,
        query: &str,
        limit: usize,
        correlation_id: &CorrelationId,
    ) -> SearchResult<Vec<VectorSearchHit>> {
        for attempt in 0..=self.max_retries {
            match self.try_search(tenant_id, query, limit, correlation_id).await {
                Ok(hits) => return Ok(hits),
                Err(e) if attempt < self.max_retries => {
                    let delay = self.retry_delay * 2_u32.saturating_pow(attempt as u32);
                    tracing::warn!(
                        %correlation_id,
                        "search attempt {} failed, retrying in {delay:?}: {e}",
                        attempt + 1
                    );
                    sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!("retry loop always returns")
    }

    async fn try_search(
        &self,
        tenant_id: Option<Uuid>,
        query: &str,
        limit: usize,
        correlation_id: &CorrelationId,
    ) -> SearchResult<Vec<VectorSearchHit>> {
        tokio::time::timeout(self.search_timeout, async {
            let embeddings = self
                .embedder
                .generate_embeddings(vec![query])
                .await
                .map_err(|e| SearchError::EmbeddingFailed {
                    message: e.to_string(),
                    correlation_id: *correlation_id,
                })?;

            let query_vector =
                embeddings
                    .into_iter()
                    .next()
                    .ok_or_else(|| SearchError::EmbeddingFailed {
                        message: "embedder returned no vector".to_string(),
                        correlation_id: *correlation_id,
                    })?;

            let hits = match tenant_id {
                Some(tenant) => {
                    self.vector_index
                        .search(tenant, query_vector, limit, correlation_id)
                        .await?
                }
                None => {
                    self.vector_index
                        .search_all_tenants(query_vector, limit, correlation_id)
                        .await?
                }
            };
            Ok(hits)
        })
        .await
        .map_err(|_| SearchError::Timeout {
            timeout_ms: self.search_timeout.as_millis() as u64,
            correlation_id: *correlation_id,
        })?
    }

    fn to_match(hit: VectorSearchHit) -> SearchMatch {
        SearchMatch {
            chunk_id: hit.payload.chunk_id,
            document_id: hit.payload.document_id,
            filename: hit.payload.filename,
            chunk_index: hit.payload.chunk_index,
            text: hit.payload.text,
            score: hit.score,
            metadata: hit.payload.metadata,
        }
    }

    fn apply_threshold(matches: Vec<SearchMatch>, min_score: Option<f32>) -> Vec<SearchMatch> {
        match min_score {
            Some(floor) => matches.into_iter().filter(|m| m.score >= floor).collect(),
            None => matches,
        }
    }

    fn cache_get(&self, key: &str) -> Option<Vec<SearchMatch>> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.get(key).cloned()
    }

    fn cache_put(&self, key: String, matches: Vec<SearchMatch>) {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.put(key, matches);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use docstream_embeddings::{DefaultEmbeddingService, MockEmbedder};
    use docstream_vector_data::{MockVectorIndex, VectorPayload, VectorPoint, VectorResult};

    fn service_over(index: Arc<dyn VectorIndex>) -> (SearchService, Arc<MockEmbedder>) {
        let provider = Arc::new(MockEmbedder::new(16));
        let embedder = Arc::new(DefaultEmbeddingService::new(
            Arc::clone(&provider) as Arc<dyn docstream_embeddings::Embedder>,
            16,
        ));
        (
            SearchService::with_retry_config(
                embedder,
                index,
                2,
                Duration::from_millis(1),
                Duration::from_secs(5),
            ),
            provider,
        )
    }

    async fn store_chunk(
        index: &MockVectorIndex,
        provider: &MockEmbedder,
        tenant_id: Uuid,
        text: &str,
    ) -> Uuid {
        let chunk_id = Uuid::new_v4();
        index
            .upsert_points(
                &[VectorPoint {
                    chunk_id,
                    vector: provider.vector_for(text),
                    payload: VectorPayload {
                        tenant_id,
                        document_id: Uuid::new_v4(),
                        chunk_id,
                        filename: "doc.txt".to_string(),
                        chunk_index: 0,
                        text: text.to_string(),
                        metadata: serde_json::Value::Null,
                    },
                }],
                &CorrelationId::new(),
            )
            .await
            .unwrap();
        chunk_id
    }

    #[tokio::test]
    async fn cross_tenant_content_is_invisible() {
        let index = Arc::new(MockVectorIndex::new());
        let (service, provider) = service_over(Arc::clone(&index) as Arc<dyn VectorIndex>);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store_chunk(&index, &provider, a, "apple").await;

        let request = SearchQuery {
            query: "apple".to_string(),
            limit: 10,
            min_score: None,
        };

        // Tenant B sees nothing; tenant A gets an exact hit
        let b_results = service
            .search(b, &request, &CorrelationId::new())
            .await
            .unwrap();
        assert!(b_results.is_empty());

        let a_results = service
            .search(a, &request, &CorrelationId::new())
            .await
            .unwrap();
        assert_eq!(a_results.len(), 1);
        assert_eq!(a_results[0].text, "apple");
        assert!(a_results[0].score > 0.99);
    }

    #[tokio::test]
    async fn score_threshold_filters_weak_matches() {
        let index = Arc::new(MockVectorIndex::new());
        let (service, provider) = service_over(Arc::clone(&index) as Arc<dyn VectorIndex>);
        let tenant = Uuid::new_v4();

        store_chunk(&index, &provider, tenant, "apple").await;
        store_chunk(&index, &provider, tenant, "completely unrelated text").await;

        let results = service
            .search(
                tenant,
                &SearchQuery {
                    query: "apple".to_string(),
                    limit: 10,
                    min_score: Some(0.95),
                },
                &CorrelationId::new(),
            )
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].text, "apple");
    }

    /// Index that ignores the tenant filter, simulating a backend bug
    struct LeakyIndex {
        inner: MockVectorIndex,
    }

    #[async_trait]
    impl VectorIndex for LeakyIndex {
        async fn ensure_collection(&self) -> VectorResult<()> {
            self.inner.ensure_collection().await
        }

        async fn upsert_points(
            &self,
            points: &[VectorPoint],
            correlation_id: &CorrelationId,
        ) -> VectorResult<()> {
            self.inner.upsert_points(points, correlation_id).await
        }

        async fn search(
            &self,
            _tenant_id: Uuid,
            query: Vec<f32>,
            limit: usize,
            correlation_id: &CorrelationId,
        ) -> VectorResult<Vec<VectorSearchHit>> {
            // Drops the filter entirely
            self.inner.search_all_tenants(query, limit, correlation_id).await
        }

        async fn search_all_tenants(
            &self,
            query: Vec<f32>,
            limit: usize,
            correlation_id: &CorrelationId,
        ) -> VectorResult<Vec<VectorSearchHit>> {
            self.inner.search_all_tenants(query, limit, correlation_id).await
        }

        async fn delete_by_document(
            &self,
            tenant_id: Uuid,
            document_id: Uuid,
        ) -> VectorResult<u64> {
            self.inner.delete_by_document(tenant_id, document_id).await
        }

        async fn count(&self) -> VectorResult<u64> {
            self.inner.count().await
        }
    }

    #[tokio::test]
    async fn isolation_violation_is_a_hard_error_not_a_filter() {
        let leaky = Arc::new(LeakyIndex {
            inner: MockVectorIndex::new(),
        });
        let (service, provider) = service_over(Arc::clone(&leaky) as Arc<dyn VectorIndex>);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store_chunk(&leaky.inner, &provider, a, "apple").await;

        let result = service
            .search(
                b,
                &SearchQuery {
                    query: "apple".to_string(),
                    limit: 10,
                    min_score: None,
                },
                &CorrelationId::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(SearchError::Vector(VectorDataError::IsolationViolation { .. }))
        ));
    }

    #[tokio::test]
    async fn internal_search_spans_tenants() {
        let index = Arc::new(MockVectorIndex::new());
        let (service, provider) = service_over(Arc::clone(&index) as Arc<dyn VectorIndex>);
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        store_chunk(&index, &provider, a, "apple").await;
        store_chunk(&index, &provider, b, "apple").await;

        let results = service
            .search_all_tenants(
                &SearchQuery {
                    query: "apple".to_string(),
                    limit: 10,
                    min_score: None,
                },
                &CorrelationId::new(),
            )
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
    }

    #[tokio::test]
    async fn repeated_query_is_served_from_cache() {
        let index = Arc::new(MockVectorIndex::new());
        let (service, provider) = service_over(Arc::clone(&index) as Arc<dyn VectorIndex>);
        let tenant = Uuid::new_v4();

        store_chunk(&index, &provider, tenant, "apple").await;

        let request = SearchQuery {
            query: "apple".to_string(),
            limit: 10,
            min_score: None,
        };
        let calls_before_first = provider.call_count();
        service.search(tenant, &request, &CorrelationId::new()).await.unwrap();
        let calls_after_first = provider.call_count();
        service.search(tenant, &request, &CorrelationId::new()).await.unwrap();
        let calls_after_second = provider.call_count();

        assert!(calls_after_first > calls_before_first);
        assert_eq!(
            calls_after_first, calls_after_second,
            "cache hit must not re-embed the query"
        );
    }
}
