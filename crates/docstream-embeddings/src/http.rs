//! HTTP embedding provider
//!
//! Talks to an OpenAI-compatible `/v1/embeddings` endpoint. The model runs
//! out of process; this service only needs a vector per text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use docstream_config::EmbeddingConfig;

use crate::error::{EmbeddingError, EmbeddingResult};
use crate::traits::Embedder;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    index: usize,
    embedding: Vec<f32>,
}

/// Provider calling a remote embedding endpoint over HTTP
pub struct HttpEmbedder {
    client: reqwest::Client,
    endpoint: String,
    model_id: String,
    dimension: usize,
}

impl HttpEmbedder {
    /// Build a provider from the embedding configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &EmbeddingConfig) -> EmbeddingResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model_id: config.model_id.clone(),
            dimension: config.dimension,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    #[tracing::instrument(skip(self, texts), fields(batch = texts.len(), model = %self.model_id))]
    async fn embed_batch(&self, texts: &[&str]) -> EmbeddingResult<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(&self.endpoint)
            .json(&EmbeddingRequest {
                model: &self.model_id,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| EmbeddingError::Network(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            // 4xx means the input itself was rejected; retrying the same
            // payload cannot succeed.
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::InvalidInput(format!("{status}: {body}")));
        }
        if !status.is_success() {
            return Err(EmbeddingError::Network(format!(
                "embedding endpoint returned {status}"
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EmbeddingError::MalformedResponse(e.to_string()))?;

        if parsed.data.len() != texts.len() {
            return Err(EmbeddingError::MalformedResponse(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        // Providers may return data out of order; the index field is
        // authoritative.
        parsed.data.sort_by_key(|d| d.index);

        let mut vectors = Vec::with_capacity(parsed.data.len());
        for datum in parsed.data {
            if datum.embedding.len() != self.dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimension,
                    actual: datum.embedding.len(),
                });
            }
            vectors.push(datum.embedding);
        }
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}
