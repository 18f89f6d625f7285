//! Tenant-scoped semantic search endpoint

use axum::Json;
use axum::extract::State;
use serde::Deserialize;
use serde_json::{Value, json};

use docstream_common::CorrelationId;
use docstream_search::SearchQuery;

use crate::auth::TenantAuth;
use crate::error::{ApiError, ApiResult};
use crate::routes::check_rate_limit;
use crate::state::AppState;

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

/// Request payload for `POST /search`
#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub limit: Option<usize>,
    pub score_threshold: Option<f32>,
}

impl SearchRequest {
    pub(crate) fn into_query(self) -> ApiResult<SearchQuery> {
        if self.query.trim().is_empty() {
            return Err(ApiError::Validation("query must not be empty".to_string()));
        }
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT);
        if limit == 0 || limit > MAX_LIMIT {
            return Err(ApiError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }
        Ok(SearchQuery {
            query: self.query,
            limit,
            min_score: self.score_threshold,
        })
    }
}

/// `POST /search`
pub async fn search(
    State(state): State<AppState>,
    auth: TenantAuth,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<Value>> {
    check_rate_limit(&state, &auth.tenant)?;

    let correlation_id = CorrelationId::new();
    let query = request.into_query()?;
    let started = std::time::Instant::now();

    let results = state
        .search
        .search(auth.tenant.tenant_id, &query, &correlation_id)
        .await?;
    let returned = results.len();

    Ok(Json(json!({
        "results": results,
        "metadata": {
            "returned": returned,
            "query": query.query,
            "query_time_ms": u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        },
    })))
}
