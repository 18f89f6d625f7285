//! HTTP route composition for the docstream API

pub mod documents;
pub mod internal;
pub mod metrics;
pub mod search;
pub mod status;
pub mod upload;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};

use docstream_meta_data::Tenant;
use docstream_queue::RateDecision;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Admission check against the tenant's sliding window. Applied to upload
/// and search only; worker-internal traffic never passes through here.
pub(crate) fn check_rate_limit(state: &AppState, tenant: &Tenant) -> ApiResult<()> {
    let limit = u32::try_from(tenant.rate_limit_per_minute.max(0)).unwrap_or(0);
    match state.rate_limiter.check(tenant.tenant_id, limit) {
        RateDecision::Allowed => Ok(()),
        RateDecision::Denied { retry_after_ms } => Err(ApiError::RateLimited { retry_after_ms }),
    }
}

/// Build the full application router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.api.max_file_size_bytes.saturating_add(64 * 1024);

    Router::new()
        .route("/upload/single", post(upload::upload_single))
        .route("/upload/bulk", post(upload::upload_bulk))
        .route("/status/{document_id}", get(status::document_status))
        .route("/documents/{document_id}", delete(documents::delete_document))
        .route("/metrics/me", get(metrics::tenant_metrics))
        .route("/search", post(search::search))
        .merge(internal::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
