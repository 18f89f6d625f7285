//! Per-tenant usage metrics endpoint

use axum::Json;
use axum::extract::State;
use serde_json::{Value, json};

use crate::auth::TenantAuth;
use crate::error::ApiResult;
use crate::state::AppState;

/// `GET /metrics/me`
///
/// Counts, bytes, last upload timestamp, and current rate-window usage for
/// the calling tenant.
pub async fn tenant_metrics(
    State(state): State<AppState>,
    auth: TenantAuth,
) -> ApiResult<Json<Value>> {
    let tenant_id = auth.tenant.tenant_id;
    let metrics = state.repository.tenant_metrics(&tenant_id).await?;

    Ok(Json(json!({
        "tenant_id": tenant_id,
        "documents": {
            "total": metrics.documents_total,
            "completed": metrics.documents_completed,
            "failed": metrics.documents_failed,
        },
        "chunks_total": metrics.chunks_total,
        "bytes_total": metrics.bytes_total,
        "last_upload_at": metrics.last_upload_at,
        "rate": {
            "limit_per_minute": auth.tenant.rate_limit_per_minute,
            "current_window_usage": state.rate_limiter.current_usage(tenant_id),
            "window_seconds": state.config.rate_limit.window_seconds,
        },
    })))
}
