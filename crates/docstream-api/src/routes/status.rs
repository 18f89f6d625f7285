//! Document status endpoint

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use crate::auth::TenantAuth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `GET /status/{document_id}`
///
/// Returns the document's lifecycle status plus a per-stage rollup of its
/// jobs.
pub async fn document_status(
    State(state): State<AppState>,
    auth: TenantAuth,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let report = state
        .ingest
        .document_status(auth.tenant.tenant_id, document_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    let mut stages = Map::new();
    for stage in &report.stages {
        stages.insert(
            stage.stage.to_string(),
            json!({
                "status": stage.status.map(|s| s.to_string()),
                "jobs": stage.jobs,
            }),
        );
    }

    Ok(Json(json!({
        "document_id": report.document.document_id,
        "filename": report.document.filename,
        "status": report.document.status.to_string(),
        "error_message": report.document.error_message,
        "stages": stages,
    })))
}
