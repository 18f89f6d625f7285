//! Document deletion endpoint

use axum::Json;
use axum::extract::{Path, State};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::auth::TenantAuth;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// `DELETE /documents/{document_id}`
///
/// Cascading delete across the vector index, metadata store, queue, and
/// blob store. Counts in the response are what was actually removed.
pub async fn delete_document(
    State(state): State<AppState>,
    auth: TenantAuth,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let outcome = state
        .delete
        .delete_document(auth.tenant.tenant_id, document_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(json!({
        "deleted": true,
        "chunks_deleted": outcome.chunks_deleted,
        "vectors_deleted": outcome.vectors_deleted,
    })))
}
