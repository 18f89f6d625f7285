//! Internal admin surface
//!
//! Cross-tenant operations guarded by the `X-Internal-Token` secret:
//! tenant CRUD and credential rotation, service stats, document listing,
//! cross-tenant search, health, and a token check endpoint.

use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use uuid::Uuid;

use docstream_common::CorrelationId;

use crate::auth::{InternalAuth, fingerprint, generate_api_key};
use crate::error::{ApiError, ApiResult};
use crate::routes::search::SearchRequest;
use crate::state::AppState;

const DEFAULT_DOCUMENT_LIMIT: i64 = 100;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/internal/tenants", post(create_tenant).get(list_tenants))
        .route("/internal/tenants/{tenant_id}", delete(delete_tenant))
        .route(
            "/internal/tenants/{tenant_id}/rotate-credential",
            post(rotate_credential),
        )
        .route("/internal/stats", get(stats))
        .route("/internal/documents", get(list_documents))
        .route("/internal/documents/{document_id}", get(get_document))
        .route("/internal/search", post(cross_tenant_search))
        .route("/internal/health", get(health))
        .route("/internal/auth", get(check_auth))
}

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub name: String,
    pub rate_limit_per_minute: Option<i32>,
}

/// `POST /internal/tenants`
///
/// Returns the raw API key exactly once; only its fingerprint is stored.
async fn create_tenant(
    State(state): State<AppState>,
    _auth: InternalAuth,
    Json(request): Json<CreateTenantRequest>,
) -> ApiResult<Json<Value>> {
    if request.name.trim().is_empty() {
        return Err(ApiError::Validation("tenant name must not be empty".to_string()));
    }
    let rate_limit = request.rate_limit_per_minute.unwrap_or(60);
    if rate_limit <= 0 {
        return Err(ApiError::Validation(
            "rate_limit_per_minute must be positive".to_string(),
        ));
    }

    let api_key = generate_api_key();
    let tenant = match state
        .repository
        .create_tenant(request.name.trim(), &fingerprint(&api_key), rate_limit)
        .await
    {
        Ok(tenant) => tenant,
        Err(e) if e.is_unique_violation() => {
            return Err(ApiError::Validation(format!(
                "tenant name '{}' already exists",
                request.name.trim()
            )));
        }
        Err(e) => return Err(e.into()),
    };

    Ok(Json(json!({
        "tenant_id": tenant.tenant_id,
        "name": tenant.name,
        "rate_limit_per_minute": tenant.rate_limit_per_minute,
        "created_at": tenant.created_at,
        "api_key": api_key,
    })))
}

/// `GET /internal/tenants`
async fn list_tenants(
    State(state): State<AppState>,
    _auth: InternalAuth,
) -> ApiResult<Json<Value>> {
    let tenants = state.repository.list_tenants().await?;
    let listed: Vec<Value> = tenants
        .iter()
        .map(|t| {
            json!({
                "tenant_id": t.tenant_id,
                "name": t.name,
                "rate_limit_per_minute": t.rate_limit_per_minute,
                "created_at": t.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "tenants": listed })))
}

/// `DELETE /internal/tenants/{tenant_id}`
async fn delete_tenant(
    State(state): State<AppState>,
    _auth: InternalAuth,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    // Best-effort vector/blob cleanup happens per document first
    let documents = state
        .repository
        .list_documents(Some(&tenant_id), i64::MAX)
        .await?;
    for document in &documents {
        let _ = state
            .delete
            .delete_document(tenant_id, document.document_id)
            .await?;
    }

    let deleted = state.repository.delete_tenant(&tenant_id).await?;
    if !deleted {
        return Err(ApiError::NotFound);
    }
    state.rate_limiter.forget(tenant_id);

    Ok(Json(json!({
        "deleted": true,
        "documents_deleted": documents.len(),
    })))
}

/// `POST /internal/tenants/{tenant_id}/rotate-credential`
async fn rotate_credential(
    State(state): State<AppState>,
    _auth: InternalAuth,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let api_key = generate_api_key();
    let rotated = state
        .repository
        .rotate_tenant_credential(&tenant_id, &fingerprint(&api_key))
        .await?;
    if !rotated {
        return Err(ApiError::NotFound);
    }
    Ok(Json(json!({ "tenant_id": tenant_id, "api_key": api_key })))
}

/// `GET /internal/stats`
async fn stats(State(state): State<AppState>, _auth: InternalAuth) -> ApiResult<Json<Value>> {
    let stats = state.repository.service_stats().await?;
    let vector_count = state.vector_index.count().await?;

    Ok(Json(json!({
        "tenants": stats.tenants,
        "documents": stats.documents,
        "chunks": stats.chunks,
        "vectors": vector_count,
        "jobs": {
            "pending": stats.jobs_pending,
            "processing": stats.jobs_processing,
            "completed": stats.jobs_completed,
            "dead": stats.jobs_dead,
        },
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    pub tenant_id: Option<Uuid>,
    pub limit: Option<i64>,
}

/// `GET /internal/documents`
async fn list_documents(
    State(state): State<AppState>,
    _auth: InternalAuth,
    Query(query): Query<ListDocumentsQuery>,
) -> ApiResult<Json<Value>> {
    let documents = state
        .repository
        .list_documents(
            query.tenant_id.as_ref(),
            query.limit.unwrap_or(DEFAULT_DOCUMENT_LIMIT),
        )
        .await?;

    let listed: Vec<Value> = documents
        .iter()
        .map(|d| {
            json!({
                "document_id": d.document_id,
                "tenant_id": d.tenant_id,
                "filename": d.filename,
                "status": d.status.to_string(),
                "size_bytes": d.size_bytes,
                "failed_deletion": d.failed_deletion,
                "created_at": d.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "documents": listed })))
}

/// `GET /internal/documents/{document_id}`
async fn get_document(
    State(state): State<AppState>,
    _auth: InternalAuth,
    Path(document_id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = state
        .repository
        .get_document_any_tenant(&document_id)
        .await?
        .ok_or(ApiError::NotFound)?;

    Ok(Json(json!({
        "document_id": document.document_id,
        "tenant_id": document.tenant_id,
        "filename": document.filename,
        "blob_path": document.blob_path,
        "status": document.status.to_string(),
        "size_bytes": document.size_bytes,
        "metadata": document.metadata,
        "failed_deletion": document.failed_deletion,
        "error_message": document.error_message,
        "created_at": document.created_at,
        "updated_at": document.updated_at,
    })))
}

/// `POST /internal/search` - cross-tenant
async fn cross_tenant_search(
    State(state): State<AppState>,
    _auth: InternalAuth,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<Value>> {
    let correlation_id = CorrelationId::new();
    let query = request.into_query()?;

    let results = state.search.search_all_tenants(&query, &correlation_id).await?;
    let returned = results.len();

    Ok(Json(json!({
        "results": results,
        "metadata": { "returned": returned, "query": query.query },
    })))
}

/// `GET /internal/health`
async fn health(_auth: InternalAuth) -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /internal/auth`
async fn check_auth(_auth: InternalAuth) -> Json<Value> {
    Json(json!({ "authorized": true }))
}
