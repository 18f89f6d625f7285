//! Upload endpoints
//!
//! `POST /upload/single` accepts one multipart file; `POST /upload/bulk`
//! accepts up to the configured limit, each file enqueued independently.
//! The surface's only obligations are authentication, rate limiting, size
//! validation, and handing the bytes to the dispatcher.

use axum::Json;
use axum::extract::{Multipart, State};
use serde::Serialize;
use uuid::Uuid;

use docstream_pipeline::UploadRequest;

use crate::auth::TenantAuth;
use crate::error::{ApiError, ApiResult};
use crate::routes::check_rate_limit;
use crate::state::AppState;

/// Response for an accepted upload
#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub document_id: Uuid,
    pub status: String,
}

/// Pull file parts (and an optional `metadata` JSON part) from a
/// multipart body
async fn read_uploads(
    state: &AppState,
    multipart: &mut Multipart,
    max_files: usize,
) -> ApiResult<Vec<UploadRequest>> {
    let mut uploads = Vec::new();
    let mut metadata = serde_json::json!({});

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
    {
        if field.name() == Some("metadata") {
            let raw = field
                .text()
                .await
                .map_err(|e| ApiError::Validation(format!("unreadable metadata field: {e}")))?;
            metadata = serde_json::from_str(&raw)
                .map_err(|e| ApiError::Validation(format!("metadata is not valid JSON: {e}")))?;
            continue;
        }

        let Some(filename) = field.file_name().map(ToString::to_string) else {
            continue;
        };
        if filename.is_empty() {
            return Err(ApiError::Validation("file part without a filename".to_string()));
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::Validation(format!("unreadable file part: {e}")))?;

        if bytes.len() > state.config.api.max_file_size_bytes {
            return Err(ApiError::PayloadTooLarge {
                max_bytes: state.config.api.max_file_size_bytes,
            });
        }

        if uploads.len() >= max_files {
            return Err(ApiError::Validation(format!(
                "at most {max_files} files per request"
            )));
        }

        uploads.push(UploadRequest {
            filename,
            bytes,
            metadata: serde_json::json!({}),
        });
    }

    if uploads.is_empty() {
        return Err(ApiError::Validation("no file part in request".to_string()));
    }

    // Request-level metadata applies to every file in the batch
    for upload in &mut uploads {
        upload.metadata = metadata.clone();
    }

    Ok(uploads)
}

/// `POST /upload/single`
pub async fn upload_single(
    State(state): State<AppState>,
    auth: TenantAuth,
    mut multipart: Multipart,
) -> ApiResult<Json<UploadResponse>> {
    check_rate_limit(&state, &auth.tenant)?;

    let mut uploads = read_uploads(&state, &mut multipart, 1).await?;
    let upload = uploads.remove(0);

    let document = state.ingest.ingest(auth.tenant.tenant_id, upload).await?;

    Ok(Json(UploadResponse {
        document_id: document.document_id,
        status: document.status.to_string(),
    }))
}

/// `POST /upload/bulk`
pub async fn upload_bulk(
    State(state): State<AppState>,
    auth: TenantAuth,
    mut multipart: Multipart,
) -> ApiResult<Json<Vec<UploadResponse>>> {
    check_rate_limit(&state, &auth.tenant)?;

    let uploads = read_uploads(&state, &mut multipart, state.config.api.bulk_upload_limit).await?;

    let mut responses = Vec::with_capacity(uploads.len());
    for upload in uploads {
        let document = state.ingest.ingest(auth.tenant.tenant_id, upload).await?;
        responses.push(UploadResponse {
            document_id: document.document_id,
            status: document.status.to_string(),
        });
    }

    Ok(Json(responses))
}
