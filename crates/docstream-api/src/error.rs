//! HTTP error mapping for the docstream API
//!
//! Every failure becomes an [`ApiError`], which renders as a JSON body
//! with the status codes from the service contract: 400 validation,
//! 401 unknown credential, 403 internal scope required, 404 not visible,
//! 413 oversize, 429 rate limited (with Retry-After), 500 internal,
//! 503 downstream unavailable.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;

use docstream_common::Retryable;
use docstream_meta_data::DatabaseError;
use docstream_pipeline::PipelineError;
use docstream_search::SearchError;
use docstream_vector_data::VectorDataError;

/// A specialized `Result` type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// The error surface of the HTTP API
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed input: bad multipart shape, oversized bulk, bad JSON
    #[error("{0}")]
    Validation(String),

    /// Missing or unknown tenant credential
    #[error("unknown or missing credential")]
    Unauthorized,

    /// Internal scope required
    #[error("internal scope required")]
    Forbidden,

    /// Resource absent or not visible to this tenant
    #[error("not found")]
    NotFound,

    /// Upload exceeds the configured size limit
    #[error("file exceeds maximum size of {max_bytes} bytes")]
    PayloadTooLarge { max_bytes: usize },

    /// Tenant exceeded its sliding-window limit
    #[error("rate limit exceeded")]
    RateLimited { retry_after_ms: u64 },

    /// Invariant breakage or unexpected internal failure
    #[error("internal error")]
    Internal(String),

    /// A backing store is down; the request may succeed later
    #[error("service unavailable")]
    Unavailable(String),
}

impl ApiError {
    const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Internal detail goes to the log, not the client
        if let Self::Internal(detail) | Self::Unavailable(detail) = &self {
            tracing::error!(status = %status, "{detail}");
        }

        let mut response = (status, Json(json!({ "error": self.to_string() }))).into_response();

        if let Self::RateLimited { retry_after_ms } = self {
            let seconds = retry_after_ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }

        response
    }
}

impl From<DatabaseError> for ApiError {
    fn from(e: DatabaseError) -> Self {
        if e.is_transient() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        if e.is_transient() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }
}

impl From<SearchError> for ApiError {
    fn from(e: SearchError) -> Self {
        match &e {
            // A cross-tenant result is an assertion failure: 500, logged,
            // never filtered.
            SearchError::Vector(VectorDataError::IsolationViolation { .. }) => {
                Self::Internal(e.to_string())
            }
            _ if e.is_transient() => Self::Unavailable(e.to_string()),
            _ => Self::Internal(e.to_string()),
        }
    }
}

impl From<VectorDataError> for ApiError {
    fn from(e: VectorDataError) -> Self {
        if e.is_transient() {
            Self::Unavailable(e.to_string())
        } else {
            Self::Internal(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_the_contract() {
        assert_eq!(ApiError::Validation(String::new()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::PayloadTooLarge { max_bytes: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ApiError::RateLimited { retry_after_ms: 1 }.status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Internal(String::new()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ApiError::Unavailable(String::new()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
