//! Credential handling and request authentication
//!
//! Two scopes:
//! - `X-API-Key` resolves through a SHA-256 fingerprint to a tenant row;
//!   every downstream query carries that tenant id.
//! - `X-Internal-Token` is compared in constant time against the deploy
//!   secret and grants cross-tenant admin access.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use docstream_meta_data::Tenant;

use crate::error::ApiError;
use crate::state::AppState;

pub const API_KEY_HEADER: &str = "x-api-key";
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

/// Lowercase hex SHA-256 of an API key. Only fingerprints are stored or
/// compared; raw keys never touch the database.
pub fn fingerprint(api_key: &str) -> String {
    let digest = Sha256::digest(api_key.as_bytes());
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

/// Generate a fresh tenant API key
pub fn generate_api_key() -> String {
    format!("ds_{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple())
}

/// Constant-time byte comparison; runtime depends only on input length
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0_u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extractor for tenant-scoped requests
#[derive(Debug, Clone)]
pub struct TenantAuth {
    pub tenant: Tenant,
}

impl FromRequestParts<AppState> for TenantAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let api_key = parts
            .headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        let tenant = state
            .repository
            .get_tenant_by_fingerprint(&fingerprint(api_key))
            .await?
            .ok_or(ApiError::Unauthorized)?;

        Ok(Self { tenant })
    }
}

/// Extractor for internal admin requests
#[derive(Debug, Clone, Copy)]
pub struct InternalAuth;

impl FromRequestParts<AppState> for InternalAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.config.api.internal_token.as_bytes();
        // An unset secret disables the internal surface outright
        if expected.is_empty() {
            return Err(ApiError::Forbidden);
        }

        let provided = parts
            .headers
            .get(INTERNAL_TOKEN_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Forbidden)?;

        if constant_time_eq(provided.as_bytes(), expected) {
            Ok(Self)
        } else {
            Err(ApiError::Forbidden)
        }
    }
}
