use axum::http::HeaderMap;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::AppState;

/// Extract and verify the bearer token for an authenticated endpoint.
///
/// Missing or malformed credentials are 401; a token that does not match
/// the configured secret is 401 as well. When no secret is configured
/// (development mode) any well-formed token is accepted.
pub fn bearer_token(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("missing Authorization header".into()))?;
    let token = value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::Unauthorized("malformed bearer token".into()))?;
    if let Some(expected) = &state.config.auth_token {
        if token != expected {
            return Err(ApiError::Unauthorized("invalid token".into()));
        }
    }
    Ok(token.to_owned())
}

/// Derive a stable observer id from a bearer token.
///
/// The same client reconnecting gets the same observer id, so ownership
/// survives an SSE reconnect without storing tokens anywhere.
pub fn observer_id(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    let mut id = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        id.push_str(&format!("{byte:02x}"));
    }
    id
}
