use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// User-visible API errors, mapped onto HTTP status codes.
///
/// Infrastructure failures are logged with their detail and surface as an
/// opaque 500; everything else carries its message to the client.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    /// Malformed input.
    #[error("{0}")]
    Validation(String),

    /// Missing or malformed credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed.
    #[error("{0}")]
    Forbidden(String),

    /// Unknown session, trace, or run.
    #[error("{0}")]
    NotFound(String),

    /// Valid input rejected by the session state machine.
    #[error("{0}")]
    State(String),

    /// A per-session capacity limit was hit.
    #[error("{0}")]
    Capacity(String),

    /// A service-wide capacity limit was hit.
    #[error("{0}")]
    Unavailable(String),

    /// Database or export failure; detail stays in the logs.
    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::State(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Capacity(_) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                error!(%detail, "internal error");
                "internal error".to_owned()
            }
            other => other.to_string(),
        };
        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                header::HeaderValue::from_static("Bearer"),
            );
        }
        response
    }
}

impl From<conductor_store::StoreError> for ApiError {
    fn from(err: conductor_store::StoreError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<conductor_debug::SessionError> for ApiError {
    fn from(err: conductor_debug::SessionError) -> Self {
        use conductor_debug::SessionError;
        match err {
            SessionError::NotFound(id) => ApiError::NotFound(format!("session not found: {id}")),
            SessionError::InvalidTransition { .. } => ApiError::State(err.to_string()),
            SessionError::ObserverLimit(..) => ApiError::Capacity(err.to_string()),
            SessionError::MailboxFull(_) => ApiError::Capacity(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_error_kinds() {
        assert_eq!(
            ApiError::Validation("x".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::Forbidden("x".into()).status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::State("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Capacity("x".into()).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::Unavailable("x".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::Internal("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
