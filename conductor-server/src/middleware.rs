//! Correlation-id middleware.
//!
//! Extracts `X-Correlation-ID` (preferred) or `X-Request-ID` from the
//! request, rejects invalid values with 400 before the handler runs,
//! generates a fresh id when none is present, stores the id on the
//! request extensions, and echoes it on every response. Running the
//! middleware twice over a request with a valid header is idempotent.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use conductor_api::CorrelationId;

use crate::error::ApiError;

/// Primary correlation header, shared with the outbound transport.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";
/// Fallback header accepted on ingress.
pub const REQUEST_ID_HEADER: &str = "X-Request-ID";

/// The middleware function; install with `axum::middleware::from_fn`.
pub async fn correlation(mut request: Request, next: Next) -> Response {
    let incoming = request
        .headers()
        .get(CORRELATION_HEADER)
        .or_else(|| request.headers().get(REQUEST_ID_HEADER))
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let correlation_id = match incoming {
        Some(raw) => match CorrelationId::parse(&raw) {
            Ok(id) => id,
            Err(_) => {
                return ApiError::Validation(format!("invalid correlation id: {raw:?}"))
                    .into_response();
            }
        },
        None => CorrelationId::generate(),
    };

    request.extensions_mut().insert(correlation_id.clone());
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(correlation_id.as_str()) {
        response.headers_mut().insert(CORRELATION_HEADER, value);
    }
    response
}
