use std::io;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use reqwest::{Method, StatusCode};

/// Longest server-provided delay the transport will honor.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(600);

/// Whether a method may be retried without an explicit opt-in.
pub(crate) fn is_idempotent(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD | Method::OPTIONS)
}

/// Whether a response status signals a transient server condition.
pub(crate) fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

/// Whether a transport-level error is worth another attempt.
///
/// Covers timeouts, connect failures (DNS, refused), and connection
/// resets / unexpected EOF surfaced through the source chain.
pub(crate) fn is_retryable_error(err: &reqwest::Error) -> bool {
    if err.is_timeout() || err.is_connect() {
        return true;
    }
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return matches!(
                io_err.kind(),
                io::ErrorKind::ConnectionRefused
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::TimedOut
            );
        }
        source = cause.source();
    }
    false
}

/// Exponential delay for 1-based attempt `i` with uniform jitter.
///
/// The deterministic part is `min(max_backoff, base * 2^(i-1))`; the jitter
/// adds up to 20% of that on top, so the result lands in
/// `[delay, 1.2 * delay]`.
pub(crate) fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let exp = base.saturating_mul(1u32 << attempt.saturating_sub(1).min(20));
    let capped = exp.min(max);
    let jitter = capped.mul_f64(rand::thread_rng().gen_range(0.0..=0.2));
    capped + jitter
}

/// Parse a `Retry-After` header value: delay seconds or an HTTP date.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds).min(MAX_RETRY_AFTER));
    }
    let date = chrono::DateTime::parse_from_rfc2822(value).ok()?;
    let delta = date.signed_duration_since(Utc::now());
    let delay = delta.to_std().unwrap_or(Duration::ZERO);
    Some(delay.min(MAX_RETRY_AFTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_methods() {
        assert!(is_idempotent(&Method::GET));
        assert!(is_idempotent(&Method::HEAD));
        assert!(is_idempotent(&Method::OPTIONS));
        assert!(!is_idempotent(&Method::POST));
        assert!(!is_idempotent(&Method::PUT));
        assert!(!is_idempotent(&Method::DELETE));
    }

    #[test]
    fn retryable_statuses() {
        for code in [500u16, 502, 503, 599, 408, 429] {
            assert!(is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
        for code in [200u16, 400, 401, 403, 404, 409] {
            assert!(!is_retryable_status(StatusCode::from_u16(code).unwrap()));
        }
    }

    #[test]
    fn backoff_delay_stays_within_jitter_band() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(5);
        for attempt in 1..=6u32 {
            let expected = base
                .saturating_mul(1 << (attempt - 1))
                .min(max);
            for _ in 0..50 {
                let delay = backoff_delay(base, max, attempt);
                assert!(delay >= expected, "attempt {attempt}: {delay:?} < {expected:?}");
                assert!(
                    delay <= expected.mul_f64(1.2) + Duration::from_millis(1),
                    "attempt {attempt}: {delay:?} above jitter band"
                );
            }
        }
    }

    #[test]
    fn backoff_delay_clamps_to_max() {
        let base = Duration::from_secs(1);
        let max = Duration::from_secs(2);
        let delay = backoff_delay(base, max, 10);
        assert!(delay <= max.mul_f64(1.2) + Duration::from_millis(1));
    }

    #[test]
    fn retry_after_seconds() {
        assert_eq!(parse_retry_after("1"), Some(Duration::from_secs(1)));
        assert_eq!(parse_retry_after(" 30 "), Some(Duration::from_secs(30)));
        assert_eq!(parse_retry_after("900"), Some(Duration::from_secs(600)));
    }

    #[test]
    fn retry_after_http_date() {
        let future = Utc::now() + chrono::Duration::seconds(90);
        let header = future.to_rfc2822();
        let parsed = parse_retry_after(&header).unwrap();
        assert!(parsed <= Duration::from_secs(91));
        assert!(parsed >= Duration::from_secs(85));
    }

    #[test]
    fn retry_after_past_date_is_zero() {
        let past = Utc::now() - chrono::Duration::seconds(90);
        assert_eq!(parse_retry_after(&past.to_rfc2822()), Some(Duration::ZERO));
    }

    #[test]
    fn retry_after_garbage() {
        assert_eq!(parse_retry_after("soon"), None);
    }
}
