use std::time::{Duration, Instant};

use conductor_api::CorrelationId;
use reqwest::header::{HeaderValue, RETRY_AFTER, USER_AGENT};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::config::{TlsOptions, TransportConfig};
use crate::redact::sanitize_url;
use crate::retry::{
    backoff_delay, is_idempotent, is_retryable_error, is_retryable_status, parse_retry_after,
};
use crate::TransportError;

/// Correlation header injected on outbound requests.
pub const CORRELATION_HEADER: &str = "X-Correlation-ID";

/// Per-call options for [`Transport::send_with`].
#[derive(Clone, Debug, Default)]
pub struct CallOptions {
    /// Correlation id propagated as `X-Correlation-ID`.
    pub correlation: Option<CorrelationId>,
    /// Cooperative cancellation; checked before each attempt and during
    /// backoff waits.
    pub cancellation: Option<CancellationToken>,
}

impl CallOptions {
    /// Options carrying only a correlation id.
    pub fn correlated(correlation: CorrelationId) -> Self {
        CallOptions {
            correlation: Some(correlation),
            cancellation: None,
        }
    }
}

/// Retrying, logging, correlation-injecting outbound HTTP client.
///
/// One `Transport` wraps one connection pool and may be cloned cheaply.
/// Responses are returned to the caller whatever their status; the retry
/// policy only decides how many attempts are made before settling.
#[derive(Clone, Debug)]
pub struct Transport {
    client: reqwest::Client,
    config: TransportConfig,
}

impl Transport {
    /// Build a transport with default TLS settings.
    pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
        Self::with_tls(config, TlsOptions::default())
    }

    /// Build a transport with explicit TLS settings.
    pub fn with_tls(config: TransportConfig, tls: TlsOptions) -> Result<Self, TransportError> {
        config.validate()?;
        let builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(90));
        let builder = tls.apply(builder)?;
        let client = builder
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        Ok(Transport { client, config })
    }

    /// Start building a request against this transport's pool.
    pub fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    /// The configuration this transport was built with.
    pub fn config(&self) -> &TransportConfig {
        &self.config
    }

    /// Send a request with default options.
    pub async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response, TransportError> {
        self.send_with(request, CallOptions::default()).await
    }

    /// Send a request, retrying transient failures per the configured policy.
    ///
    /// Non-idempotent methods are attempted exactly once unless
    /// `allow_non_idempotent_retry` is set. The final response is returned
    /// whatever its status; transport errors surface after retries exhaust.
    pub async fn send_with(
        &self,
        mut request: reqwest::Request,
        options: CallOptions,
    ) -> Result<reqwest::Response, TransportError> {
        self.inject_headers(&mut request, options.correlation.as_ref());

        let cancel = options.cancellation.unwrap_or_default();
        let deadline = Instant::now() + self.config.timeout;
        let retryable_method =
            is_idempotent(request.method()) || self.config.allow_non_idempotent_retry;
        let max_attempts = if retryable_method {
            self.config.retry_attempts + 1
        } else {
            1
        };

        let method = request.method().clone();
        let url = sanitize_url(request.url().as_str());

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            if cancel.is_cancelled() {
                return Err(TransportError::Cancelled);
            }

            let this_try = match request.try_clone() {
                Some(cloned) => cloned,
                // Streaming bodies cannot be replayed; send the original and
                // settle with whatever comes back.
                None => {
                    return self
                        .observe(request, &method, &url, attempt)
                        .await
                        .map_err(TransportError::from)
                }
            };

            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                outcome = self.observe(this_try, &method, &url, attempt) => outcome,
            };

            let should_retry = match &outcome {
                Ok(response) => is_retryable_status(response.status()),
                Err(err) => is_retryable_error(err),
            };
            if !should_retry || attempt >= max_attempts {
                return outcome.map_err(TransportError::from);
            }

            let retry_after = match &outcome {
                Ok(response) => response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(parse_retry_after),
                Err(_) => None,
            };

            let mut delay = backoff_delay(
                self.config.base_backoff,
                self.config.max_backoff,
                attempt,
            );
            if let Some(hint) = retry_after {
                if hint < delay {
                    delay = hint;
                }
            }

            let now = Instant::now();
            if now + delay >= deadline {
                return outcome.map_err(TransportError::from);
            }
            drop(outcome);

            tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn inject_headers(&self, request: &mut reqwest::Request, correlation: Option<&CorrelationId>) {
        let headers = request.headers_mut();
        if !headers.contains_key(USER_AGENT) {
            if let Ok(value) = HeaderValue::from_str(&self.config.user_agent) {
                headers.insert(USER_AGENT, value);
            }
        }
        if let Some(correlation) = correlation {
            if let Ok(value) = HeaderValue::from_str(correlation.as_str()) {
                headers.insert(CORRELATION_HEADER, value);
            }
        }
    }

    /// Execute one attempt and emit the per-attempt log line.
    async fn observe(
        &self,
        request: reqwest::Request,
        method: &reqwest::Method,
        url: &str,
        attempt: u32,
    ) -> Result<reqwest::Response, reqwest::Error> {
        let started = Instant::now();
        let outcome = self.client.execute(request).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        match &outcome {
            Ok(response) if response.status().as_u16() >= 400 => {
                warn!(%method, url, status = response.status().as_u16(), attempt, elapsed_ms, "request failed");
            }
            Ok(response) => {
                debug!(%method, url, status = response.status().as_u16(), attempt, elapsed_ms, "request completed");
            }
            Err(err) => {
                warn!(%method, url, error = %err, attempt, elapsed_ms, "request errored");
            }
        }
        outcome
    }
}
