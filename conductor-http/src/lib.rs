//! Outbound HTTP transport shared by Conductor's exporters and workflow
//! steps.
//!
//! The transport wraps a [`reqwest::Client`] with the behavior every
//! outbound call in the daemon needs: a TLS 1.2 floor, correlation-id and
//! user-agent header injection, jittered exponential retries that honor
//! `Retry-After`, an idempotency policy, and per-attempt structured logs
//! with sensitive query parameters redacted.

mod client;
mod config;
mod redact;
mod retry;

pub use client::{CallOptions, Transport, CORRELATION_HEADER};
pub use config::{TlsOptions, TlsOptionsBuilder, TlsVersion, TransportConfig};
pub use redact::sanitize_url;

/// Errors surfaced by the transport.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum TransportError {
    /// The transport configuration was rejected at construction.
    #[error("invalid transport configuration: {0}")]
    Config(String),

    /// The call's cancellation token fired.
    #[error("request cancelled")]
    Cancelled,

    /// The underlying client failed after retries were exhausted.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}
