//! The HTTP and SSE surface of the Conductor observability core.
//!
//! Assembles the axum router over the span store, the debug session
//! manager, and the metrics registry. Every response echoes
//! `X-Correlation-ID`; authenticated endpoints expect a bearer token.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use std::time::Instant;

use axum::routing::{get, post};
use axum::Router;
use conductor_debug::SessionManager;
use conductor_store::SpanStore;
use conductor_tracing::ConductorMetrics;
use tower_http::trace::TraceLayer;

/// Server-side settings the daemon wires in at startup.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Expected bearer token; `None` accepts any well-formed token.
    pub auth_token: Option<String>,
    /// Hard cap on concurrent SSE connections.
    pub sse_connection_cap: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::new(None)
    }
}

impl ServerConfig {
    /// Settings with the default connection cap.
    pub fn new(auth_token: Option<String>) -> Self {
        ServerConfig {
            auth_token,
            sse_connection_cap: 1000,
        }
    }
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// The durable span store.
    pub store: SpanStore,
    /// The debug session manager.
    pub sessions: Arc<SessionManager>,
    /// Metrics registry served on `/metrics`.
    pub metrics: Arc<ConductorMetrics>,
    /// Server settings.
    pub config: Arc<ServerConfig>,
    /// Live SSE connection count, bounded by the configured cap.
    pub sse_connections: Arc<AtomicUsize>,
    /// Process start, for uptime reporting.
    pub started_at: Instant,
}

impl AppState {
    /// Assemble the state.
    pub fn new(
        store: SpanStore,
        sessions: Arc<SessionManager>,
        metrics: Arc<ConductorMetrics>,
        config: ServerConfig,
    ) -> Self {
        AppState {
            store,
            sessions,
            metrics,
            config: Arc::new(config),
            sse_connections: Arc::new(AtomicUsize::new(0)),
            started_at: Instant::now(),
        }
    }
}

/// Build the full API router.
///
/// Serve it with connect-info so the debug endpoints can distinguish
/// localhost clients:
/// `axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>())`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/traces", get(handlers::traces::list_traces))
        .route("/v1/traces/:id", get(handlers::traces::get_trace))
        .route("/v1/traces/:id/spans", get(handlers::traces::get_trace_spans))
        .route("/v1/runs/:id/trace", get(handlers::traces::get_run_trace))
        .route("/v1/events", get(handlers::traces::list_events))
        .route("/v1/events/stream", get(handlers::debug::global_event_stream))
        .route("/v1/runs/:id/debug/events", get(handlers::debug::stream_events))
        .route("/v1/runs/:id/debug/command", post(handlers::debug::send_command))
        .route("/metrics", get(handlers::meta::metrics))
        .route("/v1/version", get(handlers::meta::version))
        .route("/v1/health", get(handlers::meta::health))
        .route("/health", get(handlers::meta::health))
        .layer(axum::middleware::from_fn(middleware::correlation))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
