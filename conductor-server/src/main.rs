//! The Conductor observability daemon.
//!
//! Wires the durable store, the debug session manager, the tracing
//! pipeline (storage exporter plus optional OTLP), the retention loops,
//! and the HTTP/SSE surface, then serves until ctrl-c.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use conductor_debug::{spawn_cleanup, SessionManager, SessionManagerConfig};
use conductor_server::{router, AppState, ServerConfig};
use conductor_store::{spawn_retention, RetentionConfig, SpanStore, StoreConfig};
use conductor_tracing::export::otlp::OtlpSpanExporter;
use conductor_tracing::export::storage::StorageSpanExporter;
use conductor_tracing::{BatchConfig, ConductorMetrics, TracerProvider};
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_path =
        std::env::var("CONDUCTOR_DB_PATH").unwrap_or_else(|_| "conductor-traces.db".to_owned());
    let bind: SocketAddr = std::env::var("CONDUCTOR_BIND")
        .unwrap_or_else(|_| "127.0.0.1:8585".to_owned())
        .parse()?;
    let auth_token = std::env::var("CONDUCTOR_API_TOKEN").ok();

    let store = SpanStore::open(StoreConfig::new(&db_path)).await?;
    info!(db_path, encrypted = store.is_encrypted(), "span store ready");

    let retention = spawn_retention(store.clone(), RetentionConfig::default());

    let sessions = Arc::new(SessionManager::new(
        store.clone(),
        SessionManagerConfig::default(),
    ));
    let session_cleanup = spawn_cleanup(sessions.clone(), Duration::from_secs(60));

    let metrics = Arc::new(ConductorMetrics::new()?);

    let mut provider_builder = TracerProvider::builder()
        .with_batch_exporter(StorageSpanExporter::new(store.clone()), BatchConfig::default());
    if let Ok(endpoint) = std::env::var("CONDUCTOR_OTLP_ENDPOINT") {
        let exporter = OtlpSpanExporter::builder()
            .with_endpoint(&endpoint)
            .with_insecure(std::env::var("CONDUCTOR_OTLP_INSECURE").is_ok())
            .build()?;
        info!(endpoint, "OTLP export enabled");
        provider_builder = provider_builder.with_batch_exporter(exporter, BatchConfig::default());
    }
    let provider = provider_builder.build();

    let state = AppState::new(
        store,
        sessions,
        metrics,
        ServerConfig::new(auth_token),
    );
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(%bind, "conductor daemon listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutting down");
    })
    .await?;

    provider.shutdown().await;
    retention.shutdown();
    session_cleanup.cancel();
    Ok(())
}
