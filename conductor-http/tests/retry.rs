//! Loopback-server tests for the transport's retry and header behavior.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{any, get};
use axum::Router;
use conductor_api::CorrelationId;
use conductor_http::{CallOptions, Transport, TransportConfig};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Default)]
struct ServerState {
    hits: Arc<AtomicUsize>,
    hit_times: Arc<Mutex<Vec<Instant>>>,
    seen_correlation: Arc<Mutex<Option<String>>>,
}

impl ServerState {
    fn record(&self, headers: &HeaderMap) -> usize {
        self.hit_times.lock().unwrap().push(Instant::now());
        if let Some(value) = headers.get("x-correlation-id") {
            *self.seen_correlation.lock().unwrap() =
                Some(value.to_str().unwrap_or_default().to_owned());
        }
        self.hits.fetch_add(1, Ordering::SeqCst) + 1
    }
}

async fn spawn_server(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

fn fast_config() -> TransportConfig {
    let mut config = TransportConfig::new("conductor-test/0.4");
    config.retry_attempts = 3;
    config.base_backoff = Duration::from_millis(100);
    config.max_backoff = Duration::from_secs(1);
    config.timeout = Duration::from_secs(10);
    config
}

#[tokio::test]
async fn retries_429_and_honors_retry_after() {
    let state = ServerState::default();
    let router = Router::new()
        .route(
            "/limited",
            get(
                |State(state): State<ServerState>, headers: HeaderMap| async move {
                    if state.record(&headers) == 1 {
                        (StatusCode::TOO_MANY_REQUESTS, [("Retry-After", "1")], "slow down")
                    } else {
                        (StatusCode::OK, [("Retry-After", "0")], "ok")
                    }
                },
            ),
        )
        .with_state(state.clone());
    let addr = spawn_server(router).await;

    let transport = Transport::new(fast_config()).unwrap();
    let request = transport
        .request(reqwest::Method::GET, &format!("http://{addr}/limited"))
        .build()
        .unwrap();
    let response = transport.send(request).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(state.hits.load(Ordering::SeqCst), 2);

    let times = state.hit_times.lock().unwrap();
    let gap = times[1] - times[0];
    assert!(gap >= Duration::from_millis(100), "gap {gap:?} too short");
    assert!(gap <= Duration::from_millis(1500), "gap {gap:?} too long");
}

#[tokio::test]
async fn non_idempotent_methods_get_one_attempt() {
    let state = ServerState::default();
    let router = Router::new()
        .route(
            "/flaky",
            any(|State(state): State<ServerState>, headers: HeaderMap| async move {
                state.record(&headers);
                StatusCode::INTERNAL_SERVER_ERROR
            }),
        )
        .with_state(state.clone());
    let addr = spawn_server(router).await;

    let transport = Transport::new(fast_config()).unwrap();
    let request = transport
        .request(reqwest::Method::POST, &format!("http://{addr}/flaky"))
        .body("payload")
        .build()
        .unwrap();
    let response = transport.send(request).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn non_idempotent_retry_can_be_opted_in() {
    let state = ServerState::default();
    let router = Router::new()
        .route(
            "/flaky",
            any(|State(state): State<ServerState>, headers: HeaderMap| async move {
                if state.record(&headers) < 3 {
                    StatusCode::SERVICE_UNAVAILABLE
                } else {
                    StatusCode::OK
                }
            }),
        )
        .with_state(state.clone());
    let addr = spawn_server(router).await;

    let mut config = fast_config();
    config.allow_non_idempotent_retry = true;
    let transport = Transport::new(config).unwrap();
    let request = transport
        .request(reqwest::Method::POST, &format!("http://{addr}/flaky"))
        .body("payload")
        .build()
        .unwrap();
    let response = transport.send(request).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(state.hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn bounded_attempts_on_persistent_failure() {
    let state = ServerState::default();
    let router = Router::new()
        .route(
            "/down",
            get(|State(state): State<ServerState>, headers: HeaderMap| async move {
                state.record(&headers);
                StatusCode::BAD_GATEWAY
            }),
        )
        .with_state(state.clone());
    let addr = spawn_server(router).await;

    let transport = Transport::new(fast_config()).unwrap();
    let request = transport
        .request(reqwest::Method::GET, &format!("http://{addr}/down"))
        .build()
        .unwrap();
    let response = transport.send(request).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    // initial attempt + 3 retries
    assert_eq!(state.hits.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn client_errors_are_not_retried() {
    let state = ServerState::default();
    let router = Router::new()
        .route(
            "/nope",
            get(|State(state): State<ServerState>, headers: HeaderMap| async move {
                state.record(&headers);
                StatusCode::NOT_FOUND
            }),
        )
        .with_state(state.clone());
    let addr = spawn_server(router).await;

    let transport = Transport::new(fast_config()).unwrap();
    let request = transport
        .request(reqwest::Method::GET, &format!("http://{addr}/nope"))
        .build()
        .unwrap();
    let response = transport.send(request).await.unwrap();

    assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cancellation_stops_retrying() {
    let state = ServerState::default();
    let router = Router::new()
        .route(
            "/down",
            get(|State(state): State<ServerState>, headers: HeaderMap| async move {
                state.record(&headers);
                StatusCode::SERVICE_UNAVAILABLE
            }),
        )
        .with_state(state.clone());
    let addr = spawn_server(router).await;

    let mut config = fast_config();
    config.base_backoff = Duration::from_secs(2);
    config.max_backoff = Duration::from_secs(2);
    let transport = Transport::new(config).unwrap();
    let request = transport
        .request(reqwest::Method::GET, &format!("http://{addr}/down"))
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let options = CallOptions {
        correlation: None,
        cancellation: Some(cancel.clone()),
    };
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cancel.cancel();
        }
    });

    let started = Instant::now();
    let err = transport.send_with(request, options).await.unwrap_err();
    assert!(matches!(err, conductor_http::TransportError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(state.hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn correlation_header_reaches_the_server() {
    let state = ServerState::default();
    let router = Router::new()
        .route(
            "/echo",
            get(|State(state): State<ServerState>, headers: HeaderMap| async move {
                state.record(&headers);
                StatusCode::OK
            }),
        )
        .with_state(state.clone());
    let addr = spawn_server(router).await;

    let transport = Transport::new(fast_config()).unwrap();
    let request = transport
        .request(reqwest::Method::GET, &format!("http://{addr}/echo"))
        .build()
        .unwrap();
    let correlation = CorrelationId::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
    transport
        .send_with(request, CallOptions::correlated(correlation))
        .await
        .unwrap();

    assert_eq!(
        state.seen_correlation.lock().unwrap().as_deref(),
        Some("550e8400-e29b-41d4-a716-446655440000")
    );
}
