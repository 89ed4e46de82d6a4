//! Debug SSE streaming and command ingress.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::Json;
use conductor_debug::{CommandType, DebugCommand, DebugEvent, SessionState};
use conductor_store::unix_nanos;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tracing::{debug, warn};

use crate::auth::{bearer_token, observer_id};
use crate::error::ApiError;
use crate::AppState;

/// Interval between heartbeat events on an otherwise idle stream.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    session_id: Option<String>,
}

/// Non-localhost debug traffic must arrive over TLS, either directly or
/// behind a terminating proxy that sets `X-Forwarded-Proto`.
fn require_secure(addr: &SocketAddr, headers: &HeaderMap) -> Result<(), ApiError> {
    if addr.ip().is_loopback() {
        return Ok(());
    }
    let forwarded = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok());
    if forwarded == Some("https") {
        Ok(())
    } else {
        Err(ApiError::Forbidden(
            "debug endpoints require TLS for non-localhost clients".into(),
        ))
    }
}

/// Shared preconditions of both debug endpoints, in order: TLS, bearer
/// auth, session_id parameter, session existence, run/session match.
async fn checked_session(
    state: &AppState,
    addr: &SocketAddr,
    headers: &HeaderMap,
    run_id: &str,
    query: SessionQuery,
) -> Result<(String, conductor_debug::DebugSession), ApiError> {
    require_secure(addr, headers)?;
    let token = bearer_token(state, headers)?;
    let session_id = query
        .session_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::Validation("session_id query parameter is required".into()))?;
    let session = state.sessions.get_session(&session_id).await?;
    if session.run_id != run_id {
        return Err(ApiError::Forbidden(format!(
            "session {session_id} does not belong to run {run_id}"
        )));
    }
    Ok((token, session))
}

/// Releases the connection slot and observer registration when the SSE
/// stream ends, however it ends.
struct StreamGuard {
    state: AppState,
    session_id: String,
    observer_id: String,
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.state.sse_connections.fetch_sub(1, Ordering::SeqCst);
        self.state.metrics.sse_subscribers.dec();
        let sessions = self.state.sessions.clone();
        let session_id = std::mem::take(&mut self.session_id);
        let observer_id = std::mem::take(&mut self.observer_id);
        tokio::spawn(async move {
            let _ = sessions.remove_observer(&session_id, &observer_id).await;
            debug!(session_id, observer_id, "observer disconnected");
        });
    }
}

fn data_event(event: &DebugEvent) -> Option<SseEvent> {
    match serde_json::to_string(event) {
        Ok(body) => Some(SseEvent::default().data(body)),
        Err(err) => {
            // One unserializable event must not kill the stream.
            warn!(error = %err, "failed to serialize debug event");
            None
        }
    }
}

fn heartbeat_event() -> SseEvent {
    let body = json!({
        "type": "heartbeat",
        "timestamp": unix_nanos(std::time::SystemTime::now()),
    });
    SseEvent::default().data(body.to_string())
}

/// `GET /v1/runs/{id}/debug/events?session_id=…`
///
/// Replays the buffered history, then streams live events with
/// heartbeats interleaved whenever the stream is idle for 30 seconds.
pub async fn stream_events(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(run_id): Path<String>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let (token, session) = checked_session(&state, &addr, &headers, &run_id, query).await?;
    let session_id = session.session_id.clone();

    let cap = state.config.sse_connection_cap;
    if state.sse_connections.fetch_add(1, Ordering::SeqCst) >= cap {
        state.sse_connections.fetch_sub(1, Ordering::SeqCst);
        return Err(ApiError::Unavailable(
            "SSE connection limit reached".into(),
        ));
    }

    // First observer on a session becomes owner; later ones watch.
    let observer_id = observer_id(&token);
    if let Err(err) = state
        .sessions
        .add_observer(&session_id, &observer_id, true)
        .await
    {
        state.sse_connections.fetch_sub(1, Ordering::SeqCst);
        return Err(err.into());
    }
    state.metrics.sse_subscribers.inc();
    let guard = StreamGuard {
        state: state.clone(),
        session_id: session_id.clone(),
        observer_id,
    };

    let replay = state.sessions.get_event_buffer(&session_id).await?;
    let mut live = state.sessions.subscribe(&session_id).await?;

    let (tx, rx) = mpsc::channel::<Result<SseEvent, Infallible>>(64);
    tokio::spawn(async move {
        // Guard lives for the whole pump; dropping it deregisters us.
        let _guard = guard;

        for event in &replay {
            if let Some(sse) = data_event(event) {
                if tx.send(Ok(sse)).await.is_err() {
                    return;
                }
            }
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                _ = tx.closed() => return,
                received = live.recv() => match received {
                    Ok(event) => {
                        if let Some(sse) = data_event(&event) {
                            if tx.send(Ok(sse)).await.is_err() {
                                return;
                            }
                            heartbeat.reset();
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "SSE subscriber lagged behind the event stream");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => return,
                },
                _ = heartbeat.tick() => {
                    if tx.send(Ok(heartbeat_event())).await.is_err() {
                        return;
                    }
                }
            }
        }
    });

    Ok(sse_response(ReceiverStream::new(rx)))
}

/// `GET /v1/events/stream`: heartbeat-only stream, a hook for future
/// global event fan-out.
pub async fn global_event_stream(
    State(_state): State<AppState>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<SseEvent, Infallible>>(8);
    tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = tx.closed() => return,
                _ = heartbeat.tick() => {
                    if tx.send(Ok(heartbeat_event())).await.is_err() {
                        return;
                    }
                }
            }
        }
    });
    sse_response(ReceiverStream::new(rx))
}

fn sse_response<S>(stream: S) -> Sse<S>
where
    S: Stream<Item = Result<SseEvent, Infallible>> + Send + 'static,
{
    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// `POST /v1/runs/{id}/debug/command?session_id=…`
pub async fn send_command(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Path(run_id): Path<String>,
    Query(query): Query<SessionQuery>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let (token, session) = checked_session(&state, &addr, &headers, &run_id, query).await?;
    let session_id = session.session_id.clone();

    let observer_id = observer_id(&token);
    if !state.sessions.is_observer(&session_id, &observer_id).await? {
        return Err(ApiError::Forbidden(
            "caller is not an observer of this session".into(),
        ));
    }
    if !state.sessions.is_owner(&session_id, &observer_id).await? {
        return Err(ApiError::Forbidden(
            "only the session owner may send commands".into(),
        ));
    }

    let command_name = body
        .get("type")
        .and_then(|value| value.as_str())
        .ok_or_else(|| ApiError::Validation("command body must carry a type field".into()))?;
    let command: CommandType = command_name
        .parse()
        .map_err(|_| ApiError::Validation(format!("unrecognized command: {command_name:?}")))?;

    if session.state != SessionState::Paused {
        return Err(ApiError::State(format!(
            "commands require a paused session; session is {}",
            session.state
        )));
    }

    state
        .sessions
        .send_command(
            &session_id,
            DebugCommand {
                command,
                payload: body.get("payload").cloned(),
            },
        )
        .await?;

    Ok(Json(json!({ "status": "acknowledged", "command": command.as_str() })))
}
