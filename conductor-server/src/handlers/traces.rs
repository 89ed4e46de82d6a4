//! Trace and event query endpoints.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use conductor_api::{KeyValue, TraceId};
use conductor_store::{StoredEvent, StoredSpan, TraceFilter, TraceSummary};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::bearer_token;
use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListTracesQuery {
    status: Option<String>,
    since: Option<String>,
    until: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct TraceSummaryDto {
    trace_id: String,
    root_span_id: Option<String>,
    name: String,
    run_id: Option<String>,
    start_time_ns: i64,
    end_time_ns: Option<i64>,
    duration_ns: Option<i64>,
    status_code: String,
    span_count: i64,
    error_count: i64,
}

impl From<TraceSummary> for TraceSummaryDto {
    fn from(summary: TraceSummary) -> Self {
        TraceSummaryDto {
            trace_id: summary.trace_id.to_string(),
            root_span_id: summary.root_span_id.map(|id| id.to_string()),
            name: summary.name,
            run_id: summary.run_id,
            start_time_ns: summary.start_time_ns,
            end_time_ns: summary.end_time_ns,
            duration_ns: summary.duration_ns,
            status_code: summary.status_code,
            span_count: summary.span_count,
            error_count: summary.error_count,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SpanDto {
    trace_id: String,
    span_id: String,
    parent_span_id: Option<String>,
    name: String,
    kind: &'static str,
    start_time_ns: i64,
    end_time_ns: Option<i64>,
    status: StatusDto,
    attributes: Vec<KeyValue>,
    events: Vec<EventDto>,
}

#[derive(Debug, Serialize)]
pub struct StatusDto {
    code: &'static str,
    message: String,
}

#[derive(Debug, Serialize)]
pub struct EventDto {
    name: String,
    timestamp_ns: i64,
    attributes: Vec<KeyValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    span_id: Option<String>,
}

impl From<StoredSpan> for SpanDto {
    fn from(span: StoredSpan) -> Self {
        SpanDto {
            trace_id: span.trace_id.to_string(),
            span_id: span.span_id.to_string(),
            parent_span_id: span.parent_span_id.map(|id| id.to_string()),
            name: span.name,
            kind: span.kind.as_str(),
            start_time_ns: span.start_time_ns,
            end_time_ns: span.end_time_ns,
            status: StatusDto {
                code: span.status.code(),
                message: span.status.message().to_owned(),
            },
            attributes: span.attributes,
            events: span
                .events
                .into_iter()
                .map(|event| EventDto {
                    name: event.name,
                    timestamp_ns: event.timestamp_ns,
                    attributes: event.attributes,
                    span_id: None,
                })
                .collect(),
        }
    }
}

/// Parse a time bound: RFC 3339 or raw nanoseconds since the epoch.
fn parse_time(field: &str, value: Option<&str>) -> Result<Option<i64>, ApiError> {
    let Some(value) = value else { return Ok(None) };
    if let Ok(nanos) = value.parse::<i64>() {
        return Ok(Some(nanos));
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|dt| Some(dt.timestamp_nanos_opt().unwrap_or(0)))
        .map_err(|_| ApiError::Validation(format!("invalid {field} timestamp: {value:?}")))
}

fn parse_trace_id(raw: &str) -> Result<TraceId, ApiError> {
    TraceId::from_hex(raw).map_err(|_| ApiError::Validation(format!("invalid trace id: {raw:?}")))
}

/// `GET /v1/traces`
pub async fn list_traces(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListTracesQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    bearer_token(&state, &headers)?;
    let filter = TraceFilter {
        status: query.status,
        since_ns: parse_time("since", query.since.as_deref())?,
        until_ns: parse_time("until", query.until.as_deref())?,
        limit: query.limit.unwrap_or(0),
        offset: query.offset.unwrap_or(0),
    };
    let traces: Vec<TraceSummaryDto> = state
        .store
        .list_traces(&filter)
        .await?
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(Json(json!({ "traces": traces })))
}

/// `GET /v1/traces/{id}`
pub async fn get_trace(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trace_id): Path<String>,
) -> Result<Json<TraceSummaryDto>, ApiError> {
    bearer_token(&state, &headers)?;
    let trace_id = parse_trace_id(&trace_id)?;
    let summary = state
        .store
        .get_trace_summary(trace_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("trace not found: {trace_id}")))?;
    Ok(Json(summary.into()))
}

/// `GET /v1/traces/{id}/spans`
pub async fn get_trace_spans(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(trace_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    bearer_token(&state, &headers)?;
    let trace_id = parse_trace_id(&trace_id)?;
    let spans = state.store.get_trace_spans(trace_id).await?;
    if spans.is_empty() {
        return Err(ApiError::NotFound(format!("trace not found: {trace_id}")));
    }
    let spans: Vec<SpanDto> = spans.into_iter().map(Into::into).collect();
    Ok(Json(json!({ "trace_id": trace_id.to_string(), "spans": spans })))
}

/// `GET /v1/runs/{id}/trace`
pub async fn get_run_trace(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    bearer_token(&state, &headers)?;
    let trace_id = state
        .store
        .get_trace_by_run_id(&run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("no trace for run: {run_id}")))?;
    Ok(Json(json!({ "run_id": run_id, "trace_id": trace_id.to_string() })))
}

#[derive(Debug, Deserialize)]
pub struct ListEventsQuery {
    trace_id: Option<String>,
    since: Option<String>,
}

/// `GET /v1/events`
pub async fn list_events(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListEventsQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    bearer_token(&state, &headers)?;
    let trace_id = query
        .trace_id
        .as_deref()
        .ok_or_else(|| ApiError::Validation("trace_id query parameter is required".into()))?;
    let trace_id = parse_trace_id(trace_id)?;
    let since_ns = parse_time("since", query.since.as_deref())?;
    let events: Vec<EventDto> = state
        .store
        .list_trace_events(trace_id, since_ns)
        .await?
        .into_iter()
        .map(|(span_id, event): (conductor_api::SpanId, StoredEvent)| EventDto {
            name: event.name,
            timestamp_ns: event.timestamp_ns,
            attributes: event.attributes,
            span_id: Some(span_id.to_string()),
        })
        .collect();
    Ok(Json(json!({ "trace_id": trace_id.to_string(), "events": events })))
}
