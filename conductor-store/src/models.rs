use std::time::{Duration, SystemTime};

use conductor_api::{Event, KeyValue, SpanId, SpanKind, Status, TraceId};
use serde::{Deserialize, Serialize};

/// Attribute key the runner sets on workflow root spans; denormalized into
/// the trace summary so runs can be looked up without touching encrypted
/// blobs.
pub const RUN_ID_ATTRIBUTE: &str = "workflow.run_id";

/// Nanoseconds since the unix epoch for a wall-clock instant.
pub fn unix_nanos(time: SystemTime) -> i64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}

/// The inverse of [`unix_nanos`].
pub fn system_time(nanos: i64) -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_nanos(nanos.max(0) as u64)
}

/// A span in its durable representation.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredSpan {
    /// Trace this span belongs to.
    pub trace_id: TraceId,
    /// Span identifier, unique within the trace.
    pub span_id: SpanId,
    /// Parent span, absent for roots.
    pub parent_span_id: Option<SpanId>,
    /// Span name.
    pub name: String,
    /// Span kind.
    pub kind: SpanKind,
    /// Start instant, nanoseconds since the unix epoch.
    pub start_time_ns: i64,
    /// End instant; absent while the span is in flight.
    pub end_time_ns: Option<i64>,
    /// Final status.
    pub status: Status,
    /// Attributes recorded on the span.
    pub attributes: Vec<KeyValue>,
    /// Events recorded on the span, in insertion order.
    pub events: Vec<StoredEvent>,
}

impl StoredSpan {
    /// The value of the run-id attribute, if the span carries one.
    pub fn run_id(&self) -> Option<&str> {
        self.attributes
            .iter()
            .find(|kv| kv.key.as_str() == RUN_ID_ATTRIBUTE)
            .and_then(|kv| kv.value.as_str())
    }
}

/// An event in its durable representation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StoredEvent {
    /// Event name.
    pub name: String,
    /// Event instant, nanoseconds since the unix epoch.
    pub timestamp_ns: i64,
    /// Event attributes.
    pub attributes: Vec<KeyValue>,
}

impl From<&Event> for StoredEvent {
    fn from(event: &Event) -> Self {
        StoredEvent {
            name: event.name.to_string(),
            timestamp_ns: unix_nanos(event.timestamp),
            attributes: event.attributes.clone(),
        }
    }
}

/// Aggregate over every span sharing a trace id, rewritten on each write.
#[derive(Clone, Debug, PartialEq)]
pub struct TraceSummary {
    /// The trace id.
    pub trace_id: TraceId,
    /// Root span id, when a root has been stored.
    pub root_span_id: Option<SpanId>,
    /// Root span name.
    pub name: String,
    /// Denormalized run id, when the root span carries one.
    pub run_id: Option<String>,
    /// Earliest span start in the trace.
    pub start_time_ns: i64,
    /// Latest span end; absent while any span is in flight.
    pub end_time_ns: Option<i64>,
    /// `end - start` once the trace has fully ended.
    pub duration_ns: Option<i64>,
    /// Status code of the root span.
    pub status_code: String,
    /// Number of spans stored for the trace.
    pub span_count: i64,
    /// Number of spans with an error status.
    pub error_count: i64,
    /// First write instant.
    pub created_at_ns: i64,
    /// Last write instant.
    pub updated_at_ns: i64,
}

/// Filter for [`SpanStore::list_traces`](crate::SpanStore::list_traces).
#[derive(Clone, Debug, Default)]
pub struct TraceFilter {
    /// Only traces whose root status code matches.
    pub status: Option<String>,
    /// Only traces starting at or after this instant.
    pub since_ns: Option<i64>,
    /// Only traces starting at or before this instant.
    pub until_ns: Option<i64>,
    /// Page size; zero means the default of 100.
    pub limit: i64,
    /// Page offset.
    pub offset: i64,
}

/// A debug session in its durable representation.
///
/// Breakpoints and the event buffer are JSON-encoded by the session
/// manager; the store treats them as opaque text.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionRecord {
    /// Unique session identifier.
    pub session_id: String,
    /// The run being debugged.
    pub run_id: String,
    /// Step the run is currently executing.
    pub current_step_id: Option<String>,
    /// State-machine state name.
    pub state: String,
    /// JSON-encoded breakpoint set.
    pub breakpoints_json: String,
    /// JSON-encoded bounded event buffer.
    pub event_buffer_json: String,
    /// Last mutation instant.
    pub last_activity_ns: i64,
    /// Creation instant.
    pub created_at_ns: i64,
    /// Hard expiry instant.
    pub expires_at_ns: i64,
}
