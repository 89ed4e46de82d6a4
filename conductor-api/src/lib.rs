//! Core data model shared by the Conductor observability crates.
//!
//! This crate carries the identifier, attribute, and status types that flow
//! between the tracing pipeline, the durable span store, the debug session
//! manager, and the HTTP surface. It has no I/O of its own.

mod correlation;
mod error;
mod ident;
mod span;
mod time;
mod value;

pub use correlation::{CorrelationId, InvalidCorrelationId};
pub use error::{TraceError, TraceResult};
pub use ident::{ParseIdError, SpanContext, SpanId, TraceFlags, TraceId, TraceState};
pub use span::{Event, SpanKind, Status};
pub use time::{Clock, SystemClock};
pub use value::{Key, KeyValue, Value};
