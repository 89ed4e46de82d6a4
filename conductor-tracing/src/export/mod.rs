//! Span exporters and the exportable span representation.

use std::borrow::Cow;
use std::fmt::Debug;
use std::time::SystemTime;

use async_trait::async_trait;
use conductor_api::{Event, KeyValue, SpanContext, SpanId, SpanKind, Status, TraceResult};

pub mod otlp;
pub mod storage;

/// Describes the result of an export.
pub type ExportResult = TraceResult<()>;

/// `SpanData` contains all the information collected by a span and is the
/// standard input to exporters.
#[derive(Clone, Debug, PartialEq)]
pub struct SpanData {
    /// Exportable span context.
    pub span_context: SpanContext,
    /// Span parent id, `SpanId::INVALID` for roots.
    pub parent_span_id: SpanId,
    /// Span kind.
    pub span_kind: SpanKind,
    /// Span name.
    pub name: Cow<'static, str>,
    /// Span start time.
    pub start_time: SystemTime,
    /// Span end time.
    pub end_time: SystemTime,
    /// Span attributes.
    pub attributes: Vec<KeyValue>,
    /// Span events.
    pub events: Vec<Event>,
    /// Span status.
    pub status: Status,
    /// Service that produced this span.
    pub service_name: Cow<'static, str>,
}

/// The interface protocol-specific exporters implement so they can be
/// plugged into the pipeline.
///
/// Exporters are expected to be simple encoders and transmitters; retry
/// behavior belongs to the transport underneath them.
#[async_trait]
pub trait SpanExporter: Send + Sync + Debug {
    /// Export a batch of ended spans.
    ///
    /// Implementations must not block indefinitely; the batch processor
    /// applies its own export deadline on top.
    async fn export(&self, batch: Vec<SpanData>) -> ExportResult;

    /// Release resources held by the exporter. Called once at shutdown.
    fn shutdown(&self) {}
}

/// Exporter that collects spans in memory for assertions in tests.
pub mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// In-memory [`SpanExporter`] for tests.
    #[derive(Clone, Debug, Default)]
    pub struct InMemorySpanExporter {
        spans: Arc<Mutex<Vec<SpanData>>>,
    }

    impl InMemorySpanExporter {
        /// Spans exported so far.
        pub fn exported(&self) -> Vec<SpanData> {
            self.spans.lock().unwrap().clone()
        }

        /// Drop everything collected so far.
        pub fn clear(&self) {
            self.spans.lock().unwrap().clear();
        }
    }

    #[async_trait]
    impl SpanExporter for InMemorySpanExporter {
        async fn export(&self, batch: Vec<SpanData>) -> ExportResult {
            self.spans.lock().unwrap().extend(batch);
            Ok(())
        }
    }
}
