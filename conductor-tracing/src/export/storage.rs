//! Exporter that persists spans into the durable span store.

use async_trait::async_trait;
use conductor_api::SpanId;
use conductor_store::{unix_nanos, SpanStore, StoredEvent, StoredSpan};
use tracing::warn;

use super::{ExportResult, SpanData, SpanExporter};

/// Converts ended spans to their durable representation and writes them
/// through [`SpanStore::store_span`].
///
/// One bad span never blocks the batch: per-span failures are logged and
/// skipped.
#[derive(Clone, Debug)]
pub struct StorageSpanExporter {
    store: SpanStore,
}

impl StorageSpanExporter {
    /// Wrap a span store.
    pub fn new(store: SpanStore) -> Self {
        StorageSpanExporter { store }
    }
}

fn to_stored(span: &SpanData) -> StoredSpan {
    StoredSpan {
        trace_id: span.span_context.trace_id(),
        span_id: span.span_context.span_id(),
        parent_span_id: (span.parent_span_id != SpanId::INVALID).then_some(span.parent_span_id),
        name: span.name.to_string(),
        kind: span.span_kind,
        start_time_ns: unix_nanos(span.start_time),
        end_time_ns: Some(unix_nanos(span.end_time)),
        status: span.status.clone(),
        attributes: span.attributes.clone(),
        events: span.events.iter().map(StoredEvent::from).collect(),
    }
}

#[async_trait]
impl SpanExporter for StorageSpanExporter {
    async fn export(&self, batch: Vec<SpanData>) -> ExportResult {
        for span in &batch {
            let stored = to_stored(span);
            if let Err(err) = self.store.store_span(&stored).await {
                warn!(
                    trace_id = %stored.trace_id,
                    span_id = %stored.span_id,
                    error = %err,
                    "failed to persist span; skipping"
                );
            }
        }
        Ok(())
    }
}
