//! Span handles produced by a [`Tracer`](crate::Tracer).
//!
//! A span records timing, attributes, and events while in flight; ending
//! it (explicitly or on drop) hands the collected data to the provider's
//! processors.

use std::borrow::Cow;
use std::time::SystemTime;

use conductor_api::{Event, KeyValue, SpanContext, SpanId, SpanKind, Status};

use crate::export;
use crate::tracer::Tracer;

/// Single operation within a trace.
#[derive(Debug)]
pub struct Span {
    span_context: SpanContext,
    data: Option<SpanData>,
    tracer: Tracer,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct SpanData {
    pub(crate) parent_span_id: SpanId,
    pub(crate) span_kind: SpanKind,
    pub(crate) name: Cow<'static, str>,
    pub(crate) start_time: SystemTime,
    pub(crate) end_time: SystemTime,
    pub(crate) attributes: Vec<KeyValue>,
    pub(crate) events: Vec<Event>,
    pub(crate) status: Status,
}

impl Span {
    pub(crate) fn new(span_context: SpanContext, data: Option<SpanData>, tracer: Tracer) -> Self {
        Span {
            span_context,
            data,
            tracer,
        }
    }

    fn with_data<T, F>(&mut self, f: F) -> Option<T>
    where
        F: FnOnce(&mut SpanData) -> T,
    {
        self.data.as_mut().map(f)
    }

    /// The propagatable context of this span.
    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    /// True while the span records attributes and events. Always false
    /// after `end`.
    pub fn is_recording(&self) -> bool {
        self.data.is_some()
    }

    /// Set a single attribute. The provider's redactor runs here, before
    /// the value is retained.
    pub fn set_attribute(&mut self, mut attribute: KeyValue) {
        if let Some(provider) = self.tracer.provider() {
            provider.config().redactor.redact(&mut attribute);
        }
        self.with_data(|data| {
            data.attributes.retain(|kv| kv.key != attribute.key);
            data.attributes.push(attribute);
        });
    }

    /// Set several attributes at once.
    pub fn set_attributes(&mut self, attributes: impl IntoIterator<Item = KeyValue>) {
        for attribute in attributes {
            self.set_attribute(attribute);
        }
    }

    /// Record an event at the current instant.
    pub fn add_event<T>(&mut self, name: T, attributes: Vec<KeyValue>)
    where
        T: Into<Cow<'static, str>>,
    {
        let now = self
            .tracer
            .provider()
            .map(|p| p.config().clock.now())
            .unwrap_or_else(SystemTime::now);
        self.add_event_with_timestamp(name, now, attributes);
    }

    /// Record an event at a specific instant.
    pub fn add_event_with_timestamp<T>(
        &mut self,
        name: T,
        timestamp: SystemTime,
        mut attributes: Vec<KeyValue>,
    ) where
        T: Into<Cow<'static, str>>,
    {
        if let Some(provider) = self.tracer.provider() {
            provider.config().redactor.redact_all(&mut attributes);
        }
        self.with_data(|data| {
            data.events.push(Event::new(name, timestamp, attributes));
        });
    }

    /// Record `err` as an `exception` event and mark the span failed.
    pub fn record_error(&mut self, err: &dyn std::error::Error) {
        let message = err.to_string();
        self.add_event(
            "exception",
            vec![KeyValue::new("exception.message", message.clone())],
        );
        self.set_status(Status::error(message));
    }

    /// Set the status. Statuses only upgrade (`Ok > Error > Unset`), so a
    /// stale lower-priority write is ignored.
    pub fn set_status(&mut self, status: Status) {
        self.with_data(|data| {
            if status > data.status {
                data.status = status;
            }
        });
    }

    /// Update the span name.
    pub fn update_name<T>(&mut self, new_name: T)
    where
        T: Into<Cow<'static, str>>,
    {
        self.with_data(|data| {
            data.name = new_name.into();
        });
    }

    /// Finish the span at the current instant.
    pub fn end(&mut self) {
        self.ensure_ended_and_exported(None);
    }

    /// Finish the span at the given instant.
    pub fn end_with_timestamp(&mut self, timestamp: SystemTime) {
        self.ensure_ended_and_exported(Some(timestamp));
    }

    fn ensure_ended_and_exported(&mut self, timestamp: Option<SystemTime>) {
        // skip if data has already been exported
        let mut data = match self.data.take() {
            Some(data) => data,
            None => return,
        };

        // skip if the provider has been shut down
        let provider = match self.tracer.provider() {
            Some(provider) => provider,
            None => return,
        };

        if let Some(timestamp) = timestamp {
            data.end_time = timestamp;
        } else if data.end_time == data.start_time {
            data.end_time = provider.config().clock.now();
        }

        let service_name = provider.config().service_name.clone();
        for processor in provider.span_processors() {
            processor.on_end(build_export_data(
                data.clone(),
                self.span_context.clone(),
                service_name.clone(),
            ));
        }
    }
}

impl Drop for Span {
    /// Report the span on drop if it was not ended explicitly.
    fn drop(&mut self) {
        self.ensure_ended_and_exported(None);
    }
}

fn build_export_data(
    data: SpanData,
    span_context: SpanContext,
    service_name: Cow<'static, str>,
) -> export::SpanData {
    export::SpanData {
        span_context,
        parent_span_id: data.parent_span_id,
        span_kind: data.span_kind,
        name: data.name,
        start_time: data.start_time,
        end_time: data.end_time,
        attributes: data.attributes,
        events: data.events,
        status: data.status,
        service_name,
    }
}
