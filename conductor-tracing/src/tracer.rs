use std::borrow::Cow;
use std::fmt;
use std::sync::Weak;
use std::time::SystemTime;

use conductor_api::{KeyValue, SpanContext, SpanId, SpanKind, TraceFlags, TraceId};

use crate::provider::{TracerProvider, TracerProviderInner};
use crate::sampler::SamplingDecision;
use crate::span::{Span, SpanData};

/// `Tracer` implementation to create and manage spans.
#[derive(Clone)]
pub struct Tracer {
    name: Cow<'static, str>,
    provider: Weak<TracerProviderInner>,
}

impl fmt::Debug for Tracer {
    /// Omitting `provider` here is necessary to avoid cycles.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracer").field("name", &self.name).finish()
    }
}

impl Tracer {
    pub(crate) fn new(name: Cow<'static, str>, provider: Weak<TracerProviderInner>) -> Self {
        Tracer { name, provider }
    }

    /// The instrumentation name this tracer was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The provider associated with this tracer, while it is alive.
    pub fn provider(&self) -> Option<TracerProvider> {
        self.provider.upgrade().map(TracerProvider::new)
    }

    /// Start building a span.
    pub fn span_builder(&self, name: impl Into<Cow<'static, str>>) -> SpanBuilder {
        SpanBuilder::from_name(name)
    }

    /// Start a root span with defaults.
    pub fn start(&self, name: impl Into<Cow<'static, str>>) -> Span {
        self.build(SpanBuilder::from_name(name))
    }

    /// Start a child span of the given parent context.
    pub fn start_with_parent(
        &self,
        name: impl Into<Cow<'static, str>>,
        parent: &SpanContext,
    ) -> Span {
        self.build(SpanBuilder::from_name(name).with_parent(parent.clone()))
    }

    /// Create a span from a builder.
    ///
    /// Roots and remote-parented spans consult the configured sampler;
    /// spans with a local parent follow the parent's decision.
    pub fn build(&self, mut builder: SpanBuilder) -> Span {
        let provider = match self.provider() {
            Some(provider) => provider,
            None => {
                return Span::new(SpanContext::empty_context(), None, self.clone());
            }
        };
        let config = provider.config();

        let span_id = builder
            .span_id
            .take()
            .unwrap_or_else(|| config.id_generator.new_span_id());
        let span_kind = builder.kind.take().unwrap_or(SpanKind::Internal);
        let mut attributes = builder.attributes;
        config.redactor.redact_all(&mut attributes);

        let parent = builder.parent.take().filter(|cx| cx.is_valid());
        let (trace_id, parent_span_id) = match &parent {
            Some(cx) => (cx.trace_id(), cx.span_id()),
            None => (
                builder
                    .trace_id
                    .take()
                    .unwrap_or_else(|| config.id_generator.new_trace_id()),
                SpanId::INVALID,
            ),
        };

        // Local parents already carry the decision; roots and remote
        // parents get a fresh one from the sampler.
        let sampling = match &parent {
            Some(cx) if !cx.is_remote() => {
                if cx.is_sampled() {
                    Some(cx.trace_state().clone())
                } else {
                    None
                }
            }
            _ => {
                let result = config.sampler.should_sample(
                    parent.as_ref(),
                    trace_id,
                    &builder.name,
                    &span_kind,
                    &attributes,
                );
                match result.decision {
                    SamplingDecision::RecordAndSample => Some(result.trace_state),
                    SamplingDecision::Drop => None,
                }
            }
        };

        let (flags, trace_state, recording) = match sampling {
            Some(trace_state) => (TraceFlags::default().with_sampled(true), trace_state, true),
            None => (
                TraceFlags::default(),
                parent
                    .as_ref()
                    .map(|cx| cx.trace_state().clone())
                    .unwrap_or_default(),
                false,
            ),
        };

        let span_context = SpanContext::new(trace_id, span_id, flags, false, trace_state);
        let data = recording.then(|| {
            let start_time = builder
                .start_time
                .take()
                .unwrap_or_else(|| config.clock.now());
            SpanData {
                parent_span_id,
                span_kind,
                name: builder.name,
                start_time,
                end_time: start_time,
                attributes,
                events: Vec::new(),
                status: Default::default(),
            }
        });

        let mut span = Span::new(span_context, data, self.clone());
        if span.is_recording() {
            for processor in provider.span_processors() {
                processor.on_start(&mut span);
            }
        }
        span
    }
}

/// Options for a span about to be created.
#[derive(Clone, Debug, Default)]
pub struct SpanBuilder {
    /// Span name.
    pub name: Cow<'static, str>,
    /// Span kind, `Internal` when unset.
    pub kind: Option<SpanKind>,
    /// Initial attribute set.
    pub attributes: Vec<KeyValue>,
    /// Explicit start timestamp.
    pub start_time: Option<SystemTime>,
    /// Parent context; absent for roots.
    pub parent: Option<SpanContext>,
    /// Explicit trace id for roots.
    pub trace_id: Option<TraceId>,
    /// Explicit span id.
    pub span_id: Option<SpanId>,
}

impl SpanBuilder {
    /// Create a builder with the given span name.
    pub fn from_name(name: impl Into<Cow<'static, str>>) -> Self {
        SpanBuilder {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the span kind.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Set the initial attributes.
    pub fn with_attributes(mut self, attributes: Vec<KeyValue>) -> Self {
        self.attributes = attributes;
        self
    }

    /// Set an explicit start time.
    pub fn with_start_time(mut self, start_time: SystemTime) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Set the parent context.
    pub fn with_parent(mut self, parent: SpanContext) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Pin the trace id of a root span.
    pub fn with_trace_id(mut self, trace_id: TraceId) -> Self {
        self.trace_id = Some(trace_id);
        self
    }

    /// Pin the span id.
    pub fn with_span_id(mut self, span_id: SpanId) -> Self {
        self.span_id = Some(span_id);
        self
    }
}
