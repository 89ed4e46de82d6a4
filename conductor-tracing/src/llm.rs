//! Tracing decorator for LLM providers.
//!
//! Wraps any [`LlmProvider`] so each call emits an `llm.complete` or
//! `llm.stream` client span with provider, model, and request metadata,
//! then records token usage, finish reason, and best-effort cost when the
//! response (or the final stream chunk) arrives. Cost travels inside the
//! provider response rather than any out-of-band registry.

use std::sync::Arc;

use async_trait::async_trait;
use conductor_api::{KeyValue, SpanKind, Status};
use tokio::sync::mpsc;

use crate::instrument::SPAN_TYPE;
use crate::metrics::ConductorMetrics;
use crate::span::Span;
use crate::tracer::{SpanBuilder, Tracer};

/// A request to an LLM provider.
#[derive(Clone, Debug, Default)]
pub struct LlmRequest {
    /// Model identifier.
    pub model: String,
    /// Sampling temperature, if set.
    pub temperature: Option<f64>,
    /// Token budget, if set.
    pub max_tokens: Option<u32>,
    /// Additional request metadata recorded on the span.
    pub metadata: Vec<KeyValue>,
}

/// Token usage reported by a provider.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    /// Prompt tokens consumed.
    pub prompt: u64,
    /// Completion tokens produced.
    pub completion: u64,
    /// Total tokens billed.
    pub total: u64,
    /// Tokens written to the provider's prompt cache.
    pub cache_creation: u64,
    /// Tokens served from the provider's prompt cache.
    pub cache_read: u64,
}

/// Best-effort cost estimate for one call.
#[derive(Clone, Debug, PartialEq)]
pub struct CostEstimate {
    /// Monetary amount.
    pub amount: f64,
    /// ISO currency code.
    pub currency: String,
    /// How precise the estimate is (`exact`, `estimated`).
    pub accuracy: String,
    /// Where the figure came from (`provider`, `pricing-table`).
    pub source: String,
}

/// A complete (non-streaming) provider response.
#[derive(Clone, Debug, Default)]
pub struct LlmResponse {
    /// Response content.
    pub content: String,
    /// Token usage, when the provider reports it.
    pub usage: Option<TokenUsage>,
    /// Finish reason (`stop`, `length`, `tool_use`).
    pub finish_reason: Option<String>,
    /// Provider-assigned request id.
    pub request_id: Option<String>,
    /// Number of tool calls in the response.
    pub tool_calls: u32,
    /// Cost of the call, when known.
    pub cost: Option<CostEstimate>,
}

/// One chunk of a streaming response.
///
/// The final chunk carries `usage` (and optionally cost); a chunk with
/// `error` set terminates the stream unsuccessfully.
#[derive(Clone, Debug, Default)]
pub struct StreamChunk {
    /// Incremental content.
    pub delta: String,
    /// Set on the final chunk.
    pub usage: Option<TokenUsage>,
    /// Set on the final chunk.
    pub finish_reason: Option<String>,
    /// Provider-assigned request id.
    pub request_id: Option<String>,
    /// Cost, when the provider reports it with usage.
    pub cost: Option<CostEstimate>,
    /// Terminal error description.
    pub error: Option<String>,
}

/// Error returned by providers.
#[derive(thiserror::Error, Debug)]
#[error("llm provider error: {0}")]
pub struct LlmError(pub String);

/// The provider interface the workflow runner calls.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider name recorded on spans (`anthropic`, `openai`).
    fn name(&self) -> &str;

    /// One-shot completion.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;

    /// Streaming completion; chunks arrive on the returned channel.
    async fn stream(&self, request: LlmRequest) -> Result<mpsc::Receiver<StreamChunk>, LlmError>;
}

/// Decorator that instruments every provider call.
pub struct TracedLlmProvider<P> {
    inner: P,
    tracer: Tracer,
    metrics: Option<Arc<ConductorMetrics>>,
}

impl<P: LlmProvider> TracedLlmProvider<P> {
    /// Wrap a provider.
    pub fn new(inner: P, tracer: Tracer) -> Self {
        TracedLlmProvider {
            inner,
            tracer,
            metrics: None,
        }
    }

    /// Also record request counters, token counters, and latency.
    pub fn with_metrics(mut self, metrics: Arc<ConductorMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn start_span(&self, operation: &'static str, request: &LlmRequest) -> Span {
        let mut attributes = vec![
            KeyValue::new("llm.provider", self.inner.name().to_owned()),
            KeyValue::new("llm.model", request.model.clone()),
            KeyValue::new(SPAN_TYPE, "llm"),
        ];
        if let Some(temperature) = request.temperature {
            attributes.push(KeyValue::new("llm.temperature", temperature));
        }
        if let Some(max_tokens) = request.max_tokens {
            attributes.push(KeyValue::new("llm.max_tokens", max_tokens as i64));
        }
        attributes.extend(request.metadata.iter().cloned());
        self.tracer.build(
            SpanBuilder::from_name(operation)
                .with_kind(SpanKind::Client)
                .with_attributes(attributes),
        )
    }
}

#[allow(clippy::too_many_arguments)]
fn record_outcome(
    span: &mut Span,
    metrics: Option<&ConductorMetrics>,
    usage: Option<&TokenUsage>,
    finish_reason: Option<&str>,
    request_id: Option<&str>,
    content_length: usize,
    tool_calls: u32,
    cost: Option<&CostEstimate>,
) {
    if let Some(usage) = usage {
        span.set_attributes([
            KeyValue::new("llm.usage.prompt_tokens", usage.prompt as i64),
            KeyValue::new("llm.usage.completion_tokens", usage.completion as i64),
            KeyValue::new("llm.usage.total_tokens", usage.total as i64),
            KeyValue::new("llm.usage.cache_creation_tokens", usage.cache_creation as i64),
            KeyValue::new("llm.usage.cache_read_tokens", usage.cache_read as i64),
        ]);
        if let Some(metrics) = metrics {
            metrics.tokens_total.with_label_values(&["prompt"]).inc_by(usage.prompt);
            metrics
                .tokens_total
                .with_label_values(&["completion"])
                .inc_by(usage.completion);
        }
    }
    if let Some(finish_reason) = finish_reason {
        span.set_attribute(KeyValue::new("llm.finish_reason", finish_reason.to_owned()));
    }
    if let Some(request_id) = request_id {
        span.set_attribute(KeyValue::new("llm.request_id", request_id.to_owned()));
    }
    span.set_attribute(KeyValue::new("llm.response_length", content_length as i64));
    span.set_attribute(KeyValue::new("llm.tool_calls", tool_calls as i64));
    if let Some(cost) = cost {
        span.set_attributes([
            KeyValue::new("llm.cost.amount", cost.amount),
            KeyValue::new("llm.cost.currency", cost.currency.clone()),
            KeyValue::new("llm.cost.accuracy", cost.accuracy.clone()),
            KeyValue::new("llm.cost.source", cost.source.clone()),
        ]);
    }
    span.set_status(Status::Ok);
}

#[async_trait]
impl<P: LlmProvider> LlmProvider for TracedLlmProvider<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let mut span = self.start_span("llm.complete", &request);
        let started = std::time::Instant::now();
        if let Some(metrics) = &self.metrics {
            metrics.llm_requests_total.inc();
        }

        let result = self.inner.complete(request).await;
        if let Some(metrics) = &self.metrics {
            metrics.llm_latency_seconds.observe(started.elapsed().as_secs_f64());
        }
        match result {
            Ok(response) => {
                record_outcome(
                    &mut span,
                    self.metrics.as_deref(),
                    response.usage.as_ref(),
                    response.finish_reason.as_deref(),
                    response.request_id.as_deref(),
                    response.content.len(),
                    response.tool_calls,
                    response.cost.as_ref(),
                );
                span.end();
                Ok(response)
            }
            Err(err) => {
                span.record_error(&err);
                span.end();
                Err(err)
            }
        }
    }

    async fn stream(&self, request: LlmRequest) -> Result<mpsc::Receiver<StreamChunk>, LlmError> {
        let mut span = self.start_span("llm.stream", &request);
        if let Some(metrics) = &self.metrics {
            metrics.llm_requests_total.inc();
        }
        let started = std::time::Instant::now();

        let mut upstream = match self.inner.stream(request).await {
            Ok(receiver) => receiver,
            Err(err) => {
                span.record_error(&err);
                span.end();
                return Err(err);
            }
        };

        // Pass chunks through; the final usage-bearing chunk (or an error
        // chunk) closes the span.
        let (tx, rx) = mpsc::channel(32);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            let mut content_length = 0usize;
            while let Some(chunk) = upstream.recv().await {
                content_length += chunk.delta.len();
                if let Some(error) = &chunk.error {
                    span.set_status(Status::error(error.clone()));
                    span.end();
                } else if chunk.usage.is_some() {
                    if let Some(metrics) = &metrics {
                        metrics
                            .llm_latency_seconds
                            .observe(started.elapsed().as_secs_f64());
                    }
                    record_outcome(
                        &mut span,
                        metrics.as_deref(),
                        chunk.usage.as_ref(),
                        chunk.finish_reason.as_deref(),
                        chunk.request_id.as_deref(),
                        content_length,
                        0,
                        chunk.cost.as_ref(),
                    );
                    span.end();
                }
                if tx.send(chunk).await.is_err() {
                    break;
                }
            }
            // Stream ended without a usage chunk; the span drop reports it.
        });

        Ok(rx)
    }
}
