//! Conductor's tracing pipeline.
//!
//! A [`TracerProvider`] yields named [`Tracer`]s; tracers start [`Span`]s
//! which collect attributes (through the configured [`Redactor`]) and
//! events, then flow through span processors to exporters when ended.
//! Two exporter families ship with the crate: the storage exporter writes
//! to the durable span store, and the OTLP exporter ships batches to an
//! external collector over the instrumented HTTP transport.
//!
//! ```no_run
//! use conductor_tracing::{BatchConfig, TracerProvider};
//! use conductor_tracing::export::testing::InMemorySpanExporter;
//!
//! # async fn build() {
//! let provider = TracerProvider::builder()
//!     .with_batch_exporter(InMemorySpanExporter::default(), BatchConfig::default())
//!     .build();
//! let tracer = provider.tracer("runner");
//! let mut span = tracer.start("workflow.run: deploy");
//! span.end();
//! # }
//! ```

mod config;
pub mod export;
mod id_generator;
pub mod instrument;
pub mod llm;
mod metrics;
mod processor;
mod provider;
mod redact;
mod sampler;
mod span;
mod tracer;

pub use conductor_api::{Clock, SystemClock};
pub use config::TraceConfig;
pub use id_generator::{IdGenerator, RandomIdGenerator};
pub use metrics::ConductorMetrics;
pub use processor::{BatchConfig, BatchSpanProcessor, SimpleSpanProcessor, SpanProcessor};
pub use provider::TracerProvider;
pub use redact::{RedactionMode, Redactor};
pub use sampler::{
    ErrorAwareSampler, Sampler, SamplerConfig, SamplingDecision, SamplingResult, ShouldSample,
};
pub use span::Span;
pub use tracer::{SpanBuilder, Tracer};
