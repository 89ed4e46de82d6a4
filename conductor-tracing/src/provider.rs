//! Creator and registry of named [`Tracer`] instances.
//!
//! All configuration and extension points (span processors, sampler,
//! redactor, clock) live on the provider; tracers hold a weak reference so
//! shutting the provider down stops span production everywhere.

use std::borrow::Cow;
use std::sync::Arc;

use conductor_api::TraceResult;
use tracing::warn;

use crate::config::TraceConfig;
use crate::export::SpanExporter;
use crate::processor::{BatchConfig, BatchSpanProcessor, SimpleSpanProcessor, SpanProcessor};
use crate::tracer::Tracer;

#[derive(Debug)]
pub(crate) struct TracerProviderInner {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: TraceConfig,
}

/// Creator and registry of named [`Tracer`] instances.
#[derive(Clone, Debug)]
pub struct TracerProvider {
    inner: Arc<TracerProviderInner>,
}

impl Default for TracerProvider {
    fn default() -> Self {
        TracerProvider::builder().build()
    }
}

impl TracerProvider {
    pub(crate) fn new(inner: Arc<TracerProviderInner>) -> Self {
        TracerProvider { inner }
    }

    /// Create a new provider builder.
    pub fn builder() -> Builder {
        Builder::default()
    }

    /// Span processors associated with this provider.
    pub fn span_processors(&self) -> &[Box<dyn SpanProcessor>] {
        &self.inner.processors
    }

    /// Config associated with this provider.
    pub fn config(&self) -> &TraceConfig {
        &self.inner.config
    }

    /// Create a named tracer backed by this provider.
    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> Tracer {
        let name = name.into();
        let name = if name.is_empty() {
            Cow::Borrowed("conductor/tracer")
        } else {
            name
        };
        Tracer::new(name, Arc::downgrade(&self.inner))
    }

    /// Flush all processors, returning one result per processor.
    pub async fn force_flush(&self) -> Vec<TraceResult<()>> {
        let mut results = Vec::with_capacity(self.inner.processors.len());
        for processor in &self.inner.processors {
            results.push(processor.force_flush().await);
        }
        results
    }

    /// Flush and shut down every processor. Spans ended afterwards are
    /// silently dropped.
    pub async fn shutdown(&self) {
        for processor in &self.inner.processors {
            if let Err(err) = processor.shutdown().await {
                warn!(error = %err, "span processor shutdown failed");
            }
        }
    }
}

/// Builder for [`TracerProvider`].
#[derive(Debug, Default)]
pub struct Builder {
    processors: Vec<Box<dyn SpanProcessor>>,
    config: TraceConfig,
}

impl Builder {
    /// Attach an exporter behind a [`SimpleSpanProcessor`], exporting each
    /// span as it ends.
    pub fn with_simple_exporter<T: SpanExporter + 'static>(mut self, exporter: T) -> Self {
        self.processors
            .push(Box::new(SimpleSpanProcessor::new(Box::new(exporter))));
        self
    }

    /// Attach an exporter behind a [`BatchSpanProcessor`].
    pub fn with_batch_exporter<T: SpanExporter + 'static>(
        mut self,
        exporter: T,
        config: BatchConfig,
    ) -> Self {
        self.processors
            .push(Box::new(BatchSpanProcessor::new(Box::new(exporter), config)));
        self
    }

    /// Attach an arbitrary span processor.
    pub fn with_span_processor<T: SpanProcessor + 'static>(mut self, processor: T) -> Self {
        self.processors.push(Box::new(processor));
        self
    }

    /// Replace the provider configuration.
    pub fn with_config(mut self, config: TraceConfig) -> Self {
        self.config = config;
        self
    }

    /// Create the provider.
    pub fn build(self) -> TracerProvider {
        TracerProvider {
            inner: Arc::new(TracerProviderInner {
                processors: self.processors,
                config: self.config,
            }),
        }
    }
}
