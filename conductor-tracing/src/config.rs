use std::borrow::Cow;
use std::sync::Arc;

use conductor_api::{Clock, SystemClock};

use crate::id_generator::{IdGenerator, RandomIdGenerator};
use crate::redact::Redactor;
use crate::sampler::{Sampler, ShouldSample};

/// Shared configuration for a tracer provider.
///
/// The clock and id generator are injected so tests can pin time and
/// identifiers; production code uses the defaults.
#[derive(Debug)]
pub struct TraceConfig {
    /// Head sampler consulted for root and remote-parented spans.
    pub sampler: Box<dyn ShouldSample>,
    /// Generator for new trace and span ids.
    pub id_generator: Arc<dyn IdGenerator>,
    /// Wall clock used for span timestamps.
    pub clock: Arc<dyn Clock>,
    /// Redactor applied to attribute values at set-time.
    pub redactor: Arc<Redactor>,
    /// Logical service name attached to exported spans.
    pub service_name: Cow<'static, str>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        TraceConfig {
            sampler: Box::new(Sampler::AlwaysOn),
            id_generator: Arc::new(RandomIdGenerator),
            clock: Arc::new(SystemClock),
            redactor: Arc::new(Redactor::default()),
            service_name: Cow::Borrowed("conductor"),
        }
    }
}

impl TraceConfig {
    /// Replace the sampler.
    pub fn with_sampler<S: ShouldSample + 'static>(mut self, sampler: S) -> Self {
        self.sampler = Box::new(sampler);
        self
    }

    /// Replace the id generator.
    pub fn with_id_generator<G: IdGenerator + 'static>(mut self, generator: G) -> Self {
        self.id_generator = Arc::new(generator);
        self
    }

    /// Replace the clock.
    pub fn with_clock<C: Clock + 'static>(mut self, clock: C) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Replace the redactor.
    pub fn with_redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = Arc::new(redactor);
        self
    }

    /// Set the service name.
    pub fn with_service_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.service_name = name.into();
        self
    }
}
