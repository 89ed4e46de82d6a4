use std::fmt::Debug;

use conductor_api::{SpanId, TraceId};
use rand::Rng;

/// Interface for generating new trace and span identifiers.
///
/// Injected through [`TraceConfig`](crate::TraceConfig) so tests can pin
/// identifiers deterministically.
pub trait IdGenerator: Send + Sync + Debug {
    /// Generate a new `TraceId`.
    fn new_trace_id(&self) -> TraceId;
    /// Generate a new `SpanId`.
    fn new_span_id(&self) -> SpanId;
}

/// Default [`IdGenerator`] using the thread-local random number generator.
#[derive(Clone, Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn new_trace_id(&self) -> TraceId {
        TraceId::from(rand::thread_rng().gen::<u128>())
    }

    fn new_span_id(&self) -> SpanId {
        SpanId::from(rand::thread_rng().gen::<u64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let generator = RandomIdGenerator;
        let a = generator.new_trace_id();
        let b = generator.new_trace_id();
        assert!(a.is_valid());
        assert_ne!(a, b);
        assert_ne!(generator.new_span_id(), generator.new_span_id());
    }
}
