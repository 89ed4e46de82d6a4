use conductor_api::{KeyValue, SpanContext, SpanKind, TraceId, TraceState, Value};

/// The decision produced by a sampler for a span about to be created.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SamplingDecision {
    /// The span is not recorded and not exported.
    Drop,
    /// The span is recorded and exported.
    RecordAndSample,
}

/// The output of [`ShouldSample::should_sample`].
#[derive(Clone, Debug, PartialEq)]
pub struct SamplingResult {
    /// Whether to record and export.
    pub decision: SamplingDecision,
    /// Trace state to carry on the new span's context.
    pub trace_state: TraceState,
}

/// The interface samplers implement to decide, at span start, whether a
/// span is recorded.
pub trait ShouldSample: CloneShouldSample + Send + Sync + std::fmt::Debug {
    /// Returns the sampling decision for a span to be created.
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
    ) -> SamplingResult;
}

/// This trait should not be used directly; implement [`ShouldSample`] and
/// `Clone` instead.
pub trait CloneShouldSample {
    fn box_clone(&self) -> Box<dyn ShouldSample>;
}

impl<T> CloneShouldSample for T
where
    T: ShouldSample + Clone + 'static,
{
    fn box_clone(&self) -> Box<dyn ShouldSample> {
        Box::new(self.clone())
    }
}

impl Clone for Box<dyn ShouldSample> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}

/// Built-in sampling strategies.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub enum Sampler {
    /// Always sample the trace.
    AlwaysOn,
    /// Never sample the trace.
    AlwaysOff,
    /// Respect the parent span's decision, delegating for root spans.
    ParentBased(Box<dyn ShouldSample>),
    /// Sample a given fraction of traces, decided deterministically from
    /// the trace id so every service observing the same trace agrees.
    /// Fractions >= 1 always sample; fractions <= 0 never sample.
    TraceIdRatioBased(f64),
}

impl ShouldSample for Sampler {
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
    ) -> SamplingResult {
        let decision = match self {
            Sampler::AlwaysOn => SamplingDecision::RecordAndSample,
            Sampler::AlwaysOff => SamplingDecision::Drop,
            Sampler::ParentBased(delegate) => match parent.filter(|cx| cx.is_valid()) {
                Some(cx) => {
                    if cx.is_sampled() {
                        SamplingDecision::RecordAndSample
                    } else {
                        SamplingDecision::Drop
                    }
                }
                None => {
                    delegate
                        .should_sample(parent, trace_id, name, span_kind, attributes)
                        .decision
                }
            },
            Sampler::TraceIdRatioBased(rate) => ratio_decision(*rate, trace_id),
        };
        SamplingResult {
            decision,
            trace_state: parent
                .map(|cx| cx.trace_state().clone())
                .unwrap_or_default(),
        }
    }
}

/// Deterministic ratio decision.
///
/// The low eight bytes of the trace id are read as a big-endian integer
/// and mapped onto `[0, 1)`; the span is sampled when that position falls
/// below the configured rate. Every service observing the same trace
/// computes the same position, so they agree without coordination.
fn ratio_decision(rate: f64, trace_id: TraceId) -> SamplingDecision {
    if rate >= 1.0 {
        return SamplingDecision::RecordAndSample;
    }
    if rate <= 0.0 {
        return SamplingDecision::Drop;
    }
    let bytes = trace_id.to_bytes();
    let mut low = [0u8; 8];
    low.copy_from_slice(&bytes[8..]);
    // 2^64 as the divisor keeps the position strictly below 1.
    let position = u64::from_be_bytes(low) as f64 / ((u64::MAX as f64) + 1.0);
    if position < rate {
        SamplingDecision::RecordAndSample
    } else {
        SamplingDecision::Drop
    }
}

/// Wrapper sampler that forces `RecordAndSample` for spans whose initial
/// attributes mark an error, deferring to the base sampler otherwise.
///
/// Recognized markers: `error=true` and `conductor.status="error"`.
#[derive(Clone, Debug)]
pub struct ErrorAwareSampler {
    base: Box<dyn ShouldSample>,
}

impl ErrorAwareSampler {
    /// Wrap the given base sampler.
    pub fn new<S: ShouldSample + 'static>(base: S) -> Self {
        ErrorAwareSampler {
            base: Box::new(base),
        }
    }

    fn is_error(attributes: &[KeyValue]) -> bool {
        attributes.iter().any(|kv| match kv.key.as_str() {
            "error" => kv.value == Value::Bool(true),
            "conductor.status" => kv.value.as_str() == Some("error"),
            _ => false,
        })
    }
}

impl ShouldSample for ErrorAwareSampler {
    fn should_sample(
        &self,
        parent: Option<&SpanContext>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
    ) -> SamplingResult {
        if Self::is_error(attributes) {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                trace_state: parent
                    .map(|cx| cx.trace_state().clone())
                    .unwrap_or_default(),
            };
        }
        self.base
            .should_sample(parent, trace_id, name, span_kind, attributes)
    }
}

/// Head-sampling configuration.
#[derive(Clone, Debug)]
pub struct SamplerConfig {
    /// Master switch; disabled means every span is sampled.
    pub enabled: bool,
    /// Fraction of traces to sample, in `[0, 1]`.
    pub rate: f64,
    /// Always sample spans whose initial attributes mark an error.
    pub always_sample_errors: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        SamplerConfig {
            enabled: false,
            rate: 1.0,
            always_sample_errors: true,
        }
    }
}

impl SamplerConfig {
    /// Build the sampler this configuration describes.
    pub fn build(&self) -> Box<dyn ShouldSample> {
        if !self.enabled || self.rate >= 1.0 {
            return Box::new(Sampler::AlwaysOn);
        }
        if self.rate <= 0.0 && !self.always_sample_errors {
            return Box::new(Sampler::AlwaysOff);
        }
        let base = Sampler::TraceIdRatioBased(self.rate.max(0.0));
        if self.always_sample_errors {
            Box::new(ErrorAwareSampler::new(base))
        } else {
            Box::new(base)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_api::{SpanId, TraceFlags};
    use rand::Rng;

    fn parent_context(sampled: bool) -> SpanContext {
        SpanContext::new(
            TraceId::from(1u128),
            SpanId::from(1u64),
            TraceFlags::default().with_sampled(sampled),
            false,
            TraceState::default(),
        )
    }

    fn decision_for(sampler: &Sampler, parent: Option<&SpanContext>, id: u128) -> SamplingDecision {
        sampler
            .should_sample(parent, TraceId::from(id), "op", &SpanKind::Internal, &[])
            .decision
    }

    #[test]
    fn fixed_samplers_are_absolute() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let id = rng.gen::<u128>();
            assert_eq!(
                decision_for(&Sampler::AlwaysOn, None, id),
                SamplingDecision::RecordAndSample
            );
            assert_eq!(
                decision_for(&Sampler::AlwaysOff, None, id),
                SamplingDecision::Drop
            );
        }
    }

    #[test]
    fn ratio_sampling_tracks_the_configured_rate() {
        let total = 10_000;
        let mut rng = rand::thread_rng();
        for rate in [0.25, 0.5, 0.75] {
            let sampler = Sampler::TraceIdRatioBased(rate);
            let sampled = (0..total)
                .filter(|_| {
                    decision_for(&sampler, None, rng.gen::<u128>())
                        == SamplingDecision::RecordAndSample
                })
                .count();
            let observed = sampled as f64 / total as f64;
            // 10k draws put ~5 sigma at roughly 0.025 for these rates.
            assert!(
                (observed - rate).abs() < 0.025,
                "rate {rate}: observed {observed}"
            );
        }
    }

    #[test]
    fn out_of_range_rates_clamp() {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let id = rng.gen::<u128>();
            assert_eq!(
                decision_for(&Sampler::TraceIdRatioBased(-0.5), None, id),
                SamplingDecision::Drop
            );
            assert_eq!(
                decision_for(&Sampler::TraceIdRatioBased(1.5), None, id),
                SamplingDecision::RecordAndSample
            );
        }
    }

    #[test]
    fn parent_based_follows_the_parent_when_present() {
        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));
        let sampled_parent = parent_context(true);
        assert_eq!(
            decision_for(&sampler, Some(&sampled_parent), 7),
            SamplingDecision::RecordAndSample
        );

        let sampler = Sampler::ParentBased(Box::new(Sampler::AlwaysOn));
        let unsampled_parent = parent_context(false);
        assert_eq!(
            decision_for(&sampler, Some(&unsampled_parent), 7),
            SamplingDecision::Drop
        );

        // No parent: the delegate decides.
        assert_eq!(decision_for(&sampler, None, 7), SamplingDecision::RecordAndSample);
        let off = Sampler::ParentBased(Box::new(Sampler::AlwaysOff));
        assert_eq!(decision_for(&off, None, 7), SamplingDecision::Drop);
    }

    #[test]
    fn ratio_sampling_is_deterministic_per_trace_id() {
        let sampler = Sampler::TraceIdRatioBased(0.5);
        let trace_id = TraceId::from(0xDEADBEEFu128);
        let first = sampler.should_sample(None, trace_id, "x", &SpanKind::Internal, &[]);
        for _ in 0..100 {
            let again = sampler.should_sample(None, trace_id, "x", &SpanKind::Internal, &[]);
            assert_eq!(again.decision, first.decision);
        }
    }

    #[test]
    fn error_attributes_force_sampling() {
        let sampler = ErrorAwareSampler::new(Sampler::AlwaysOff);
        let trace_id = TraceId::from(7u128);

        let plain = sampler.should_sample(None, trace_id, "x", &SpanKind::Internal, &[]);
        assert_eq!(plain.decision, SamplingDecision::Drop);

        let flagged = sampler.should_sample(
            None,
            trace_id,
            "x",
            &SpanKind::Internal,
            &[KeyValue::new("error", true)],
        );
        assert_eq!(flagged.decision, SamplingDecision::RecordAndSample);

        let status = sampler.should_sample(
            None,
            trace_id,
            "x",
            &SpanKind::Internal,
            &[KeyValue::new("conductor.status", "error")],
        );
        assert_eq!(status.decision, SamplingDecision::RecordAndSample);
    }

    #[test]
    fn sampler_config_builds_expected_shapes() {
        // Disabled or full-rate configs always sample.
        let always = SamplerConfig {
            enabled: false,
            rate: 0.0,
            always_sample_errors: false,
        }
        .build();
        let result = always.should_sample(None, TraceId::from(2u128), "x", &SpanKind::Internal, &[]);
        assert_eq!(result.decision, SamplingDecision::RecordAndSample);

        // Zero rate with the error override off never samples.
        let never = SamplerConfig {
            enabled: true,
            rate: 0.0,
            always_sample_errors: false,
        }
        .build();
        let result = never.should_sample(None, TraceId::from(2u128), "x", &SpanKind::Internal, &[]);
        assert_eq!(result.decision, SamplingDecision::Drop);

        // Zero rate with the override on still records errors.
        let errors_only = SamplerConfig {
            enabled: true,
            rate: 0.0,
            always_sample_errors: true,
        }
        .build();
        let result = errors_only.should_sample(
            None,
            TraceId::from(2u128),
            "x",
            &SpanKind::Internal,
            &[KeyValue::new("error", true)],
        );
        assert_eq!(result.decision, SamplingDecision::RecordAndSample);
    }
}
