//! Prometheus metrics for the daemon.
//!
//! One [`ConductorMetrics`] instance owns the registry and every
//! instrument; the server exposes [`ConductorMetrics::encode`] on
//! `GET /metrics`. Gauges for subsystems that live elsewhere (SSE
//! subscriber count, session cache size) are set by their owners through
//! the shared handle.

use prometheus::{
    Encoder, Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

/// Registry plus every instrument the daemon exports.
pub struct ConductorMetrics {
    registry: Registry,

    /// Workflow runs started.
    pub runs_total: IntCounter,
    /// Steps executed.
    pub steps_total: IntCounter,
    /// LLM calls issued.
    pub llm_requests_total: IntCounter,
    /// Tokens consumed, labeled by `type` (`prompt` or `completion`).
    pub tokens_total: IntCounterVec,
    /// Steps served from replay instead of live execution.
    pub replay_total: IntCounter,
    /// Dollars saved by replaying cached step results.
    pub replay_cost_saved_usd: prometheus::Counter,
    /// Events appended to debug session buffers.
    pub debug_events_total: IntCounter,

    /// End-to-end run duration.
    pub run_duration_seconds: Histogram,
    /// Per-step duration.
    pub step_duration_seconds: Histogram,
    /// LLM call latency.
    pub llm_latency_seconds: Histogram,

    /// Runs currently executing.
    pub active_runs: IntGauge,
    /// Accumulated LLM spend.
    pub cost_usd: Gauge,
    /// Spans waiting in the batch exporter queue.
    pub queue_depth: IntGauge,
    /// Debug sessions currently cached in memory.
    pub debug_sessions_active: IntGauge,
    /// Live SSE subscribers.
    pub sse_subscribers: IntGauge,
    /// Entries in the run cache.
    pub run_cache_size: IntGauge,
}

impl std::fmt::Debug for ConductorMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ConductorMetrics(..)")
    }
}

impl ConductorMetrics {
    /// Build and register every instrument.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let runs_total = IntCounter::with_opts(Opts::new("runs_total", "Workflow runs started"))?;
        let steps_total = IntCounter::with_opts(Opts::new("steps_total", "Steps executed"))?;
        let llm_requests_total =
            IntCounter::with_opts(Opts::new("llm_requests_total", "LLM requests issued"))?;
        let tokens_total = IntCounterVec::new(
            Opts::new("tokens_total", "LLM tokens consumed"),
            &["type"],
        )?;
        let replay_total =
            IntCounter::with_opts(Opts::new("replay_total", "Steps answered from replay"))?;
        let replay_cost_saved_usd = prometheus::Counter::with_opts(Opts::new(
            "replay_cost_saved_usd",
            "Dollars saved by replaying cached results",
        ))?;
        let debug_events_total = IntCounter::with_opts(Opts::new(
            "debug_events_total",
            "Events appended to debug session buffers",
        ))?;

        let run_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "run_duration_seconds",
            "End-to-end workflow run duration",
        ))?;
        let step_duration_seconds = Histogram::with_opts(HistogramOpts::new(
            "step_duration_seconds",
            "Step duration",
        ))?;
        let llm_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "llm_latency_seconds",
            "LLM call latency",
        ))?;

        let active_runs = IntGauge::with_opts(Opts::new("active_runs", "Runs in flight"))?;
        let cost_usd = Gauge::with_opts(Opts::new("cost_usd", "Accumulated LLM spend"))?;
        let queue_depth =
            IntGauge::with_opts(Opts::new("queue_depth", "Spans queued for export"))?;
        let debug_sessions_active = IntGauge::with_opts(Opts::new(
            "debug_sessions_active",
            "Debug sessions cached in memory",
        ))?;
        let sse_subscribers =
            IntGauge::with_opts(Opts::new("sse_subscribers", "Live SSE subscribers"))?;
        let run_cache_size =
            IntGauge::with_opts(Opts::new("run_cache_size", "Entries in the run cache"))?;

        registry.register(Box::new(runs_total.clone()))?;
        registry.register(Box::new(steps_total.clone()))?;
        registry.register(Box::new(llm_requests_total.clone()))?;
        registry.register(Box::new(tokens_total.clone()))?;
        registry.register(Box::new(replay_total.clone()))?;
        registry.register(Box::new(replay_cost_saved_usd.clone()))?;
        registry.register(Box::new(debug_events_total.clone()))?;
        registry.register(Box::new(run_duration_seconds.clone()))?;
        registry.register(Box::new(step_duration_seconds.clone()))?;
        registry.register(Box::new(llm_latency_seconds.clone()))?;
        registry.register(Box::new(active_runs.clone()))?;
        registry.register(Box::new(cost_usd.clone()))?;
        registry.register(Box::new(queue_depth.clone()))?;
        registry.register(Box::new(debug_sessions_active.clone()))?;
        registry.register(Box::new(sse_subscribers.clone()))?;
        registry.register(Box::new(run_cache_size.clone()))?;

        // Process-level gauges (resident memory, threads, fds).
        #[cfg(target_os = "linux")]
        registry.register(Box::new(
            prometheus::process_collector::ProcessCollector::for_self(),
        ))?;

        Ok(ConductorMetrics {
            registry,
            runs_total,
            steps_total,
            llm_requests_total,
            tokens_total,
            replay_total,
            replay_cost_saved_usd,
            debug_events_total,
            run_duration_seconds,
            step_duration_seconds,
            llm_latency_seconds,
            active_runs,
            cost_usd,
            queue_depth,
            debug_sessions_active,
            sse_subscribers,
            run_cache_size,
        })
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn encode(&self) -> String {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        if encoder.encode(&self.registry.gather(), &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruments_register_and_encode() {
        let metrics = ConductorMetrics::new().unwrap();
        metrics.runs_total.inc();
        metrics.tokens_total.with_label_values(&["prompt"]).inc_by(7);
        metrics.active_runs.set(2);
        metrics.llm_latency_seconds.observe(0.25);

        let text = metrics.encode();
        assert!(text.contains("runs_total 1"));
        assert!(text.contains("tokens_total{type=\"prompt\"} 7"));
        assert!(text.contains("active_runs 2"));
        assert!(text.contains("llm_latency_seconds_bucket"));
    }

    #[test]
    fn double_registration_is_an_error() {
        let metrics = ConductorMetrics::new().unwrap();
        let duplicate = IntCounter::with_opts(Opts::new("runs_total", "dup")).unwrap();
        assert!(metrics.registry.register(Box::new(duplicate)).is_err());
    }
}
