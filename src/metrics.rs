use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetricSample {
    RefreshCompleted {
        duration: Duration,
        environments: usize,
        features: usize,
        segments: usize,
    },
    RefreshFailed {
        duration: Duration,
    },
}

/// Destination for cache build measurements. Injected so deployments can wire
/// their own telemetry; the cache never talks to a process-wide registry.
pub trait MetricsSink: Send + Sync {
    fn emit(&self, sample: MetricSample);
}

#[derive(Debug, Default)]
pub struct NoopMetricsSink;

impl MetricsSink for NoopMetricsSink {
    fn emit(&self, _sample: MetricSample) {}
}
