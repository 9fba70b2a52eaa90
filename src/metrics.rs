//! Pipeline instrumentation.
//!
//! Each pipeline owns its own prometheus [`Registry`] so independent
//! instances (and tests) never share state. The registry is exposed through
//! the management server's `/metrics` endpoint.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

/// Counters, gauges and timers for the scrape publishing pipeline.
///
/// Write-only from the pipeline's perspective; an external scraper reads
/// them via the registry.
pub struct PipelineMetrics {
    registry: Registry,

    /// Number of configured collection jobs.
    pub jobs: IntGauge,

    /// Circuit breaker state: 1 while paused, 0 otherwise.
    pub paused: IntGauge,

    /// Records successfully handed to the transport.
    pub published: IntCounter,

    /// Failed publishes, encode failures and transport disconnects.
    pub errors: IntCounter,

    /// Wall-clock duration of each publish call.
    pub publish_duration: Histogram,
}

impl PipelineMetrics {
    /// Build a metrics set backed by a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let jobs = IntGauge::new("pulsebridge_jobs", "Number of configured collection jobs")?;
        let paused = IntGauge::new(
            "pulsebridge_paused",
            "Circuit breaker state (1 = paused, 0 = running)",
        )?;
        let published = IntCounter::new(
            "pulsebridge_published_total",
            "Scrape records published to the stream",
        )?;
        let errors = IntCounter::new(
            "pulsebridge_errors_total",
            "Publish failures, encode failures and stream disconnects",
        )?;
        let publish_duration = Histogram::with_opts(HistogramOpts::new(
            "pulsebridge_publish_duration_seconds",
            "Duration of publish calls to the stream",
        ))?;

        registry.register(Box::new(jobs.clone()))?;
        registry.register(Box::new(paused.clone()))?;
        registry.register(Box::new(published.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(publish_duration.clone()))?;

        Ok(Self {
            registry,
            jobs,
            paused,
            published,
            errors,
            publish_duration,
        })
    }

    /// Registry holding all pipeline metrics.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl std::fmt::Debug for PipelineMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineMetrics")
            .field("published", &self.published.get())
            .field("errors", &self.errors.get())
            .finish_non_exhaustive()
    }
}
