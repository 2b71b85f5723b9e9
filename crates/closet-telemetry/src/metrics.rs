//! Prometheus-backed metrics registry and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Exposes the counters/gauges relevant to the image pipeline service.

use std::sync::Arc;
use std::time::Duration;

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use serde::Serialize;

use crate::error::{TelemetryError, TelemetryResult};

/// Latency buckets (seconds) for stage executions; workers range from sub-second
/// normalisation to model-loading classification runs.
const STAGE_DURATION_BUCKETS: &[f64] = &[0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Outcome label recorded for each stage attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    /// The stage produced a usable result.
    Completed,
    /// The stage failed and aborted the pipeline.
    Failed,
}

impl StageStatus {
    /// Label value used in the `status` dimension.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Prometheus-backed metrics registry shared across services.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    http_requests_total: IntCounterVec,
    pipeline_stage_total: IntCounterVec,
    pipeline_stage_duration_seconds: HistogramVec,
    pipelines_in_flight: IntGauge,
    scratch_swept_files_total: IntCounter,
}

/// Snapshot of selected gauges and counters for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    /// Pipelines currently executing.
    pub pipelines_in_flight: i64,
    /// Total scratch files removed by the periodic sweeper.
    pub scratch_swept_files_total: u64,
}

impl Metrics {
    /// Construct a new metrics registry with the standard collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be built or
    /// registered.
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let http_requests_total = IntCounterVec::new(
            Opts::new("http_requests_total", "Total HTTP requests received"),
            &["route", "code"],
        )
        .map_err(|source| collector_error("http_requests_total", source))?;
        let pipeline_stage_total = IntCounterVec::new(
            Opts::new(
                "pipeline_stage_total",
                "Image pipeline stage executions by outcome",
            ),
            &["stage", "status"],
        )
        .map_err(|source| collector_error("pipeline_stage_total", source))?;
        let pipeline_stage_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "pipeline_stage_duration_seconds",
                "Wall-clock time spent in each pipeline stage",
            )
            .buckets(STAGE_DURATION_BUCKETS.to_vec()),
            &["stage"],
        )
        .map_err(|source| collector_error("pipeline_stage_duration_seconds", source))?;
        let pipelines_in_flight = IntGauge::with_opts(Opts::new(
            "pipelines_in_flight",
            "Image pipelines currently executing",
        ))
        .map_err(|source| collector_error("pipelines_in_flight", source))?;
        let scratch_swept_files_total = IntCounter::with_opts(Opts::new(
            "scratch_swept_files_total",
            "Stale scratch files removed by the sweeper",
        ))
        .map_err(|source| collector_error("scratch_swept_files_total", source))?;

        register(&registry, "http_requests_total", &http_requests_total)?;
        register(&registry, "pipeline_stage_total", &pipeline_stage_total)?;
        register(
            &registry,
            "pipeline_stage_duration_seconds",
            &pipeline_stage_duration_seconds,
        )?;
        register(&registry, "pipelines_in_flight", &pipelines_in_flight)?;
        register(
            &registry,
            "scratch_swept_files_total",
            &scratch_swept_files_total,
        )?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                http_requests_total,
                pipeline_stage_total,
                pipeline_stage_duration_seconds,
                pipelines_in_flight,
                scratch_swept_files_total,
            }),
        })
    }

    /// Increment the HTTP request counter for the given route and status code.
    pub fn inc_http_request(&self, route: &str, status: u16) {
        let code = status.to_string();
        self.inner
            .http_requests_total
            .with_label_values(&[route, code.as_str()])
            .inc();
    }

    /// Record one stage attempt with its outcome and elapsed time.
    pub fn observe_stage(&self, stage: &str, status: StageStatus, elapsed: Duration) {
        self.inner
            .pipeline_stage_total
            .with_label_values(&[stage, status.as_str()])
            .inc();
        self.inner
            .pipeline_stage_duration_seconds
            .with_label_values(&[stage])
            .observe(elapsed.as_secs_f64());
    }

    /// Mark a pipeline as started.
    pub fn pipeline_started(&self) {
        self.inner.pipelines_in_flight.inc();
    }

    /// Mark a pipeline as finished, whatever its outcome.
    pub fn pipeline_finished(&self) {
        self.inner.pipelines_in_flight.dec();
    }

    /// Add the number of files removed by a sweep pass.
    pub fn add_swept_files(&self, count: u64) {
        self.inner.scratch_swept_files_total.inc_by(count);
    }

    /// Read the stage counter for a given stage/status pair.
    #[must_use]
    pub fn stage_count(&self, stage: &str, status: StageStatus) -> u64 {
        self.inner
            .pipeline_stage_total
            .with_label_values(&[stage, status.as_str()])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> TelemetryResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|source| TelemetryError::MetricsEncode { source })?;
        String::from_utf8(buffer).map_err(|source| TelemetryError::MetricsUtf8 { source })
    }

    /// Take a point-in-time snapshot of the most relevant gauges and counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            pipelines_in_flight: self.inner.pipelines_in_flight.get(),
            scratch_swept_files_total: self.inner.scratch_swept_files_total.get(),
        }
    }
}

const fn collector_error(name: &'static str, source: prometheus::Error) -> TelemetryError {
    TelemetryError::MetricsCollector { name, source }
}

fn register<C>(registry: &Registry, name: &'static str, collector: &C) -> TelemetryResult<()>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|source| TelemetryError::MetricsRegister { name, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn metrics_snapshot_reflects_updates() -> Result<(), Box<dyn Error>> {
        let metrics = Metrics::new()?;
        metrics.inc_http_request("/remove-bg", 200);
        metrics.observe_stage(
            "background_removal",
            StageStatus::Completed,
            Duration::from_millis(420),
        );
        metrics.observe_stage(
            "classification",
            StageStatus::Failed,
            Duration::from_secs(3),
        );
        metrics.pipeline_started();
        metrics.pipeline_started();
        metrics.pipeline_finished();
        metrics.add_swept_files(7);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.pipelines_in_flight, 1);
        assert_eq!(snapshot.scratch_swept_files_total, 7);
        assert_eq!(
            metrics.stage_count("background_removal", StageStatus::Completed),
            1
        );
        assert_eq!(metrics.stage_count("classification", StageStatus::Failed), 1);
        assert_eq!(
            metrics.stage_count("classification", StageStatus::Completed),
            0
        );

        let rendered = metrics.render()?;
        assert!(rendered.contains("http_requests_total"));
        assert!(rendered.contains("pipeline_stage_total"));
        assert!(rendered.contains("pipeline_stage_duration_seconds_bucket"));
        Ok(())
    }

    #[test]
    fn registries_are_independent_per_handle() -> Result<(), Box<dyn Error>> {
        let first = Metrics::new()?;
        let second = Metrics::new()?;
        first.add_swept_files(3);
        assert_eq!(second.snapshot().scratch_swept_files_total, 0);
        Ok(())
    }
}
