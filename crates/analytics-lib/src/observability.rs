//! Observability infrastructure for the analytics service
//!
//! Provides:
//! - Prometheus metrics (request/anomaly counters, CPU/RPS gauges, rolling mean,
//!   queue depth, processing latency) in a registry owned by [`ServiceMetrics`]
//! - Structured JSON logging with tracing

use crate::anomaly::{AnomalyVerdict, Severity};
use crate::models::Metric;
use prometheus::{
    register_gauge_with_registry, register_histogram_with_registry,
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, Gauge,
    Histogram, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn, Level};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Export surface the pipeline writes to
///
/// Implemented by [`ServiceMetrics`]; tests may substitute their own sink.
pub trait MetricsSink: Send + Sync {
    /// Count an accepted submission
    fn inc_requests(&self);
    /// Record the instantaneous CPU and RPS of the latest submission
    fn set_current(&self, cpu: f64, rps: f64);
    /// Count a submission rejected because the analysis queue was full
    fn inc_rejected(&self);
    /// Export the rolling RPS mean of the window
    fn set_rolling_mean(&self, mean: f64);
    /// Export the latest z-score
    fn set_z_score(&self, z_score: f64);
    /// Count a detected anomaly
    fn inc_anomalies(&self);
    /// Count a failed background evaluation
    fn inc_background_errors(&self);
    /// Number of observations waiting for analysis
    fn set_queue_depth(&self, depth: i64);
    /// Time spent on one background evaluation
    fn observe_processing_latency(&self, duration_secs: f64);
}

struct ServiceMetricsInner {
    registry: Registry,
    requests_total: IntCounter,
    anomalies_total: IntCounter,
    rejected_total: IntCounter,
    background_errors_total: IntCounter,
    cpu_percent: Gauge,
    rps_current: Gauge,
    rps_rolling_avg: Gauge,
    last_z_score: Gauge,
    queue_depth: IntGauge,
    processing_latency_seconds: Histogram,
}

impl ServiceMetricsInner {
    fn new() -> Self {
        let registry = Registry::new();

        Self {
            requests_total: register_int_counter_with_registry!(
                "stream_analytics_requests_total",
                "The total number of processed requests",
                registry
            )
            .expect("Failed to register requests_total"),

            anomalies_total: register_int_counter_with_registry!(
                "stream_analytics_anomalies_total",
                "The total number of detected anomalies",
                registry
            )
            .expect("Failed to register anomalies_total"),

            rejected_total: register_int_counter_with_registry!(
                "stream_analytics_rejected_total",
                "Submissions rejected because the analysis queue was full",
                registry
            )
            .expect("Failed to register rejected_total"),

            background_errors_total: register_int_counter_with_registry!(
                "stream_analytics_background_errors_total",
                "Background evaluations that failed and were dropped",
                registry
            )
            .expect("Failed to register background_errors_total"),

            cpu_percent: register_gauge_with_registry!(
                "stream_analytics_cpu_percent",
                "Current CPU usage percentage",
                registry
            )
            .expect("Failed to register cpu_percent"),

            rps_current: register_gauge_with_registry!(
                "stream_analytics_rps_current",
                "Current RPS value",
                registry
            )
            .expect("Failed to register rps_current"),

            rps_rolling_avg: register_gauge_with_registry!(
                "stream_analytics_rps_rolling_avg",
                "Rolling average of RPS values",
                registry
            )
            .expect("Failed to register rps_rolling_avg"),

            last_z_score: register_gauge_with_registry!(
                "stream_analytics_last_z_score",
                "Z-score of the most recently evaluated RPS value",
                registry
            )
            .expect("Failed to register last_z_score"),

            queue_depth: register_int_gauge_with_registry!(
                "stream_analytics_queue_depth",
                "Observations accepted but not yet analysed",
                registry
            )
            .expect("Failed to register queue_depth"),

            processing_latency_seconds: register_histogram_with_registry!(
                "stream_analytics_processing_latency_seconds",
                "Time spent updating the window and evaluating one observation",
                LATENCY_BUCKETS.to_vec(),
                registry
            )
            .expect("Failed to register processing_latency_seconds"),

            registry,
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// Each instance owns its registry; clones share it.
#[derive(Clone)]
pub struct ServiceMetrics {
    inner: Arc<ServiceMetricsInner>,
}

impl Default for ServiceMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServiceMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ServiceMetricsInner::new()),
        }
    }

    /// Encode all metrics in the Prometheus text exposition format
    pub fn encode(&self) -> Result<Vec<u8>, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.inner.registry.gather(), &mut buffer)?;
        Ok(buffer)
    }

    pub fn requests_total(&self) -> u64 {
        self.inner.requests_total.get()
    }

    pub fn anomalies_total(&self) -> u64 {
        self.inner.anomalies_total.get()
    }

    pub fn rejected_total(&self) -> u64 {
        self.inner.rejected_total.get()
    }

    pub fn background_errors_total(&self) -> u64 {
        self.inner.background_errors_total.get()
    }

    pub fn cpu_percent(&self) -> f64 {
        self.inner.cpu_percent.get()
    }

    pub fn rps_current(&self) -> f64 {
        self.inner.rps_current.get()
    }

    pub fn rps_rolling_avg(&self) -> f64 {
        self.inner.rps_rolling_avg.get()
    }

    pub fn queue_depth(&self) -> i64 {
        self.inner.queue_depth.get()
    }
}

impl MetricsSink for ServiceMetrics {
    fn inc_requests(&self) {
        self.inner.requests_total.inc();
    }

    fn set_current(&self, cpu: f64, rps: f64) {
        self.inner.cpu_percent.set(cpu);
        self.inner.rps_current.set(rps);
    }

    fn inc_rejected(&self) {
        self.inner.rejected_total.inc();
    }

    fn set_rolling_mean(&self, mean: f64) {
        self.inner.rps_rolling_avg.set(mean);
    }

    fn set_z_score(&self, z_score: f64) {
        self.inner.last_z_score.set(z_score);
    }

    fn inc_anomalies(&self) {
        self.inner.anomalies_total.inc();
    }

    fn inc_background_errors(&self) {
        self.inner.background_errors_total.inc();
    }

    fn set_queue_depth(&self, depth: i64) {
        self.inner.queue_depth.set(depth);
    }

    fn observe_processing_latency(&self, duration_secs: f64) {
        self.inner.processing_latency_seconds.observe(duration_secs);
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for processed observations,
/// anomalies, and lifecycle events.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, store: &str, window_size: usize, baseline: &str) {
        info!(
            event = "service_started",
            instance = %self.instance,
            version = %version,
            store = %store,
            window_size = window_size,
            baseline = %baseline,
            "Stream analytics service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Stream analytics service shutting down"
        );
    }

    /// Log the outcome of connecting to the shared store
    pub fn log_store_connection(&self, store: &str, connected: bool) {
        if connected {
            info!(
                event = "store_connection",
                instance = %self.instance,
                store = %store,
                connected = true,
                "Connected to shared store"
            );
        } else {
            warn!(
                event = "store_connection",
                instance = %self.instance,
                store = %store,
                connected = false,
                "Shared store unreachable, running degraded"
            );
        }
    }

    /// Log a processed observation
    pub fn log_processed(&self, metric: &Metric, rolling_mean: f64, window_len: usize) {
        info!(
            event = "metric_processed",
            instance = %self.instance,
            timestamp = %metric.timestamp.format("%H:%M:%S"),
            rps = metric.rps,
            cpu = metric.cpu,
            rolling_avg_rps = rolling_mean,
            window_len = window_len,
            "Processed metric"
        );
    }

    /// Log a detected anomaly; critical deviations at error level, the rest at warn
    pub fn log_anomaly(&self, metric: &Metric, verdict: &AnomalyVerdict, severity: Severity) {
        let z_score = verdict.z_score.unwrap_or_default();
        if anomaly_level(severity) == Level::ERROR {
            error!(
                event = "anomaly_detected",
                instance = %self.instance,
                severity = severity.as_str(),
                rps = metric.rps,
                z_score = z_score,
                mean = verdict.baseline.mean,
                std_dev = verdict.baseline.std_dev,
                "Anomaly detected"
            );
        } else {
            warn!(
                event = "anomaly_detected",
                instance = %self.instance,
                severity = severity.as_str(),
                rps = metric.rps,
                z_score = z_score,
                mean = verdict.baseline.mean,
                std_dev = verdict.baseline.std_dev,
                "Anomaly detected"
            );
        }
    }

    /// Log the range of the current window
    pub fn log_window_range(&self, min: Option<f64>, max: Option<f64>) {
        debug!(
            event = "window_range",
            instance = %self.instance,
            min_rps = ?min,
            max_rps = ?max,
            "Window range"
        );
    }
}

fn anomaly_level(severity: Severity) -> Level {
    match severity {
        Severity::Critical => Level::ERROR,
        Severity::High | Severity::Warning => Level::WARN,
    }
}
