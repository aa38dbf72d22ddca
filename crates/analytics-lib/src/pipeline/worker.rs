//! Analysis workers (slow path)
//!
//! Workers drain the analysis queue. For each observation they append it to
//! the window, recompute the rolling RPS mean, run the detector and export
//! the results. Failures are logged and counted, never retried.
//!
//! With a single worker every window mutation goes through one writer in
//! acceptance order. With several workers evaluations interleave freely:
//! a snapshot may contain observations accepted later, and the window only
//! guarantees its length bound.

use super::{AnalysisQueue, PipelineConfig};
use crate::anomaly::{
    max, min, AnomalyDetector, AnomalyVerdict, BaselinePolicy, RollingStatistics, Severity,
    MIN_SAMPLES_FOR_DETECTION,
};
use crate::models::Metric;
use crate::observability::{MetricsSink, StructuredLogger};
use crate::store::WindowStore;
use crate::window::BoundedWindow;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Everything a worker needs, passed explicitly instead of via globals
#[derive(Clone)]
pub struct WorkerContext {
    pub window: BoundedWindow,
    pub metrics: Arc<dyn MetricsSink>,
    pub logger: StructuredLogger,
    pub detector: AnomalyDetector,
    pub baseline: BaselinePolicy,
}

impl WorkerContext {
    pub fn new(
        window_store: Arc<dyn WindowStore>,
        metrics: Arc<dyn MetricsSink>,
        logger: StructuredLogger,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            window: BoundedWindow::new(window_store, config.window_size),
            metrics,
            logger,
            detector: AnomalyDetector::new(),
            baseline: config.baseline,
        }
    }
}

/// Baseline RPS values for evaluating `metric` against `snapshot`
///
/// With [`BaselinePolicy::Exclude`] the most recent entry equal to `metric`
/// is left out. If it is not in the snapshot (trimmed by concurrent writers)
/// the whole snapshot is used.
pub fn baseline_values(snapshot: &[Metric], metric: &Metric, policy: BaselinePolicy) -> Vec<f64> {
    let skip = match policy {
        BaselinePolicy::Include => None,
        BaselinePolicy::Exclude => snapshot.iter().rposition(|m| m == metric),
    };

    snapshot
        .iter()
        .enumerate()
        .filter(|(i, _)| Some(*i) != skip)
        .map(|(_, m)| m.rps)
        .collect()
}

/// A single slow-path worker
pub struct AnalysisWorker {
    id: usize,
    context: WorkerContext,
}

impl AnalysisWorker {
    pub fn new(id: usize, context: WorkerContext) -> Self {
        Self { id, context }
    }

    /// Update the window with one observation and evaluate it.
    ///
    /// Returns the verdict, or `None` when the window could not be updated
    /// or held too little history.
    pub async fn process(&self, metric: &Metric) -> Option<AnomalyVerdict> {
        let ctx = &self.context;
        let start = Instant::now();

        let snapshot = match ctx.window.append_and_snapshot(metric).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                ctx.metrics.inc_background_errors();
                ctx.logger.log_background_error(metric, "window_update", &e);
                return None;
            }
        };

        let rps: Vec<f64> = snapshot.iter().map(|m| m.rps).collect();
        let rolling_mean = RollingStatistics::mean(&rps);
        ctx.metrics.set_rolling_mean(rolling_mean);

        let baseline = baseline_values(&snapshot, metric, ctx.baseline);
        let verdict = if baseline.len() >= MIN_SAMPLES_FOR_DETECTION {
            Some(ctx.detector.evaluate(metric.rps, &baseline))
        } else {
            None
        };

        if let Some(verdict) = &verdict {
            if let Some(z_score) = verdict.z_score {
                ctx.metrics.set_z_score(z_score);
            }
            if verdict.is_anomaly {
                ctx.metrics.inc_anomalies();
                ctx.logger.log_anomaly(
                    metric,
                    verdict,
                    verdict.severity().unwrap_or(Severity::Warning),
                );
            }
        }

        ctx.logger.log_processed(metric, rolling_mean, snapshot.len());
        ctx.logger.log_window_range(min(&rps), max(&rps));
        ctx.metrics
            .observe_processing_latency(start.elapsed().as_secs_f64());

        verdict
    }

    async fn run(self, receiver: Arc<Mutex<mpsc::Receiver<Metric>>>, pending: Arc<AtomicI64>) {
        debug!(worker = self.id, "Analysis worker started");

        loop {
            let next = receiver.lock().await.recv().await;
            let Some(metric) = next else {
                break;
            };

            let depth = pending.fetch_sub(1, Ordering::SeqCst) - 1;
            self.context.metrics.set_queue_depth(depth);

            self.process(&metric).await;
        }

        debug!(worker = self.id, "Analysis queue closed, worker exiting");
    }
}

/// Handles of the running analysis workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `workers` workers (at least one) draining `queue`
    pub fn spawn(queue: AnalysisQueue, context: WorkerContext, workers: usize) -> Self {
        let workers = workers.max(1);
        let receiver = Arc::new(Mutex::new(queue.receiver));

        info!(workers, "Starting analysis workers");

        let handles = (0..workers)
            .map(|id| {
                let worker = AnalysisWorker::new(id, context.clone());
                tokio::spawn(worker.run(receiver.clone(), queue.pending.clone()))
            })
            .collect();

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait until every worker has drained the queue and exited.
    ///
    /// Workers exit once all pipeline handles are dropped and the queue is empty.
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Analysis worker terminated abnormally");
            }
        }
    }

    /// Like [`join`](Self::join) but gives up after `grace`, dropping queued work
    pub async fn join_timeout(self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.join()).await.is_ok()
    }
}
