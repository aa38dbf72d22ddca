//! Ingestion pipeline
//!
//! Splits handling of one observation in two:
//! - fast path ([`IngestionPipeline::submit`]): reserve a queue slot, bump the
//!   durable counter, record instantaneous gauges, acknowledge
//! - slow path ([`WorkerPool`]): window update, rolling statistics, anomaly
//!   check and export, decoupled from the caller
//!
//! The queue between the two is bounded. A full queue rejects new submissions
//! before any counter is touched.

mod worker;


pub use worker::{baseline_values, AnalysisWorker, WorkerContext, WorkerPool};

use crate::anomaly::BaselinePolicy;
use crate::models::{Acceptance, Metric};
use crate::observability::MetricsSink;
use crate::store::{CounterStore, StoreError};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

/// Configuration for the ingestion pipeline
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Window capacity W
    pub window_size: usize,
    /// Maximum number of accepted observations waiting for analysis
    pub queue_capacity: usize,
    /// Number of analysis workers; one worker serialises all window updates
    pub workers: usize,
    /// Bound on the durable counter increment
    pub counter_timeout: Duration,
    /// Whether the evaluated observation is part of its own baseline
    pub baseline: BaselinePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: 50,
            queue_capacity: 1024,
            workers: 1,
            counter_timeout: Duration::from_secs(2),
            baseline: BaselinePolicy::Include,
        }
    }
}

/// Reasons a submission is rejected on the fast path
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("failed to increment request counter: {0}")]
    Counter(#[source] StoreError),

    #[error("request counter did not respond within {0:?}")]
    Timeout(Duration),

    #[error("analysis queue is full")]
    Overloaded,

    #[error("analysis pipeline is shut down")]
    Closed,
}

/// Receiving end of the analysis queue, consumed by a [`WorkerPool`]
pub struct AnalysisQueue {
    pub(crate) receiver: mpsc::Receiver<Metric>,
    pub(crate) pending: Arc<AtomicI64>,
}

/// Fast-path entry point shared by all request handlers
pub struct IngestionPipeline {
    counter: Arc<dyn CounterStore>,
    metrics: Arc<dyn MetricsSink>,
    sender: mpsc::Sender<Metric>,
    pending: Arc<AtomicI64>,
    counter_timeout: Duration,
}

impl IngestionPipeline {
    /// Create the pipeline and the queue its workers drain
    pub fn new(
        counter: Arc<dyn CounterStore>,
        metrics: Arc<dyn MetricsSink>,
        config: &PipelineConfig,
    ) -> (Self, AnalysisQueue) {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let pending = Arc::new(AtomicI64::new(0));

        let pipeline = Self {
            counter,
            metrics,
            sender,
            pending: pending.clone(),
            counter_timeout: config.counter_timeout,
        };

        (pipeline, AnalysisQueue { receiver, pending })
    }

    /// Create the pipeline and spawn its workers
    pub fn start(
        counter: Arc<dyn CounterStore>,
        context: WorkerContext,
        config: &PipelineConfig,
    ) -> (Self, WorkerPool) {
        let (pipeline, queue) = Self::new(counter, context.metrics.clone(), config);
        let pool = WorkerPool::spawn(queue, context, config.workers);
        (pipeline, pool)
    }

    /// Run the fast path for one observation.
    ///
    /// On success the observation is queued for analysis; acceptance does not
    /// mean it has reached the window yet.
    pub async fn submit(&self, metric: Metric) -> Result<Acceptance, IngestError> {
        let permit = match self.sender.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => {
                self.metrics.inc_rejected();
                return Err(IngestError::Overloaded);
            }
            Err(TrySendError::Closed(())) => return Err(IngestError::Closed),
        };

        let count = match tokio::time::timeout(self.counter_timeout, self.counter.increment()).await
        {
            Ok(Ok(count)) => count,
            Ok(Err(e)) => return Err(IngestError::Counter(e)),
            Err(_) => return Err(IngestError::Timeout(self.counter_timeout)),
        };
        debug!(count, "Request counter incremented");

        self.metrics.inc_requests();
        self.metrics.set_current(metric.cpu, metric.rps);

        let depth = self.pending.fetch_add(1, Ordering::SeqCst) + 1;
        permit.send(metric);
        self.metrics.set_queue_depth(depth);

        Ok(Acceptance::accepted(count))
    }

    /// Current value of the durable request counter
    pub async fn request_count(&self) -> Result<i64, StoreError> {
        self.counter.get_or_init().await
    }

    /// Observations accepted but not yet picked up by a worker
    pub fn queue_depth(&self) -> i64 {
        self.pending.load(Ordering::SeqCst)
    }

    /// Whether the workers are still consuming the queue
    pub fn is_running(&self) -> bool {
        !self.sender.is_closed()
    }
}
