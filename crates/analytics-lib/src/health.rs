//! Service health and readiness
//!
//! [`HealthMonitor`] owns the rules behind `/health` and `/readyz`:
//! - every check pings the shared store; an unreachable store degrades
//!   the service but does not make it unhealthy, since ingestion keeps
//!   answering with explicit errors and resumes once the store returns
//! - analysis workers that stopped consuming the queue make it unhealthy
//! - the service is ready once startup finished and nothing is unhealthy

use crate::pipeline::IngestionPipeline;
use crate::store::{CounterStore, StoreError, WindowStore};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::warn;

/// Component names reported in the health body
pub mod components {
    pub const STORE: &str = "store";
    pub const PIPELINE: &str = "pipeline";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Operational with reduced guarantees
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: Utc::now().timestamp(),
        }
    }
}

/// Body of the health endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    /// Worst status over all components
    pub status: ComponentStatus,
    /// Outcome of the store ping made for this report
    pub store: String,
    pub components: BTreeMap<String, ComponentHealth>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Tracks store reachability and pipeline liveness for one service instance
pub struct HealthMonitor {
    counter: Arc<dyn CounterStore>,
    window: Arc<dyn WindowStore>,
    store: RwLock<ComponentHealth>,
    pipeline: RwLock<ComponentHealth>,
    started: AtomicBool,
}

impl HealthMonitor {
    pub fn new(counter: Arc<dyn CounterStore>, window: Arc<dyn WindowStore>) -> Self {
        Self {
            counter,
            window,
            store: RwLock::new(ComponentHealth::new(ComponentStatus::Healthy, None)),
            pipeline: RwLock::new(ComponentHealth::new(ComponentStatus::Healthy, None)),
            started: AtomicBool::new(false),
        }
    }

    /// Record the outcome of the startup connection attempts
    pub async fn record_startup_connection(&self, connected: bool, attempts: u32) {
        if !connected {
            *self.store.write().await = ComponentHealth::new(
                ComponentStatus::Degraded,
                Some(format!("unreachable after {} attempts", attempts)),
            );
        }
    }

    /// Mark startup as complete; readiness is withheld until then
    pub fn mark_started(&self) {
        self.started.store(true, Ordering::SeqCst);
    }

    async fn ping_store(&self) -> Result<(), StoreError> {
        self.counter.ping().await?;
        self.window.ping().await
    }

    /// Ping the store, inspect the pipeline and build a fresh report
    pub async fn check(&self, pipeline: &IngestionPipeline) -> HealthReport {
        let store = match self.ping_store().await {
            Ok(()) => ComponentHealth::new(ComponentStatus::Healthy, None),
            Err(e) => {
                warn!(error = %e, "Store ping failed");
                ComponentHealth::new(
                    ComponentStatus::Degraded,
                    Some(format!("ping failed: {}", e)),
                )
            }
        };
        let store_label = match store.status {
            ComponentStatus::Healthy => "healthy",
            _ => "unhealthy",
        };

        let pipeline = if pipeline.is_running() {
            ComponentHealth::new(ComponentStatus::Healthy, None)
        } else {
            ComponentHealth::new(
                ComponentStatus::Unhealthy,
                Some("analysis workers stopped".to_string()),
            )
        };

        *self.store.write().await = store.clone();
        *self.pipeline.write().await = pipeline.clone();

        let status = store.status.max(pipeline.status);
        let components = BTreeMap::from([
            (components::STORE.to_string(), store),
            (components::PIPELINE.to_string(), pipeline),
        ]);

        HealthReport {
            status,
            store: store_label.to_string(),
            components,
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Readiness from the last known component states
    pub async fn readiness(&self) -> Readiness {
        if !self.started.load(Ordering::SeqCst) {
            return Readiness {
                ready: false,
                reason: Some("Service not yet initialized".to_string()),
            };
        }

        if self.pipeline.read().await.status == ComponentStatus::Unhealthy {
            return Readiness {
                ready: false,
                reason: Some("Analysis workers stopped".to_string()),
            };
        }

        Readiness {
            ready: true,
            reason: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Metric;
    use crate::observability::ServiceMetrics;
    use crate::pipeline::{AnalysisQueue, PipelineConfig};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    /// Counter reachable, window list not
    struct WindowDown;

    #[async_trait]
    impl WindowStore for WindowDown {
        async fn push_and_trim(&self, _entry: &Metric, _keep: usize) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("window down".to_string()))
        }

        async fn read_all(&self) -> Result<Vec<Metric>, StoreError> {
            Err(StoreError::Unavailable("window down".to_string()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("window down".to_string()))
        }
    }

    fn pipeline() -> (IngestionPipeline, AnalysisQueue) {
        IngestionPipeline::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ServiceMetrics::new()),
            &PipelineConfig::default(),
        )
    }

    fn memory_monitor() -> HealthMonitor {
        let store = Arc::new(MemoryStore::new());
        HealthMonitor::new(store.clone(), store)
    }

    #[tokio::test]
    async fn test_healthy_when_store_and_workers_up() {
        let monitor = memory_monitor();
        let (pipeline, _queue) = pipeline();

        let report = monitor.check(&pipeline).await;

        assert_eq!(report.status, ComponentStatus::Healthy);
        assert_eq!(report.store, "healthy");
        assert_eq!(report.components.len(), 2);
        assert!(report.timestamp.ends_with('Z'));
    }

    #[tokio::test]
    async fn test_unreachable_window_degrades_service() {
        let monitor = HealthMonitor::new(Arc::new(MemoryStore::new()), Arc::new(WindowDown));
        let (pipeline, _queue) = pipeline();

        let report = monitor.check(&pipeline).await;

        assert_eq!(report.status, ComponentStatus::Degraded);
        assert_eq!(report.store, "unhealthy");
        let store = &report.components[components::STORE];
        assert!(store.message.as_deref().unwrap().contains("window down"));
    }

    #[tokio::test]
    async fn test_stopped_workers_make_service_unhealthy() {
        let monitor = memory_monitor();
        monitor.mark_started();
        let (pipeline, queue) = pipeline();
        drop(queue);

        let report = monitor.check(&pipeline).await;
        assert_eq!(report.status, ComponentStatus::Unhealthy);

        let readiness = monitor.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Analysis workers stopped"));
    }

    #[tokio::test]
    async fn test_store_recovers_on_next_check() {
        let monitor = memory_monitor();
        monitor.record_startup_connection(false, 5).await;
        assert_eq!(
            monitor.store.read().await.message.as_deref(),
            Some("unreachable after 5 attempts")
        );

        let (pipeline, _queue) = pipeline();
        let report = monitor.check(&pipeline).await;
        assert_eq!(report.components[components::STORE].status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_readiness_waits_for_startup() {
        let monitor = memory_monitor();
        assert!(!monitor.readiness().await.ready);

        monitor.mark_started();
        assert!(monitor.readiness().await.ready);
    }

    #[tokio::test]
    async fn test_ready_while_degraded() {
        let monitor = memory_monitor();
        monitor.record_startup_connection(false, 5).await;
        monitor.mark_started();

        assert!(monitor.readiness().await.ready);
    }
}
