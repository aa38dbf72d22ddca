//! Core library for streaming metrics analytics
//!
//! This crate provides the core functionality for:
//! - Bounded rolling windows over a shared store
//! - Rolling statistics and z-score anomaly detection
//! - A two-stage ingestion pipeline (acknowledge fast, analyse in the background)
//! - Health checks and observability

pub mod anomaly;
pub mod health;
pub mod models;
pub mod observability;
pub mod pipeline;
pub mod store;
pub mod window;

pub use anomaly::{AnomalyDetector, AnomalyVerdict, BaselinePolicy, RollingStatistics, Severity};
pub use health::{ComponentHealth, ComponentStatus, HealthMonitor, HealthReport, Readiness};
pub use models::*;
pub use observability::{MetricsSink, ServiceMetrics, StructuredLogger};
pub use pipeline::{IngestError, IngestionPipeline, PipelineConfig, WorkerContext, WorkerPool};
pub use store::{
    connect_with_retry, CounterStore, MemoryStore, RedisStore, RedisStoreConfig, RetryPolicy,
    StoreError, WindowStore,
};
pub use window::BoundedWindow;
