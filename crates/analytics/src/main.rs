//! Stream Analytics - streaming metrics anomaly detection service
//!
//! Accepts per-interval CPU/RPS observations over HTTP, keeps a bounded
//! rolling window in a shared store and flags RPS values that deviate from
//! the recent baseline.

use analytics_lib::{
    connect_with_retry, CounterStore, HealthMonitor, IngestionPipeline, MemoryStore, RedisStore, ServiceMetrics, StructuredLogger,
    WindowStore, WorkerContext,
};
use anyhow::Result;
use std::sync::Arc;
use stream_analytics::{
    api,
    config::{AppConfig, StoreKind},
};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting stream-analytics");

    let config = AppConfig::load()?;
    let instance = std::env::var("HOSTNAME").unwrap_or_else(|_| "stream-analytics".to_string());

    let metrics = ServiceMetrics::new();
    let logger = StructuredLogger::new(&instance);
    logger.log_startup(
        SERVICE_VERSION,
        config.store.as_str(),
        config.window_size,
        &config.baseline.to_string(),
    );

    let (counter, window): (Arc<dyn CounterStore>, Arc<dyn WindowStore>) = match config.store {
        StoreKind::Redis => {
            let store = Arc::new(RedisStore::new(config.redis())?);
            (store.clone(), store)
        }
        StoreKind::Memory => {
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
    };

    let health = HealthMonitor::new(counter.clone(), window.clone());
    let retry_policy = config.retry_policy();
    let connected = connect_with_retry(counter.as_ref(), &retry_policy).await;
    logger.log_store_connection(config.store.as_str(), connected);
    health
        .record_startup_connection(connected, retry_policy.max_attempts)
        .await;

    let pipeline_config = config.pipeline();
    let context = WorkerContext::new(
        window,
        Arc::new(metrics.clone()),
        logger.clone(),
        &pipeline_config,
    );
    let (pipeline, workers) = IngestionPipeline::start(counter, context, &pipeline_config);
    info!(
        workers = workers.len(),
        queue_capacity = pipeline_config.queue_capacity,
        "Analysis pipeline started"
    );

    health.mark_started();
    let app_state = Arc::new(api::AppState::new(pipeline, health, metrics));

    let shutdown_logger = logger.clone();
    let shutdown = async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        shutdown_logger.log_shutdown("SIGINT received");
    };

    // Returns once the server has stopped; the pipeline is dropped with the state
    if let Err(e) = api::serve(config.port, app_state, shutdown).await {
        error!(error = %e, "API server failed");
    }

    info!("Draining analysis queue");
    if !workers.join_timeout(config.shutdown_grace()).await {
        warn!(
            grace_secs = config.shutdown_grace_secs,
            "Analysis queue not drained before grace period, dropping remaining work"
        );
    }

    info!("Shutdown complete");
    Ok(())
}
