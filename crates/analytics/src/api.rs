//! HTTP API: ingestion, request count, health checks and Prometheus metrics

use crate::error::{ApiError, ApiResult};
use analytics_lib::{
    Acceptance, ComponentStatus, HealthMonitor, IngestionPipeline, Metric, ServiceMetrics,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

const INDEX: &str = "Stream Analytics Service

Available endpoints:
POST /analyze - Submit metrics for analysis
GET  /metrics - Prometheus metrics
GET  /count   - Get request count
GET  /health  - Health check
GET  /readyz  - Readiness check
";

/// Shared application state
pub struct AppState {
    pub pipeline: IngestionPipeline,
    pub health: HealthMonitor,
    pub metrics: ServiceMetrics,
}

impl AppState {
    pub fn new(pipeline: IngestionPipeline, health: HealthMonitor, metrics: ServiceMetrics) -> Self {
        Self {
            pipeline,
            health,
            metrics,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: i64,
}

async fn index() -> impl IntoResponse {
    ([("content-type", "text/plain; charset=utf-8")], INDEX)
}

/// Accept one observation; analysis happens after the response is sent
async fn analyze(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Metric>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Acceptance>)> {
    let Json(metric) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let acceptance = state.pipeline.submit(metric).await?;
    Ok((StatusCode::ACCEPTED, Json(acceptance)))
}

async fn count(State(state): State<Arc<AppState>>) -> ApiResult<Json<CountResponse>> {
    let count = state.pipeline.request_count().await?;
    Ok(Json(CountResponse { count }))
}

/// Health check - returns 200 while operational, 503 if unhealthy
async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.health.check(&state.pipeline).await;

    let status_code = match report.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(report))
}

/// Readiness check - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let buffer = state.metrics.encode()?;

    Ok((
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        buffer,
    ))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/analyze", post(analyze))
        .route("/count", get(count))
        .route("/health", get(health))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve the API until `shutdown` resolves
///
/// The state (and with it the pipeline's queue handle) is dropped when this returns.
pub async fn serve<F>(port: u16, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
