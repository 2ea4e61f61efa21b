//! Health checks, metrics, and monitoring endpoints.

use axum::{
    extract::Extension,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::state::AppState;

// ============================================================================
// Health Checks
// ============================================================================

/// GET /health - Basic health check
pub async fn health_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// GET /ready - Readiness check (verifies the shared counter is reachable)
pub async fn ready_handler(Extension(state): Extension<Arc<AppState>>) -> impl IntoResponse {
    match state.counter.ping().await {
        Ok(()) => (StatusCode::OK, "Ready"),
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Not ready")
        }
    }
}

// ============================================================================
// Prometheus Metrics
// ============================================================================

/// GET /metrics - Prometheus metrics endpoint
#[instrument(skip(prometheus))]
pub async fn metrics_handler(Extension(prometheus): Extension<PrometheusHandle>) -> Response {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        prometheus.render(),
    )
        .into_response()
}

// ============================================================================
// JSON Metrics API
// ============================================================================

/// GET /api/metrics - JSON metrics, including the live limiter count
#[instrument(skip(state))]
pub async fn api_metrics_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<serde_json::Value> {
    let snapshot = state.metrics.snapshot().await;
    let limiter = state.service.limiter();
    let in_flight = state.counter.current(limiter.key()).await.ok();

    Json(serde_json::json!({
        "metrics": snapshot,
        "limiter": {
            "key": limiter.key(),
            "max_concurrency": limiter.limit(),
            "in_flight": in_flight,
        },
    }))
}
