//! Hillshade tile API.
//!
//! Serves cached hillshade tiles from disk and renders missing ones through
//! an external program, with renders capped by a shared concurrency counter.

pub mod handlers;
pub mod metrics;
pub mod service;
pub mod state;

use axum::{extract::Extension, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub use service::{TileRequest, TileResponse, TileService, TileSource};
pub use state::AppState;

/// Build the HTTP router over shared state.
pub fn router(state: Arc<AppState>, prometheus: PrometheusHandle) -> Router {
    Router::new()
        // Tile endpoints
        .route("/tile", get(handlers::query_tile_handler))
        .route("/tiles/:z/:x/:y", get(handlers::path_tile_handler))
        // Health check
        .route("/health", get(handlers::health_handler))
        .route("/ready", get(handlers::ready_handler))
        // Metrics
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/metrics", get(handlers::api_metrics_handler))
        .layer(Extension(state))
        .layer(Extension(prometheus))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
