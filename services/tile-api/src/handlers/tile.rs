//! Tile request handlers.
//!
//! `GET /tile?x=&y=&z=[&debug]` and `GET /tiles/{z}/{x}/{y}.png` both feed
//! the same [`TileService`](crate::service::TileService) and map its answer
//! onto an HTTP response.

use axum::{
    extract::{Extension, Path, Query},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, instrument, warn};

use tile_common::TileError;

use crate::metrics::RequestOutcome;
use crate::service::{TileRequest, TileResponse, TileSource};
use crate::state::AppState;

const X_CACHE: HeaderName = HeaderName::from_static("x-cache");

/// Query parameters accepted by the tile endpoints.
///
/// Coordinates are kept as raw strings so that absent and malformed values
/// are reported by the service, not rejected by the extractor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TileQuery {
    pub x: Option<String>,
    pub y: Option<String>,
    pub z: Option<String>,
    /// Present (with any value) to request traced mode
    pub debug: Option<String>,
}

impl TileQuery {
    pub fn into_request(self) -> TileRequest {
        TileRequest {
            x: self.x,
            y: self.y,
            z: self.z,
            debug: self.debug.is_some(),
        }
    }
}

/// GET /tile?x=&y=&z=
#[instrument(skip(state))]
pub async fn query_tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<TileQuery>,
) -> Response {
    serve(&state, query.into_request()).await
}

/// GET /tiles/:z/:x/:y.png
#[instrument(skip(state))]
pub async fn path_tile_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((z, x, y)): Path<(String, String, String)>,
    Query(query): Query<TileQuery>,
) -> Response {
    let y = y.strip_suffix(".png").unwrap_or(&y).to_string();
    let request = TileRequest {
        x: Some(x),
        y: Some(y),
        z: Some(z),
        debug: query.debug.is_some(),
    };
    serve(&state, request).await
}

async fn serve(state: &AppState, request: TileRequest) -> Response {
    match state.service.handle(&request).await {
        Ok(TileResponse::Tile { path, source }) => {
            match state.service.cache().read(&path).await {
                Ok(data) => {
                    let (outcome, label) = match source {
                        TileSource::Cache => (RequestOutcome::CacheHit, "HIT"),
                        TileSource::Rendered => (RequestOutcome::Rendered, "MISS"),
                    };
                    state.metrics.record_request(outcome);
                    png_response(state, data, label)
                }
                Err(e) => error_response(state, e),
            }
        }
        Ok(TileResponse::Placeholder) => {
            state.metrics.record_request(RequestOutcome::Placeholder);
            png_response(state, state.placeholder.clone(), "PLACEHOLDER")
        }
        Ok(TileResponse::Diagnostic(text)) => {
            state.metrics.record_request(RequestOutcome::Diagnostic);
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                text,
            )
                .into_response()
        }
        Err(e) => error_response(state, e),
    }
}

fn png_response(state: &AppState, data: Bytes, cache_label: &str) -> Response {
    let max_age = state.config.cache_expiration_secs;
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/png".to_string()),
            (header::CACHE_CONTROL, format!("max-age={}", max_age)),
            (header::EXPIRES, expires_at(max_age)),
            (X_CACHE, cache_label.to_string()),
        ],
        data,
    )
        .into_response()
}

fn error_response(state: &AppState, e: TileError) -> Response {
    let status =
        StatusCode::from_u16(e.http_status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status == StatusCode::TOO_MANY_REQUESTS {
        warn!(error = %e, "Tile request rejected");
        state.metrics.record_request(RequestOutcome::Rejected);
    } else {
        error!(error = %e, "Tile request failed");
        state.metrics.record_request(RequestOutcome::Failed);
    }

    (
        status,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        e.public_message(),
    )
        .into_response()
}

/// HTTP date `max_age` seconds from now.
fn expires_at(max_age: u64) -> String {
    // Clamp below chrono's range limit
    let secs = max_age.min(i32::MAX as u64) as i64;
    (Utc::now() + chrono::Duration::seconds(secs))
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
