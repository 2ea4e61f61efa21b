//! HTTP mapping tests driven through the router.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use storage::{MemoryCounter, SharedCounter};
use test_utils::{wait_until, TestEnv, STUB_TILE_BYTES, TEST_LIMITER_KEY};
use tower::ServiceExt;

use common::{app_state, config, RecordingRenderer, UnreachableCounter};

async fn app(env: &TestEnv, counter: Arc<dyn SharedCounter>, renderer: Arc<RecordingRenderer>) -> Router {
    let state = app_state(config(env), counter, renderer).await;
    let prometheus = PrometheusBuilder::new().build_recorder().handle();
    tile_api::router(state, prometheus)
}

async fn get(app: &Router, uri: &str) -> Response {
    app.clone()
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    to_bytes(response.into_body(), usize::MAX).await.unwrap().to_vec()
}

fn header_str<'a>(response: &'a Response, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

// ============================================================================
// Tiles
// ============================================================================

#[tokio::test]
async fn test_cached_tile_response() {
    let env = TestEnv::new();
    env.seed_tile(5, 3, 2, b"cached-png");
    let app = app(&env, Arc::new(MemoryCounter::new()), Arc::new(RecordingRenderer::succeeding())).await;

    let response = get(&app, "/tile?x=3&y=2&z=5").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "image/png");
    assert_eq!(header_str(&response, "cache-control"), "max-age=3600");
    assert!(header_str(&response, "expires").ends_with(" GMT"));
    assert_eq!(header_str(&response, "x-cache"), "HIT");
    assert_eq!(body_bytes(response).await, b"cached-png");
}

#[tokio::test]
async fn test_rendered_tile_response() {
    let env = TestEnv::new();
    let renderer = Arc::new(RecordingRenderer::succeeding());
    let app = app(&env, Arc::new(MemoryCounter::new()), renderer.clone()).await;

    let response = get(&app, "/tile?x=3&y=2&z=5").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "x-cache"), "MISS");
    assert_eq!(body_bytes(response).await, STUB_TILE_BYTES);
    assert_eq!(renderer.calls(), 1);
}

#[tokio::test]
async fn test_path_route() {
    let env = TestEnv::new();
    env.seed_tile(5, 3, 2, b"cached-png");
    let app = app(&env, Arc::new(MemoryCounter::new()), Arc::new(RecordingRenderer::succeeding())).await;

    let response = get(&app, "/tiles/5/3/2.png").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"cached-png");
}

#[tokio::test]
async fn test_placeholder_response() {
    let env = TestEnv::new();
    let renderer = Arc::new(RecordingRenderer::succeeding());
    let app = app(&env, Arc::new(MemoryCounter::new()), renderer.clone()).await;

    let response = get(&app, "/tile?x=0&y=0&z=1").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header_str(&response, "content-type"), "image/png");
    let body = body_bytes(response).await;
    assert_eq!(&body[0..8], &[137, 80, 78, 71, 13, 10, 26, 10]);
    assert_eq!(renderer.calls(), 0);
}

#[tokio::test]
async fn test_configured_placeholder_file() {
    let env = TestEnv::new();
    let empty = env.dir().join("empty.png");
    std::fs::write(&empty, b"empty-tile").unwrap();
    let mut config = config(&env);
    config.empty_tile = Some(empty);
    let state = common::app_state(
        config,
        Arc::new(MemoryCounter::new()),
        Arc::new(RecordingRenderer::succeeding()),
    )
    .await;
    let app = tile_api::router(state, PrometheusBuilder::new().build_recorder().handle());

    let response = get(&app, "/tiles/0/0/0.png").await;
    assert_eq!(body_bytes(response).await, b"empty-tile");
}

// ============================================================================
// Errors
// ============================================================================

#[tokio::test]
async fn test_missing_argument_is_500() {
    let env = TestEnv::new();
    let app = app(&env, Arc::new(MemoryCounter::new()), Arc::new(RecordingRenderer::succeeding())).await;

    let response = get(&app, "/tile?x=3&y=2").await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(header_str(&response, "content-type").starts_with("text/plain"));
    assert_eq!(body_bytes(response).await, b"Some argument missing!");
}

#[tokio::test]
async fn test_out_of_range_is_500() {
    let env = TestEnv::new();
    let app = app(&env, Arc::new(MemoryCounter::new()), Arc::new(RecordingRenderer::succeeding())).await;

    let response = get(&app, "/tile?x=0&y=0&z=19").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, b"Zoom out of range!");

    let response = get(&app, "/tile?x=8&y=0&z=3").await;
    assert_eq!(body_bytes(response).await, b"Coords out of range!");
}

#[tokio::test]
async fn test_render_failure_is_500() {
    let env = TestEnv::new();
    let app = app(&env, Arc::new(MemoryCounter::new()), Arc::new(RecordingRenderer::failing(1))).await;

    let response = get(&app, "/tile?x=3&y=2&z=5").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, b"Process failed");
}

#[tokio::test]
async fn test_counter_store_down_is_500() {
    let env = TestEnv::new();
    let app = app(&env, Arc::new(UnreachableCounter), Arc::new(RecordingRenderer::succeeding())).await;

    let response = get(&app, "/tile?x=3&y=2&z=5").await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_bytes(response).await, b"Can't connect to shared counter.");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_limit_exceeded_is_429() {
    let env = TestEnv::new();
    let mut config = config(&env);
    config.limiter.max_concurrency = 1;
    config.limiter.wait_timeout_secs = 0.05;
    let counter = Arc::new(MemoryCounter::new());
    let renderer = Arc::new(RecordingRenderer::slow(Duration::from_millis(500)));
    let state = common::app_state(config, counter.clone(), renderer).await;
    let app = tile_api::router(state, PrometheusBuilder::new().build_recorder().handle());

    let holder = {
        let app = app.clone();
        tokio::spawn(async move { get(&app, "/tile?x=3&y=2&z=5").await.status() })
    };
    wait_until!(counter.value(TEST_LIMITER_KEY) == 1, Duration::from_secs(2));

    let response = get(&app, "/tile?x=4&y=2&z=5").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body_bytes(response).await, b"429: Too Many Requests");

    assert_eq!(holder.await.unwrap(), StatusCode::OK);
    assert_eq!(counter.value(TEST_LIMITER_KEY), 0);
}

// ============================================================================
// Traced mode
// ============================================================================

#[tokio::test]
async fn test_traced_response_is_text() {
    let env = TestEnv::new();
    let app = app(&env, Arc::new(MemoryCounter::new()), Arc::new(RecordingRenderer::failing(2))).await;

    let response = get(&app, "/tile?x=3&y=2&z=5&debug").await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(header_str(&response, header::CONTENT_TYPE.as_str()).starts_with("text/plain"));
    let text = String::from_utf8(body_bytes(response).await).unwrap();
    assert!(text.contains("exited with 2 after"));
}

// ============================================================================
// Health and metrics
// ============================================================================

#[tokio::test]
async fn test_health_and_ready() {
    let env = TestEnv::new();
    let app = app(&env, Arc::new(MemoryCounter::new()), Arc::new(RecordingRenderer::succeeding())).await;

    assert_eq!(get(&app, "/health").await.status(), StatusCode::OK);
    assert_eq!(get(&app, "/ready").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_not_ready_without_counter_store() {
    let env = TestEnv::new();
    let app = app(&env, Arc::new(UnreachableCounter), Arc::new(RecordingRenderer::succeeding())).await;

    assert_eq!(get(&app, "/ready").await.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_api_metrics_counts_outcomes() {
    let env = TestEnv::new();
    env.seed_tile(5, 3, 2, b"cached-png");
    let app = app(&env, Arc::new(MemoryCounter::new()), Arc::new(RecordingRenderer::succeeding())).await;

    get(&app, "/tile?x=3&y=2&z=5").await;
    get(&app, "/tile?x=0&y=0&z=1").await;
    get(&app, "/tile?x=3").await;

    let response = get(&app, "/api/metrics").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
    assert_eq!(json["metrics"]["requests"], 3);
    assert_eq!(json["metrics"]["cache_hits"], 1);
    assert_eq!(json["metrics"]["placeholders"], 1);
    assert_eq!(json["metrics"]["failures"], 1);
    assert_eq!(json["limiter"]["key"], TEST_LIMITER_KEY);
    assert_eq!(json["limiter"]["in_flight"], 0);
}
