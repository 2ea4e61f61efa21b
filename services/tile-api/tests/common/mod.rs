//! Shared fixtures for tile-api integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use renderer::{RenderJob, RenderReport, Renderer};
use storage::{ConcurrencyLimiter, MemoryCounter, SharedCounter};
use test_utils::{TestEnv, STUB_TILE_BYTES};
use tile_api::metrics::MetricsCollector;
use tile_api::{AppState, TileService};
use tile_common::{TileError, TileResult, TileServiceConfig};

/// In-process renderer that records calls instead of spawning a program.
pub struct RecordingRenderer {
    exit_code: i32,
    timed_out: bool,
    write_tile: bool,
    delay: Duration,
    calls: AtomicUsize,
    running: AtomicI64,
    peak: AtomicI64,
}

impl RecordingRenderer {
    pub fn succeeding() -> Self {
        Self::new(0, true, Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Self {
        Self::new(0, true, delay)
    }

    pub fn failing(exit_code: i32) -> Self {
        Self::new(exit_code, false, Duration::ZERO)
    }

    /// Fails after `delay`, having written a partial tile first.
    pub fn failing_after(exit_code: i32, delay: Duration) -> Self {
        Self::new(exit_code, true, delay)
    }

    /// Gives up after `delay` the way a timed-out process does.
    pub fn timing_out(delay: Duration) -> Self {
        Self {
            timed_out: true,
            ..Self::new(0, true, delay)
        }
    }

    fn new(exit_code: i32, write_tile: bool, delay: Duration) -> Self {
        Self {
            exit_code,
            timed_out: false,
            write_tile,
            delay,
            calls: AtomicUsize::new(0),
            running: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most renders observed running at the same time.
    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for RecordingRenderer {
    async fn render(&self, job: &RenderJob) -> TileResult<RenderReport> {
        let start = Instant::now();
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.write_tile {
            tokio::fs::write(&job.destination, STUB_TILE_BYTES).await.unwrap();
        }

        self.running.fetch_sub(1, Ordering::SeqCst);
        if self.timed_out {
            return Err(TileError::RenderTimeout(self.delay.as_secs()));
        }
        let output = if self.exit_code == 0 {
            format!("rendered {}", job.coord)
        } else {
            "ERROR 4: dem.tif: No such file or directory".to_string()
        };
        Ok(RenderReport {
            command: format!("recording {}", job.args().join(" ")),
            exit_code: Some(self.exit_code),
            output,
            elapsed: start.elapsed(),
        })
    }
}

/// Counter whose backing store is always unreachable.
pub struct UnreachableCounter;

fn unreachable() -> TileError {
    TileError::LimiterBackendError("connection refused".to_string())
}

#[async_trait]
impl SharedCounter for UnreachableCounter {
    async fn ensure(&self, _key: &str) -> TileResult<()> {
        Err(unreachable())
    }

    async fn increment(&self, _key: &str) -> TileResult<i64> {
        Err(unreachable())
    }

    async fn decrement(&self, _key: &str) -> TileResult<i64> {
        Err(unreachable())
    }

    async fn current(&self, _key: &str) -> TileResult<i64> {
        Err(unreachable())
    }

    async fn ping(&self) -> TileResult<()> {
        Err(unreachable())
    }
}

/// Config for `env` with a placeholder renderer script path.
pub fn config(env: &TestEnv) -> TileServiceConfig {
    env.config(&env.dir().join("unused-render.sh"))
}

pub fn service(
    config: TileServiceConfig,
    counter: Arc<dyn SharedCounter>,
    renderer: Arc<dyn Renderer>,
) -> TileService {
    let config = Arc::new(config);
    let limiter = ConcurrencyLimiter::from_config(counter, &config.limiter);
    TileService::new(config, limiter, renderer, Arc::new(MetricsCollector::new()))
}

pub fn memory_service(
    config: TileServiceConfig,
    renderer: Arc<dyn Renderer>,
) -> (TileService, Arc<MemoryCounter>) {
    let counter = Arc::new(MemoryCounter::new());
    (service(config, counter.clone(), renderer), counter)
}

pub async fn app_state(
    config: TileServiceConfig,
    counter: Arc<dyn SharedCounter>,
    renderer: Arc<dyn Renderer>,
) -> Arc<AppState> {
    Arc::new(AppState::new(config, counter, renderer).await.unwrap())
}
