//! Application metrics collection and reporting.

use metrics::{counter, histogram};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// How a tile request ended, for labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    CacheHit,
    Rendered,
    Placeholder,
    Diagnostic,
    Rejected,
    Failed,
}

impl RequestOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RequestOutcome::CacheHit => "cache_hit",
            RequestOutcome::Rendered => "rendered",
            RequestOutcome::Placeholder => "placeholder",
            RequestOutcome::Diagnostic => "diagnostic",
            RequestOutcome::Rejected => "rejected",
            RequestOutcome::Failed => "failed",
        }
    }
}

/// Metrics collector for the tile API.
///
/// Every recorded event goes both to the `metrics` facade (scraped through
/// `/metrics`) and to local atomics that back the JSON `/api/metrics` view.
#[derive(Debug)]
pub struct MetricsCollector {
    pub requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub placeholders: AtomicU64,
    pub diagnostics: AtomicU64,
    pub rejections: AtomicU64,
    pub failures: AtomicU64,

    /// Render stats
    pub renders_total: AtomicU64,
    pub render_errors: AtomicU64,

    render_times: RwLock<TimingStats>,

    /// Start time for uptime calculation
    start_time: Instant,
}

#[derive(Debug, Default)]
struct TimingStats {
    count: u64,
    total_us: u64,
    min_us: u64,
    max_us: u64,
    last_us: u64,
}

impl TimingStats {
    fn record(&mut self, duration_us: u64) {
        self.count += 1;
        self.total_us += duration_us;
        self.last_us = duration_us;
        if self.min_us == 0 || duration_us < self.min_us {
            self.min_us = duration_us;
        }
        if duration_us > self.max_us {
            self.max_us = duration_us;
        }
    }

    fn avg_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.total_us as f64 / self.count as f64) / 1000.0
        }
    }
}

/// Snapshot served by `/api/metrics`.
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub uptime_secs: u64,
    pub requests: u64,
    pub cache_hits: u64,
    pub placeholders: u64,
    pub diagnostics: u64,
    pub rejections: u64,
    pub failures: u64,
    pub renders_total: u64,
    pub render_errors: u64,
    pub render_avg_ms: f64,
    pub render_min_ms: f64,
    pub render_max_ms: f64,
    pub render_last_ms: f64,
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            requests: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            placeholders: AtomicU64::new(0),
            diagnostics: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            renders_total: AtomicU64::new(0),
            render_errors: AtomicU64::new(0),
            render_times: RwLock::new(TimingStats::default()),
            start_time: Instant::now(),
        }
    }

    /// Record a finished tile request
    pub fn record_request(&self, outcome: RequestOutcome) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let bucket = match outcome {
            RequestOutcome::CacheHit => Some(&self.cache_hits),
            RequestOutcome::Placeholder => Some(&self.placeholders),
            RequestOutcome::Diagnostic => Some(&self.diagnostics),
            RequestOutcome::Rejected => Some(&self.rejections),
            RequestOutcome::Failed => Some(&self.failures),
            RequestOutcome::Rendered => None,
        };
        if let Some(bucket) = bucket {
            bucket.fetch_add(1, Ordering::Relaxed);
        }
        counter!("tile_requests_total", "outcome" => outcome.label()).increment(1);
        match outcome {
            RequestOutcome::CacheHit => counter!("tile_cache_hits_total").increment(1),
            RequestOutcome::Rejected => counter!("tile_limiter_rejections_total").increment(1),
            _ => {}
        }
    }

    /// Record a renderer run
    pub async fn record_render(&self, elapsed: Duration, success: bool) {
        self.renders_total.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.render_errors.fetch_add(1, Ordering::Relaxed);
        }
        let result = if success { "success" } else { "failure" };
        counter!("tile_renders_total", "result" => result).increment(1);
        histogram!("tile_render_duration_seconds").record(elapsed.as_secs_f64());

        let mut times = self.render_times.write().await;
        times.record(elapsed.as_micros() as u64);
    }

    pub async fn snapshot(&self) -> MetricsSnapshot {
        let times = self.render_times.read().await;
        MetricsSnapshot {
            uptime_secs: self.start_time.elapsed().as_secs(),
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            placeholders: self.placeholders.load(Ordering::Relaxed),
            diagnostics: self.diagnostics.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            renders_total: self.renders_total.load(Ordering::Relaxed),
            render_errors: self.render_errors.load(Ordering::Relaxed),
            render_avg_ms: times.avg_ms(),
            render_min_ms: times.min_us as f64 / 1000.0,
            render_max_ms: times.max_us as f64 / 1000.0,
            render_last_ms: times.last_us as f64 / 1000.0,
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}
