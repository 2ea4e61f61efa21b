//! Tile request orchestration.
//!
//! One request runs through: validate, placeholder floor, cache lookup,
//! data source selection, cache directory, limiter slot, render, release.
//! Traced requests skip the cache lookup and answer with diagnostic text
//! describing the render instead of the tile itself.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument, warn, Instrument};

use renderer::{dispatch, RenderJob, RenderOutcome, RenderReport, Renderer};
use storage::{ConcurrencyLimiter, TileDiskCache};
use tile_common::{TileCoord, TileError, TileResult, TileServiceConfig};

use crate::metrics::MetricsCollector;

/// Raw tile request parameters as received from a client.
#[derive(Debug, Clone, Default)]
pub struct TileRequest {
    pub x: Option<String>,
    pub y: Option<String>,
    pub z: Option<String>,
    /// Client asked for traced mode
    pub debug: bool,
}

impl TileRequest {
    /// Request for an already-numeric coordinate.
    pub fn new(x: i64, y: i64, z: i64) -> Self {
        Self {
            x: Some(x.to_string()),
            y: Some(y.to_string()),
            z: Some(z.to_string()),
            debug: false,
        }
    }

    pub fn traced(mut self) -> Self {
        self.debug = true;
        self
    }
}

/// Where served tile bytes came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileSource {
    Cache,
    Rendered,
}

/// Successful answer to a tile request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileResponse {
    /// Stream the PNG at `path`
    Tile { path: PathBuf, source: TileSource },
    /// Below the render floor; serve the placeholder tile
    Placeholder,
    /// Traced mode report, sent as plain text
    Diagnostic(String),
}

/// Cache-or-render front end for hillshade tiles.
pub struct TileService {
    config: Arc<TileServiceConfig>,
    cache: TileDiskCache,
    limiter: ConcurrencyLimiter,
    renderer: Arc<dyn Renderer>,
    metrics: Arc<MetricsCollector>,
}

impl TileService {
    pub fn new(
        config: Arc<TileServiceConfig>,
        limiter: ConcurrencyLimiter,
        renderer: Arc<dyn Renderer>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        let cache = TileDiskCache::new(config.cache_dir.clone());
        Self {
            config,
            cache,
            limiter,
            renderer,
            metrics,
        }
    }

    pub fn config(&self) -> &TileServiceConfig {
        &self.config
    }

    pub fn cache(&self) -> &TileDiskCache {
        &self.cache
    }

    pub fn limiter(&self) -> &ConcurrencyLimiter {
        &self.limiter
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }

    /// Answer one tile request.
    ///
    /// `Err` carries the failure for the HTTP layer to map; in traced mode
    /// validation and render failures come back as
    /// [`TileResponse::Diagnostic`] instead.
    #[instrument(skip(self), fields(x = ?request.x, y = ?request.y, z = ?request.z))]
    pub async fn handle(&self, request: &TileRequest) -> TileResult<TileResponse> {
        let traced = request.debug && self.config.debug_enabled;

        let coord = match self.validate(request) {
            Ok(coord) => coord,
            Err(e) if traced && e.is_diagnosable() => {
                return Ok(TileResponse::Diagnostic(format!("{}\n{}\n", e.public_message(), e)));
            }
            Err(e) => return Err(e),
        };

        if coord.z < self.config.min_zoom {
            return Ok(TileResponse::Placeholder);
        }

        let path = self.cache.path(&coord);
        if !traced && self.cache.contains(&path).await {
            return Ok(TileResponse::Tile {
                path,
                source: TileSource::Cache,
            });
        }

        let source = self.config.select_render_source(coord.z)?.to_path_buf();
        self.cache.ensure_directory(&path).await?;

        let job = RenderJob::new(source, path, coord);
        self.render(job, traced).await
    }

    fn validate(&self, request: &TileRequest) -> TileResult<TileCoord> {
        let x = required("x", request.x.as_deref())?;
        let y = required("y", request.y.as_deref())?;
        let z = required("z", request.z.as_deref())?;
        // Presence first, then format, so a missing argument always wins
        let x = parse_coordinate("x", x)?;
        let y = parse_coordinate("y", y)?;
        let z = parse_coordinate("z", z)?;
        self.config.validate_coord(x, y, z)
    }

    /// Render on a task of its own.
    ///
    /// The task owns the limiter slot and the renderer process, so a client
    /// that goes away mid-render neither kills the render nor loses the
    /// tile; the request just stops waiting for it. Only the configured
    /// render timeout stops a renderer early.
    async fn render(&self, job: RenderJob, traced: bool) -> TileResult<TileResponse> {
        let worker = RenderWorker {
            limiter: self.limiter.clone(),
            renderer: Arc::clone(&self.renderer),
            metrics: Arc::clone(&self.metrics),
        };
        tokio::spawn(worker.run(job, traced).in_current_span())
            .await
            .map_err(|e| TileError::RenderSpawnError(format!("render task failed: {}", e)))?
    }
}

/// Everything a detached render needs.
struct RenderWorker {
    limiter: ConcurrencyLimiter,
    renderer: Arc<dyn Renderer>,
    metrics: Arc<MetricsCollector>,
}

impl RenderWorker {
    /// Hold a limiter slot for exactly the duration of one render.
    async fn run(self, job: RenderJob, traced: bool) -> TileResult<TileResponse> {
        let slot = self.limiter.acquire().await?;

        let mut diagnostic = String::new();
        if traced {
            let held = match self.limiter.counter().current(self.limiter.key()).await {
                Ok(value) => value,
                Err(_) => slot.value(),
            };
            let _ = writeln!(diagnostic, "{}: {}", self.limiter.key(), held);
        }

        let started = Instant::now();
        let dispatched = dispatch(self.renderer.as_ref(), &job, traced).await;
        let elapsed = started.elapsed();

        if let Err(e) = slot.release().await {
            error!(key = %self.limiter.key(), error = %e, "Failed to release concurrency slot");
        }

        match dispatched {
            Ok((outcome, report)) => {
                let success = matches!(outcome, RenderOutcome::Success { .. });
                self.metrics.record_render(report.elapsed, success).await;

                if traced {
                    let output = match &outcome {
                        RenderOutcome::Failure { output, .. } => output.as_str(),
                        RenderOutcome::Success { .. } => report.output.as_str(),
                    };
                    write_report(&mut diagnostic, &report, output);
                    let _ = writeln!(diagnostic, "{}", job.destination.display());
                    return Ok(TileResponse::Diagnostic(diagnostic));
                }

                info!(tile = %job.coord, "Serving rendered tile");
                Ok(TileResponse::Tile {
                    path: job.destination,
                    source: TileSource::Rendered,
                })
            }
            Err(e) => {
                if matches!(e, TileError::RenderFailed { .. } | TileError::RenderTimeout(_)) {
                    self.metrics.record_render(elapsed, false).await;
                }
                if traced && e.is_diagnosable() {
                    warn!(tile = %job.coord, error = %e, "Traced render did not complete");
                    let _ = writeln!(diagnostic, "{}\n{}", e.public_message(), e);
                    let _ = writeln!(diagnostic, "{}", job.destination.display());
                    return Ok(TileResponse::Diagnostic(diagnostic));
                }
                Err(e)
            }
        }
    }
}

fn required<'a>(name: &'static str, value: Option<&'a str>) -> TileResult<&'a str> {
    value.ok_or(TileError::MissingParameter(name))
}

fn parse_coordinate(name: &'static str, raw: &str) -> TileResult<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| TileError::InvalidParameter {
            param: name,
            value: raw.to_string(),
        })
}

fn write_report(out: &mut String, report: &RenderReport, output: &str) {
    let exit = report
        .exit_code
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let _ = writeln!(out, "command: \n{}", report.command);
    let _ = writeln!(
        out,
        "exited with {} after {:.3} seconds",
        exit,
        report.elapsed.as_secs_f64()
    );
    out.push_str(output);
    if !output.is_empty() && !output.ends_with('\n') {
        out.push('\n');
    }
}
