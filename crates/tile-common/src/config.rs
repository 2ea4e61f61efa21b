//! Service configuration.
//!
//! Loaded from a YAML file and then overridden by environment variables.
//! Every field has a default suited to a single-host hillshade deployment, so
//! an empty file (or no file at all) yields a runnable configuration.

use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::tile::MAX_SUPPORTED_ZOOM;
use crate::{TileCoord, TileError, TileResult};

/// Top-level tile service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileServiceConfig {
    /// Deepest zoom level that may be requested
    pub max_zoom: u32,

    /// Render floor; shallower zooms get the placeholder tile
    pub min_zoom: u32,

    /// Root of the `{z}/{x}/{y}.png` tile cache
    pub cache_dir: PathBuf,

    /// Client cache lifetime in seconds (`Cache-Control` / `Expires`)
    pub cache_expiration_secs: u64,

    /// Allow requests to switch on traced mode with `debug`
    pub debug_enabled: bool,

    /// Placeholder served below `min_zoom`; a transparent tile when unset
    pub empty_tile: Option<PathBuf>,

    /// Elevation data per zoom threshold, smallest sufficient entry wins
    pub data_sources: BTreeMap<u32, PathBuf>,

    pub limiter: LimiterConfig,

    pub renderer: RendererConfig,
}

/// Shared concurrency limiter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimiterConfig {
    /// Counter name in the shared store
    pub key: String,

    /// Renders allowed at once across all processes
    pub max_concurrency: u32,

    /// Sleep between acquisition attempts; 0 rejects immediately
    pub poll_interval_ms: u64,

    /// Longest time a request waits for a slot
    pub wait_timeout_secs: f64,

    /// Redis holding the shared counter
    pub redis_url: String,
}

/// External renderer invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Program to execute
    pub program: String,

    /// Arguments placed before `source destination z x y`
    pub args: Vec<String>,

    /// Kill the renderer after this many seconds; 0 waits forever
    pub timeout_secs: u64,
}

impl Default for TileServiceConfig {
    fn default() -> Self {
        let mut data_sources = BTreeMap::new();
        data_sources.insert(MAX_SUPPORTED_ZOOM, PathBuf::from("/srv/dem/srtm.tif"));

        Self {
            max_zoom: 20,
            min_zoom: 10,
            cache_dir: PathBuf::from("/var/cache/hillshade"),
            cache_expiration_secs: 7 * 24 * 3600,
            debug_enabled: false,
            empty_tile: None,
            data_sources,
            limiter: LimiterConfig::default(),
            renderer: RendererConfig::default(),
        }
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            key: "hillshade_concurrency".to_string(),
            max_concurrency: 4,
            poll_interval_ms: 150,
            wait_timeout_secs: 10.0,
            redis_url: "redis://127.0.0.1:6379".to_string(),
        }
    }
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            program: "python3".to_string(),
            args: vec!["hillshade.py".to_string()],
            timeout_secs: 300,
        }
    }
}

impl LimiterConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Negative waits clamp to zero; anything too large to represent waits
    /// forever. `TileServiceConfig::validate` rejects both.
    pub fn wait_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.wait_timeout_secs.max(0.0)).unwrap_or(Duration::MAX)
    }
}

impl RendererConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl TileServiceConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> TileResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TileError::InvalidConfig(format!("failed to read {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml_str(content: &str) -> TileResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
            .map_err(|e| TileError::InvalidConfig(format!("failed to parse YAML: {}", e)))
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var("TILE_CACHE_DIR") {
            self.cache_dir = PathBuf::from(dir);
        }
        if let Ok(url) = env::var("REDIS_URL") {
            self.limiter.redis_url = url;
        }
        if let Some(limit) = parse_env::<u32>("TILE_MAX_CONCURRENCY") {
            self.limiter.max_concurrency = limit;
        }
        if let Some(enabled) = parse_env::<bool>("TILE_DEBUG_ENABLED") {
            self.debug_enabled = enabled;
        }
    }

    /// Reject configurations the service cannot run with.
    pub fn validate(&self) -> TileResult<()> {
        if self.max_zoom > MAX_SUPPORTED_ZOOM {
            return Err(TileError::InvalidConfig(format!(
                "max_zoom {} exceeds supported maximum {}",
                self.max_zoom, MAX_SUPPORTED_ZOOM
            )));
        }
        if self.min_zoom > self.max_zoom {
            return Err(TileError::InvalidConfig(format!(
                "min_zoom {} is greater than max_zoom {}",
                self.min_zoom, self.max_zoom
            )));
        }
        if self.data_sources.is_empty() {
            return Err(TileError::InvalidConfig(
                "data_sources must contain at least one entry".to_string(),
            ));
        }
        if self.limiter.max_concurrency == 0 {
            return Err(TileError::InvalidConfig(
                "limiter.max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.limiter.key.is_empty() {
            return Err(TileError::InvalidConfig("limiter.key is empty".to_string()));
        }
        let wait = self.limiter.wait_timeout_secs;
        if wait < 0.0 || Duration::try_from_secs_f64(wait).is_err() {
            return Err(TileError::InvalidConfig(format!(
                "limiter.wait_timeout_secs must be a finite number of seconds, got {}",
                wait
            )));
        }
        if self.renderer.program.is_empty() {
            return Err(TileError::InvalidConfig(
                "renderer.program is empty".to_string(),
            ));
        }

        if let Some((&deepest, _)) = self.data_sources.last_key_value() {
            if deepest < self.max_zoom {
                warn!(
                    deepest_source = deepest,
                    max_zoom = self.max_zoom,
                    "Zoom levels above the deepest data source will fail to render"
                );
            }
        }

        Ok(())
    }

    /// Validate a raw request coordinate against `max_zoom`.
    pub fn validate_coord(&self, x: i64, y: i64, z: i64) -> TileResult<TileCoord> {
        TileCoord::validate(x, y, z, self.max_zoom)
    }

    /// Cache file for a tile.
    pub fn tile_path(&self, coord: &TileCoord) -> PathBuf {
        coord.cache_path(&self.cache_dir)
    }

    /// Pick the elevation data for a zoom level.
    ///
    /// Entries are walked in ascending threshold order and the first whose
    /// threshold is at least `zoom` wins.
    pub fn select_render_source(&self, zoom: u32) -> TileResult<&Path> {
        self.data_sources
            .range(zoom..)
            .next()
            .map(|(_, source)| source.as_path())
            .ok_or(TileError::ConfigurationError(zoom))
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = env::var(name).ok()?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Ignoring unparseable environment override");
            None
        }
    }
}
