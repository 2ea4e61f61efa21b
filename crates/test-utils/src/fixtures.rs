//! Temporary cache roots and matching configurations.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tile_common::{LimiterConfig, RendererConfig, TileServiceConfig};

/// Key used for the shared counter in tests.
pub const TEST_LIMITER_KEY: &str = "test_hillshade_concurrency";

/// A scratch directory holding a tile cache and a fake data source.
pub struct TestEnv {
    dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        fs::create_dir_all(dir.path().join("cache")).expect("failed to create cache dir");
        fs::write(dir.path().join("dem.tif"), b"").expect("failed to create data source");
        Self { dir }
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn data_source(&self) -> PathBuf {
        self.dir.path().join("dem.tif")
    }

    /// Cache file for `z/x/y`.
    pub fn tile_path(&self, z: u32, x: u32, y: u32) -> PathBuf {
        self.cache_dir()
            .join(z.to_string())
            .join(x.to_string())
            .join(format!("{}.png", y))
    }

    /// Put a tile into the cache as if it had been rendered earlier.
    pub fn seed_tile(&self, z: u32, x: u32, y: u32, bytes: &[u8]) -> PathBuf {
        let path = self.tile_path(z, x, y);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create tile dir");
        }
        fs::write(&path, bytes).expect("failed to seed tile");
        path
    }

    /// A configuration pointing at this environment.
    ///
    /// Zooms 0..=18 are valid, tiles below zoom 2 get the placeholder, and
    /// one data source covers every zoom. The limiter allows two renders,
    /// polls every 10ms and gives up after one second. The renderer runs
    /// `renderer_script` through `/bin/sh`.
    pub fn config(&self, renderer_script: &Path) -> TileServiceConfig {
        let mut data_sources = BTreeMap::new();
        data_sources.insert(18, self.data_source());

        TileServiceConfig {
            max_zoom: 18,
            min_zoom: 2,
            cache_dir: self.cache_dir(),
            cache_expiration_secs: 3600,
            debug_enabled: true,
            empty_tile: None,
            data_sources,
            limiter: LimiterConfig {
                key: TEST_LIMITER_KEY.to_string(),
                max_concurrency: 2,
                poll_interval_ms: 10,
                wait_timeout_secs: 1.0,
                redis_url: "redis://127.0.0.1:6379".to_string(),
            },
            renderer: RendererConfig {
                program: "/bin/sh".to_string(),
                args: vec![renderer_script.display().to_string()],
                timeout_secs: 10,
            },
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}
