//! Application state and shared resources.

use anyhow::{Context, Result};
use bytes::Bytes;
use std::sync::Arc;
use tracing::info;

use renderer::{png, Renderer};
use storage::{ConcurrencyLimiter, SharedCounter};
use tile_common::TileServiceConfig;

use crate::metrics::MetricsCollector;
use crate::service::TileService;

/// Shared application state.
pub struct AppState {
    pub config: Arc<TileServiceConfig>,
    pub service: TileService,
    pub counter: Arc<dyn SharedCounter>,
    pub metrics: Arc<MetricsCollector>,
    /// Bytes served for tiles below the render floor
    pub placeholder: Bytes,
}

impl AppState {
    pub async fn new(
        config: TileServiceConfig,
        counter: Arc<dyn SharedCounter>,
        renderer: Arc<dyn Renderer>,
    ) -> Result<Self> {
        let config = Arc::new(config);
        let placeholder = load_placeholder(&config).await?;
        let metrics = Arc::new(MetricsCollector::new());

        let limiter = ConcurrencyLimiter::from_config(counter.clone(), &config.limiter);
        let service = TileService::new(config.clone(), limiter, renderer, metrics.clone());

        Ok(Self {
            config,
            service,
            counter,
            metrics,
            placeholder,
        })
    }
}

async fn load_placeholder(config: &TileServiceConfig) -> Result<Bytes> {
    match &config.empty_tile {
        Some(path) => {
            let data = tokio::fs::read(path)
                .await
                .with_context(|| format!("reading empty tile {}", path.display()))?;
            info!(path = %path.display(), bytes = data.len(), "Loaded placeholder tile");
            Ok(Bytes::from(data))
        }
        None => {
            let data = png::transparent_tile().map_err(anyhow::Error::msg)?;
            Ok(Bytes::from(data))
        }
    }
}
