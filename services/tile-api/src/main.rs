//! Hillshade tile API server.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::{env, net::SocketAddr, path::PathBuf, sync::Arc};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use renderer::CommandRenderer;
use storage::{MemoryCounter, RedisCounter, SharedCounter};
use tile_api::{router, AppState};
use tile_common::TileServiceConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LimiterBackend {
    /// Shared Redis counter, for several server processes
    Redis,
    /// In-process counter, for a single server
    Memory,
}

#[derive(Parser, Debug)]
#[command(name = "tile-api")]
#[command(about = "Hillshade tile cache and render server")]
struct Args {
    /// Listen address
    #[arg(short, long, default_value = "0.0.0.0:8080")]
    listen: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// YAML configuration file (defaults are used when absent)
    #[arg(short, long, env = "TILE_CONFIG")]
    config: Option<PathBuf>,

    /// Where the render concurrency counter lives
    #[arg(long, value_enum, default_value = "redis")]
    limiter: LimiterBackend,

    /// Number of tokio worker threads (default: number of CPU cores)
    #[arg(long)]
    worker_threads: Option<usize>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();

    if let Some(threads) = args.worker_threads {
        runtime_builder.worker_threads(threads);
    } else if let Ok(threads_str) = env::var("TOKIO_WORKER_THREADS") {
        if let Ok(threads) = threads_str.parse::<usize>() {
            runtime_builder.worker_threads(threads);
        }
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(args))?;
    Ok(())
}

async fn async_main(args: Args) -> Result<()> {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let prometheus_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    info!("Prometheus metrics exporter initialized");

    let mut config = match &args.config {
        Some(path) => {
            info!(path = %path.display(), "Loading configuration");
            TileServiceConfig::from_yaml_file(path)?
        }
        None => TileServiceConfig::default(),
    };
    config.apply_env_overrides();
    config.validate()?;

    info!(
        cache_dir = %config.cache_dir.display(),
        min_zoom = config.min_zoom,
        max_zoom = config.max_zoom,
        max_concurrency = config.limiter.max_concurrency,
        "Starting hillshade tile server"
    );

    let counter: Arc<dyn SharedCounter> = match args.limiter {
        LimiterBackend::Redis => {
            info!(url = %config.limiter.redis_url, "Using Redis concurrency counter");
            Arc::new(RedisCounter::new(&config.limiter.redis_url)?)
        }
        LimiterBackend::Memory => {
            info!("Using in-process concurrency counter");
            Arc::new(MemoryCounter::new())
        }
    };

    let renderer = Arc::new(CommandRenderer::from_config(&config.renderer));
    let state = Arc::new(AppState::new(config, counter, renderer).await?);

    let app = router(state, prometheus_handle);

    let addr: SocketAddr = args.listen.parse()?;
    info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
