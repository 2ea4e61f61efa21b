//! Error types for the hillshade tile service.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using TileError.
pub type TileResult<T> = Result<T, TileError>;

/// Primary error type for tile operations.
#[derive(Debug, Error)]
pub enum TileError {
    // === Request Errors ===
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid parameter value for '{param}': {value}")]
    InvalidParameter { param: &'static str, value: String },

    #[error("Zoom level {zoom} outside [0, {max_zoom}]")]
    OutOfRangeZoom { zoom: i64, max_zoom: u32 },

    #[error("Tile ({x}, {y}) outside the {world_res}x{world_res} grid at zoom {zoom}")]
    OutOfRangeCoordinate {
        zoom: u32,
        x: i64,
        y: i64,
        world_res: u64,
    },

    // === Configuration Errors ===
    #[error("No data source configured for zoom {0}")]
    ConfigurationError(u32),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Cache Errors ===
    #[error("Cache directory {path} could not be created: {message}")]
    CacheDirectoryError { path: PathBuf, message: String },

    #[error("Failed to read cached tile {path}: {message}")]
    CacheReadError { path: PathBuf, message: String },

    // === Limiter Errors ===
    #[error("Concurrency limit of {limit} reached for '{key}'")]
    LimitExceeded { key: String, limit: u32 },

    #[error("Shared counter backend error: {0}")]
    LimiterBackendError(String),

    // === Rendering Errors ===
    #[error("Renderer exited with {}", exit_label(.exit_code))]
    RenderFailed {
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Renderer did not finish within {0} seconds")]
    RenderTimeout(u64),

    #[error("Failed to start renderer: {0}")]
    RenderSpawnError(String),
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

impl TileError {
    /// Get the HTTP status code for this error.
    ///
    /// Only the limiter rejection is distinguished; request validation
    /// failures map to 500 like every other error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            TileError::LimitExceeded { .. } => 429,
            _ => 500,
        }
    }

    /// Short plain-text message safe to return to clients.
    ///
    /// Never includes filesystem paths or backend addresses. Renderer output
    /// is left to the logs.
    pub fn public_message(&self) -> &'static str {
        match self {
            TileError::MissingParameter(_) => "Some argument missing!",
            TileError::InvalidParameter { .. } => "Invalid argument!",
            TileError::OutOfRangeZoom { .. } => "Zoom out of range!",
            TileError::OutOfRangeCoordinate { .. } => "Coords out of range!",
            TileError::ConfigurationError(_) => "Can't determine data file",
            TileError::InvalidConfig(_) => "Service misconfigured.",
            TileError::CacheDirectoryError { .. } => "Cache directory creation fails.",
            TileError::CacheReadError { .. } => "Cached tile unreadable.",
            TileError::LimitExceeded { .. } => "429: Too Many Requests",
            TileError::LimiterBackendError(_) => "Can't connect to shared counter.",
            TileError::RenderFailed { .. }
            | TileError::RenderTimeout(_)
            | TileError::RenderSpawnError(_) => "Process failed",
        }
    }

    /// Whether traced mode may turn this error into diagnostic text.
    ///
    /// Missing arguments and structural failures (cache directory, shared
    /// counter backend, configuration) stay fatal in every mode.
    pub fn is_diagnosable(&self) -> bool {
        matches!(
            self,
            TileError::InvalidParameter { .. }
                | TileError::OutOfRangeZoom { .. }
                | TileError::OutOfRangeCoordinate { .. }
                | TileError::RenderFailed { .. }
                | TileError::RenderTimeout(_)
                | TileError::RenderSpawnError(_)
        )
    }
}
