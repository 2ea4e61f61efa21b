//! Common types and utilities shared across the hillshade tile crates.

pub mod config;
pub mod error;
pub mod tile;

pub use config::{LimiterConfig, RendererConfig, TileServiceConfig};
pub use error::{TileError, TileResult};
pub use tile::{world_resolution, TileCoord, MAX_SUPPORTED_ZOOM};
