//! HTTP request handlers.
//!
//! - `tile`: tile requests (query and path forms)
//! - `metrics`: health checks, Prometheus metrics and the JSON metrics view

pub mod metrics;
pub mod tile;

pub use metrics::{api_metrics_handler, health_handler, metrics_handler, ready_handler};
pub use tile::{path_tile_handler, query_tile_handler, TileQuery};
