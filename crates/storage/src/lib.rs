//! Storage and coordination for the hillshade tile service.
//!
//! Provides:
//! - A file-backed tile cache (`{root}/{z}/{x}/{y}.png`)
//! - Shared counters (Redis or in-memory)
//! - A concurrency limiter with guard-based release over those counters

pub mod counter;
pub mod disk_cache;
pub mod limiter;

pub use counter::{MemoryCounter, RedisCounter, SharedCounter};
pub use disk_cache::TileDiskCache;
pub use limiter::{ConcurrencyLimiter, SlotGuard};
