//! Shared integer counters backing the render concurrency limiter.
//!
//! A counter lives outside any single request so that every request
//! handler, in this process or another one, observes the same value. All
//! mutation goes through atomic increment/decrement in the backing store.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use tile_common::{TileError, TileResult};

/// An atomic named counter shared by all request handlers.
#[async_trait]
pub trait SharedCounter: Send + Sync {
    /// Create the counter with value 0 unless it already exists.
    ///
    /// Must never reset a counter that another holder already raised.
    async fn ensure(&self, key: &str) -> TileResult<()>;

    /// Atomically add one and return the new value.
    async fn increment(&self, key: &str) -> TileResult<i64>;

    /// Atomically subtract one and return the new value.
    async fn decrement(&self, key: &str) -> TileResult<i64>;

    /// Current value, 0 if the counter does not exist yet.
    async fn current(&self, key: &str) -> TileResult<i64>;

    /// Check that the backing store is reachable.
    async fn ping(&self) -> TileResult<()>;

    /// Decrement without awaiting, for backends that can do so in place.
    ///
    /// Returns `None` when the backend needs async I/O; callers then fall
    /// back to [`SharedCounter::decrement`] on a spawned task.
    fn decrement_now(&self, _key: &str) -> Option<i64> {
        None
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// Process-local counters.
///
/// Only coordinates handlers inside one process; use [`RedisCounter`] when
/// several service instances share a render host.
#[derive(Debug, Default)]
pub struct MemoryCounter {
    values: Mutex<HashMap<String, i64>>,
}

impl MemoryCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, key: &str, delta: i64) -> i64 {
        let mut values = self
            .values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let value = values.entry(key.to_string()).or_insert(0);
        *value += delta;
        *value
    }

    /// Read a counter without going through the async interface.
    pub fn value(&self, key: &str) -> i64 {
        self.values
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(key)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl SharedCounter for MemoryCounter {
    async fn ensure(&self, key: &str) -> TileResult<()> {
        self.update(key, 0);
        Ok(())
    }

    async fn increment(&self, key: &str) -> TileResult<i64> {
        Ok(self.update(key, 1))
    }

    async fn decrement(&self, key: &str) -> TileResult<i64> {
        Ok(self.update(key, -1))
    }

    async fn current(&self, key: &str) -> TileResult<i64> {
        Ok(self.value(key))
    }

    async fn ping(&self) -> TileResult<()> {
        Ok(())
    }

    fn decrement_now(&self, key: &str) -> Option<i64> {
        Some(self.update(key, -1))
    }
}

// ============================================================================
// Redis backend
// ============================================================================

/// Counters held in Redis, shared by every process pointed at the same
/// server.
///
/// The connection is opened on first use and dropped after a failed
/// command, so a Redis restart costs the in-flight requests a
/// `LimiterBackendError` and later requests reconnect.
pub struct RedisCounter {
    client: Client,
    conn: AsyncMutex<Option<MultiplexedConnection>>,
}

impl RedisCounter {
    /// Create a counter client. No connection is made until first use.
    pub fn new(redis_url: &str) -> TileResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            TileError::LimiterBackendError(format!("invalid Redis URL: {}", e))
        })?;

        Ok(Self {
            client,
            conn: AsyncMutex::new(None),
        })
    }

    /// Create a counter client and verify the server answers.
    pub async fn connect(redis_url: &str) -> TileResult<Self> {
        let counter = Self::new(redis_url)?;
        counter.ping().await?;
        Ok(counter)
    }

    async fn connection(&self) -> TileResult<MultiplexedConnection> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        debug!("Opening Redis connection for shared counter");
        let conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| TileError::LimiterBackendError(format!("Redis connection failed: {}", e)))?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn reset_connection(&self) {
        *self.conn.lock().await = None;
    }

    async fn backend_error(&self, op: &str, err: redis::RedisError) -> TileError {
        warn!(operation = op, error = %err, "Shared counter command failed");
        if err.is_connection_dropped() || err.is_io_error() || err.is_timeout() {
            self.reset_connection().await;
        }
        TileError::LimiterBackendError(format!("{} failed: {}", op, err))
    }
}

#[async_trait]
impl SharedCounter for RedisCounter {
    async fn ensure(&self, key: &str) -> TileResult<()> {
        let mut conn = self.connection().await?;
        // SETNX: only the first writer creates the key
        let result: Result<bool, _> = conn.set_nx(key, 0i64).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(self.backend_error("SETNX", e).await),
        }
    }

    async fn increment(&self, key: &str) -> TileResult<i64> {
        let mut conn = self.connection().await?;
        let result: Result<i64, _> = conn.incr(key, 1i64).await;
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.backend_error("INCR", e).await),
        }
    }

    async fn decrement(&self, key: &str) -> TileResult<i64> {
        let mut conn = self.connection().await?;
        let result: Result<i64, _> = conn.decr(key, 1i64).await;
        match result {
            Ok(value) => Ok(value),
            Err(e) => Err(self.backend_error("DECR", e).await),
        }
    }

    async fn current(&self, key: &str) -> TileResult<i64> {
        let mut conn = self.connection().await?;
        let result: Result<Option<i64>, _> = conn.get(key).await;
        match result {
            Ok(value) => Ok(value.unwrap_or(0)),
            Err(e) => Err(self.backend_error("GET", e).await),
        }
    }

    async fn ping(&self) -> TileResult<()> {
        let mut conn = self.connection().await?;
        let result: Result<String, _> = redis::cmd("PING").query_async(&mut conn).await;
        match result {
            Ok(_) => Ok(()),
            Err(e) => Err(self.backend_error("PING", e).await),
        }
    }
}
