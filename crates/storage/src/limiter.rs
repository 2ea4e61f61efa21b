//! Concurrency limiter over a [`SharedCounter`].
//!
//! Each render holds one unit of a named counter for as long as it runs.
//! Acquisition increments first and undoes the increment when the result
//! is over the limit, then either sleeps and retries or gives up once the
//! wait budget is spent.
//!
//! Releasing is tied to [`SlotGuard`]: the decrement happens exactly once,
//! either through [`SlotGuard::release`] or when the guard is dropped on an
//! early return, a panic, or cancellation of the owning future.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, error, warn};

use tile_common::{LimiterConfig, TileError, TileResult};

use crate::counter::SharedCounter;

/// Caps simultaneous holders of a named shared counter.
#[derive(Clone)]
pub struct ConcurrencyLimiter {
    counter: Arc<dyn SharedCounter>,
    key: String,
    limit: u32,
    poll_interval: Duration,
    timeout: Duration,
}

impl ConcurrencyLimiter {
    pub fn new(
        counter: Arc<dyn SharedCounter>,
        key: impl Into<String>,
        limit: u32,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            counter,
            key: key.into(),
            limit,
            poll_interval,
            timeout,
        }
    }

    /// Build a limiter from the `limiter` section of the service config.
    pub fn from_config(counter: Arc<dyn SharedCounter>, config: &LimiterConfig) -> Self {
        Self::new(
            counter,
            config.key.clone(),
            config.max_concurrency,
            config.poll_interval(),
            config.wait_timeout(),
        )
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn counter(&self) -> &Arc<dyn SharedCounter> {
        &self.counter
    }

    /// Wait for a slot.
    ///
    /// Fails with `LimitExceeded` once `timeout` has passed without a free
    /// slot (immediately when the poll interval is zero), and with
    /// `LimiterBackendError` when the counter store cannot be reached.
    pub async fn acquire(&self) -> TileResult<SlotGuard> {
        let start = Instant::now();
        self.counter.ensure(&self.key).await?;

        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let value = self.counter.increment(&self.key).await?;
            // Guard the increment right away so a cancelled wait still undoes it
            let guard = SlotGuard::new(Arc::clone(&self.counter), self.key.clone(), value);

            if value <= i64::from(self.limit) {
                debug!(key = %self.key, value, attempts, "Concurrency slot acquired");
                return Ok(guard);
            }

            guard.release().await?;

            if self.poll_interval.is_zero() || start.elapsed() > self.timeout {
                warn!(
                    key = %self.key,
                    limit = self.limit,
                    attempts,
                    waited_ms = start.elapsed().as_millis() as u64,
                    "Concurrency limit reached"
                );
                return Err(TileError::LimitExceeded {
                    key: self.key.clone(),
                    limit: self.limit,
                });
            }

            debug!(key = %self.key, value, attempts, "Concurrency limit busy, waiting");
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

/// One held unit of a shared counter.
#[must_use = "dropping the guard releases the slot immediately"]
pub struct SlotGuard {
    counter: Arc<dyn SharedCounter>,
    key: String,
    value: i64,
    released: bool,
}

impl SlotGuard {
    fn new(counter: Arc<dyn SharedCounter>, key: String, value: i64) -> Self {
        Self {
            counter,
            key,
            value,
            released: false,
        }
    }

    /// Counter value observed when this slot was taken.
    pub fn value(&self) -> i64 {
        self.value
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Give the slot back and wait for the store to confirm.
    ///
    /// The decrement runs on its own task, so dropping this future part
    /// way through still returns the slot exactly once.
    pub async fn release(mut self) -> TileResult<()> {
        self.released = true;
        if self.counter.decrement_now(&self.key).is_some() {
            return Ok(());
        }

        let counter = Arc::clone(&self.counter);
        let key = std::mem::take(&mut self.key);
        tokio::spawn(async move { counter.decrement(&key).await })
            .await
            .map_err(|e| TileError::LimiterBackendError(format!("release task failed: {}", e)))?
            .map(|_| ())
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        if self.counter.decrement_now(&self.key).is_some() {
            return;
        }

        let counter = Arc::clone(&self.counter);
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = counter.decrement(&key).await {
                        error!(key = %key, error = %e, "Failed to release concurrency slot");
                    }
                });
            }
            Err(_) => {
                error!(key = %key, "No runtime to release concurrency slot; counter leaked");
            }
        }
    }
}
