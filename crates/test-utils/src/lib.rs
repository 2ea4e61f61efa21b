//! Shared test utilities for the hillshade tile workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A temporary cache root with a matching service configuration
//! - Stub renderer scripts that honour the `source destination z x y`
//!   argument contract
//!
//! # Usage
//!
//! ```ignore
//! use test_utils::{TestEnv, stub_renderer, StubBehavior};
//!
//! let env = TestEnv::new();
//! let script = stub_renderer(env.dir(), StubBehavior::Succeed);
//! ```

pub mod fixtures;
pub mod scripts;

pub use fixtures::*;
pub use scripts::*;

/// Poll an expression until it holds or the deadline passes.
///
/// Used for state that settles on a spawned task, such as a slot released
/// from a guard's `Drop`.
///
/// ```ignore
/// wait_until!(counter.value("slots") == 0, Duration::from_secs(1));
/// ```
#[macro_export]
macro_rules! wait_until {
    ($cond:expr, $timeout:expr) => {{
        let deadline = std::time::Instant::now() + $timeout;
        loop {
            if $cond {
                break;
            }
            if std::time::Instant::now() >= deadline {
                panic!("condition `{}` not met within {:?}", stringify!($cond), $timeout);
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
    }};
}
