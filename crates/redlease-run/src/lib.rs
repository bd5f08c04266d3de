//! # redlease Run
//!
//! Run a unit of work while holding a [`LeaseLock`](redlease_lock::LeaseLock):
//! retry acquisition until it succeeds or the caller's context finishes, run
//! the work under a context bounded by the session deadline, then release the
//! lock even if the work failed, panicked, or the caller gave up.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use redlease_common::LockContext;
//! use redlease_lock::{LeaseLock, RedisLeaseStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisLeaseStore::connect("redis://127.0.0.1/").await?;
//! let lock = LeaseLock::new(Arc::new(store), "reports:nightly", Duration::from_secs(30))?;
//! let ctx = LockContext::background().with_timeout(Duration::from_secs(60));
//!
//! redlease_run::run(
//!     &ctx,
//!     &lock,
//!     |work_ctx| async move {
//!         // stop once work_ctx is done
//!         work_ctx.sleep(Duration::from_secs(1)).await?;
//!         Ok(())
//!     },
//!     Duration::from_millis(100),
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod runner;

pub use runner::{RunOptions, Runner, run, run_with_logger};
