//! # redlease Lock
//!
//! Mutual-exclusion lock over a key-value store with expiring keys.
//!
//! ## Protocol
//! - **Acquire**: atomic "renew if mine, else set if absent" script; the
//!   stored value is the session token
//! - **Release**: atomic "delete only if mine" script; a key owned by another
//!   token is never touched
//! - **Extend**: acquire again with the same token
//!
//! A successful acquire yields a [`Session`] whose deadline is computed on the
//! caller's clock with the round trip subtracted from the lease, so it always
//! falls at or before the moment the store expires the key.
//!
//! ## Backend Support
//! - **Redis**: [`RedisLeaseStore`], any server running Redis Lua scripts
//! - **InMemory**: [`MemoryLeaseStore`], same script semantics in-process
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
//! let ctx = LockContext::background();
//!
//! if let Some(session) = lock.acquire(&ctx).await? {
//!     // ... protected work, finished before session.deadline() ...
//!     lock.release(&ctx, &session).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod lock;
pub mod memory;
pub mod metrics;
pub mod redis;
pub mod session;
pub mod store;

pub use lock::LeaseLock;
pub use memory::MemoryLeaseStore;
pub use redis::RedisLeaseStore;
pub use session::Session;
pub use store::{LeaseStore, ScriptReply};
