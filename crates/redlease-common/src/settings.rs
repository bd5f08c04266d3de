//! Settings for locks and the lock runner
//!
//! Loaded with the `config` crate: built-in defaults, then an optional
//! settings file, then `REDLEASE_*` environment variables
//! (e.g. `REDLEASE_LEASE_MS=5000`).

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::DEFAULT_RELEASE_TIMEOUT_FLOOR_MS;
use crate::error::{LockError, LockResult};

pub const ENV_PREFIX: &str = "REDLEASE";

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_LEASE_MS: u64 = 30_000;
pub const DEFAULT_RETRY_INTERVAL_MS: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Connection URL of the backing store
    pub redis_url: String,
    /// Lease granted on every acquire or extend
    pub lease_ms: u64,
    /// Pause between acquire attempts and between release attempts
    pub retry_interval_ms: u64,
    /// Minimum timeout of a release attempt made after the caller gave up
    pub release_timeout_floor_ms: u64,
    /// Give up releasing after this many attempts; unbounded when unset
    pub max_release_attempts: Option<u32>,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            lease_ms: DEFAULT_LEASE_MS,
            retry_interval_ms: DEFAULT_RETRY_INTERVAL_MS,
            release_timeout_floor_ms: DEFAULT_RELEASE_TIMEOUT_FLOOR_MS,
            max_release_attempts: None,
        }
    }
}

impl LockSettings {
    /// Load settings from defaults, an optional file, and the environment
    pub fn load(path: Option<&Path>) -> LockResult<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        let settings: LockSettings = builder
            .add_source(Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> LockResult<()> {
        if self.redis_url.trim().is_empty() {
            return Err(LockError::Config("redis_url must not be empty".to_string()));
        }
        if self.lease_ms == 0 {
            return Err(LockError::Config("lease_ms must be positive".to_string()));
        }
        if self.max_release_attempts == Some(0) {
            return Err(LockError::Config(
                "max_release_attempts must be positive when set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_millis(self.retry_interval_ms)
    }

    pub fn release_timeout_floor(&self) -> Duration {
        Duration::from_millis(self.release_timeout_floor_ms)
    }
}
