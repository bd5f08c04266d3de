//! In-memory lease store
//!
//! Reproduces the acquire and release scripts over a `DashMap`. Each script
//! runs while holding the map entry, which gives the same single-key
//! atomicity Redis gives a Lua script. Expiry is lazy: an expired entry is
//! treated as absent by every read and replaced or dropped on the next write.
//!
//! Only processes sharing the same instance are coordinated, so this backend
//! suits tests and single-process deployments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use redlease_common::LockResult;
use tokio::time::Instant;

use crate::store::{LeaseStore, RELEASE_ABSENT, RELEASE_DELETED, RELEASE_NOT_OWNER, ScriptReply};

struct StoredValue {
    value: String,
    expires_at: Instant,
}

impl StoredValue {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Clone, Default)]
pub struct MemoryLeaseStore {
    entries: Arc<DashMap<String, StoredValue>>,
}

impl MemoryLeaseStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current live value of `key`
    pub fn get(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Time left before `key` expires
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.expires_at.saturating_duration_since(now))
    }

    /// Unconditionally write `key`, like a plain `SET key value PX ttl`
    pub fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            StoredValue {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LeaseStore for MemoryLeaseStore {
    async fn acquire_script(
        &self,
        key: &str,
        token: &str,
        lease_ms: u64,
    ) -> LockResult<ScriptReply> {
        let now = Instant::now();
        let expires_at = now + Duration::from_millis(lease_ms);

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.is_expired(now) || current.value == token {
                    // absent (expired) key or same-token renewal
                    occupied.insert(StoredValue {
                        value: token.to_string(),
                        expires_at,
                    });
                    Ok(ScriptReply::Status("OK".to_string()))
                } else {
                    Ok(ScriptReply::Nil)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue {
                    value: token.to_string(),
                    expires_at,
                });
                Ok(ScriptReply::Status("OK".to_string()))
            }
        }
    }

    async fn release_script(&self, key: &str, token: &str) -> LockResult<ScriptReply> {
        let now = Instant::now();

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    Ok(ScriptReply::Int(RELEASE_ABSENT))
                } else if occupied.get().value == token {
                    occupied.remove();
                    Ok(ScriptReply::Int(RELEASE_DELETED))
                } else {
                    Ok(ScriptReply::Int(RELEASE_NOT_OWNER))
                }
            }
            Entry::Vacant(_) => Ok(ScriptReply::Int(RELEASE_ABSENT)),
        }
    }
}
