//! Redis-backed lease store.
//!
//! Scripts are loaded once and invoked with `EVALSHA`, falling back to
//! `EVAL` when the server does not have them cached yet.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script, Value};
use redlease_common::{LockError, LockResult, LockSettings};

use crate::store::{ACQUIRE_SCRIPT, LeaseStore, RELEASE_SCRIPT, ScriptReply};

/// Lease store talking to Redis (or any server that runs Redis Lua scripts)
///
/// ## Design Decisions
/// - **ConnectionManager**: multiplexed connection with automatic reconnect,
///   cloned per call so concurrent lock operations never wait on each other
/// - **Script**: script bodies are hashed once, not per call
#[derive(Clone)]
pub struct RedisLeaseStore {
    manager: ConnectionManager,
    acquire: Script,
    release: Script,
}

impl RedisLeaseStore {
    /// Connect to the server at `url`
    ///
    /// Example URLs:
    /// - `redis://127.0.0.1/`
    /// - `rediss://host:6380/`
    pub async fn connect(url: &str) -> LockResult<Self> {
        let client = Client::open(url).map_err(store_error)?;
        Self::from_client(client).await
    }

    /// Connect to `settings.redis_url`
    pub async fn from_settings(settings: &LockSettings) -> LockResult<Self> {
        Self::connect(&settings.redis_url).await
    }

    pub async fn from_client(client: Client) -> LockResult<Self> {
        let manager = ConnectionManager::new(client).await.map_err(store_error)?;
        Ok(Self::from_manager(manager))
    }

    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager,
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        }
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn acquire_script(
        &self,
        key: &str,
        token: &str,
        lease_ms: u64,
    ) -> LockResult<ScriptReply> {
        let mut conn = self.manager.clone();
        let value: Value = self
            .acquire
            .key(key)
            .arg(token)
            .arg(lease_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(reply_from_value(value))
    }

    async fn release_script(&self, key: &str, token: &str) -> LockResult<ScriptReply> {
        let mut conn = self.manager.clone();
        let value: Value = self
            .release
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await
            .map_err(store_error)?;
        Ok(reply_from_value(value))
    }
}

pub(crate) fn store_error(err: redis::RedisError) -> LockError {
    LockError::Store(format!("Redis error: {}", err))
}

/// Map a raw Redis reply onto the store-agnostic reply type
pub(crate) fn reply_from_value(value: Value) -> ScriptReply {
    match value {
        Value::Nil => ScriptReply::Nil,
        Value::Okay => ScriptReply::Status("OK".to_string()),
        Value::SimpleString(s) => ScriptReply::Status(s),
        Value::Int(n) => ScriptReply::Int(n),
        Value::BulkString(bytes) => match String::from_utf8(bytes) {
            Ok(s) => ScriptReply::Text(s),
            Err(e) => ScriptReply::Other(format!("{:?}", e.into_bytes())),
        },
        other => ScriptReply::Other(format!("{:?}", other)),
    }
}
