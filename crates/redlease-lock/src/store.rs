//! Store port for the lock scripts
//!
//! A backing store only has to run two atomic scripts against a single key.
//! Both scripts are written in Redis Lua; non-Redis stores must reproduce
//! their semantics exactly (see [`crate::memory::MemoryLeaseStore`]).

use async_trait::async_trait;
use redlease_common::LockResult;

/// Take ownership of `KEYS[1]` for token `ARGV[1]` with a lease of `ARGV[2]` ms.
///
/// If the key already holds the same token its expiry is refreshed
/// (re-entrant renewal). Otherwise the key is set only if absent, so two
/// contenders can never both observe "absent" and both write.
pub const ACQUIRE_SCRIPT: &str = r#"if redis.call("GET", KEYS[1]) == ARGV[1] then
    redis.call("SET", KEYS[1], ARGV[1], "PX", ARGV[2])
    return "OK"
else
    return redis.call("SET", KEYS[1], ARGV[1], "NX", "PX", ARGV[2])
end"#;

/// Drop `KEYS[1]` if it still holds token `ARGV[1]`.
///
/// Replies: `2` key absent, `3` owned by another token (key untouched),
/// otherwise the `DEL` count (`1`, or `0` if the key vanished in between).
pub const RELEASE_SCRIPT: &str = r#"local current = redis.call("GET", KEYS[1])
if current == false then
    return 2
elseif current == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 3
end"#;

/// Release script reply: deleted by this call
pub const RELEASE_DELETED: i64 = 1;
/// Release script reply: key vanished between the read and the delete
pub const RELEASE_VANISHED: i64 = 0;
/// Release script reply: key was already absent
pub const RELEASE_ABSENT: i64 = 2;
/// Release script reply: key is owned by another token
pub const RELEASE_NOT_OWNER: i64 = 3;

/// Store-agnostic view of a script reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptReply {
    /// No value (Lua `false`, e.g. a failed `SET NX`)
    Nil,
    /// Status reply such as `OK`
    Status(String),
    /// Bulk string reply
    Text(String),
    Int(i64),
    /// Any other reply shape, rendered for logging
    Other(String),
}

impl ScriptReply {
    /// True for an `OK` status or bulk reply
    pub fn is_ok_marker(&self) -> bool {
        match self {
            ScriptReply::Status(s) | ScriptReply::Text(s) => s == "OK",
            _ => false,
        }
    }

    /// Short name of the reply shape
    pub fn kind(&self) -> &'static str {
        match self {
            ScriptReply::Nil => "nil",
            ScriptReply::Status(_) => "status",
            ScriptReply::Text(_) => "text",
            ScriptReply::Int(_) => "int",
            ScriptReply::Other(_) => "other",
        }
    }
}

impl std::fmt::Display for ScriptReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScriptReply::Nil => write!(f, "nil"),
            ScriptReply::Status(s) | ScriptReply::Text(s) | ScriptReply::Other(s) => {
                write!(f, "{}", s)
            }
            ScriptReply::Int(n) => write!(f, "{}", n),
        }
    }
}

/// A key-value store able to run the acquire and release scripts atomically
#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Run [`ACQUIRE_SCRIPT`] against `key`
    async fn acquire_script(&self, key: &str, token: &str, lease_ms: u64)
    -> LockResult<ScriptReply>;

    /// Run [`RELEASE_SCRIPT`] against `key`
    async fn release_script(&self, key: &str, token: &str) -> LockResult<ScriptReply>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_marker() {
        assert!(ScriptReply::Status("OK".into()).is_ok_marker());
        assert!(ScriptReply::Text("OK".into()).is_ok_marker());
        assert!(!ScriptReply::Text("ok".into()).is_ok_marker());
        assert!(!ScriptReply::Nil.is_ok_marker());
        assert!(!ScriptReply::Int(1).is_ok_marker());
    }

    #[test]
    fn test_reply_display_and_kind() {
        assert_eq!(ScriptReply::Nil.to_string(), "nil");
        assert_eq!(ScriptReply::Int(3).to_string(), "3");
        assert_eq!(ScriptReply::Other("[1, 2]".into()).kind(), "other");
        assert_eq!(ScriptReply::Status("OK".into()).kind(), "status");
    }

    #[test]
    fn test_scripts_reference_single_key() {
        for script in [ACQUIRE_SCRIPT, RELEASE_SCRIPT] {
            assert!(script.contains("KEYS[1]"));
            assert!(!script.contains("KEYS[2]"));
        }
        assert!(ACQUIRE_SCRIPT.contains("\"NX\""));
        assert!(RELEASE_SCRIPT.contains("\"DEL\""));
    }
}
