//! Session handle for a held lock

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// Proof that a lock was held at some point, and until when it can safely be
/// assumed to still be held.
///
/// `deadline` is conservative: it is computed from the caller's clock with the
/// acquisition round trip subtracted from the lease, so it never falls after
/// the moment the store expires the key. Sessions are immutable; extending a
/// lock yields a new session with the same token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    name: Arc<str>,
    token: String,
    deadline: Instant,
}

impl Session {
    pub(crate) fn new(name: Arc<str>, token: String, deadline: Instant) -> Self {
        Self {
            name,
            token,
            deadline,
        }
    }

    /// Name of the lock this session belongs to
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Token stored under the lock key while this session owns it
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left before the conservative deadline, zero once passed
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_remaining_and_expiry() {
        let session = Session::new(
            Arc::from("orders"),
            "token".to_string(),
            Instant::now() + Duration::from_millis(100),
        );
        assert_eq!(session.name(), "orders");
        assert_eq!(session.token(), "token");
        assert_eq!(session.remaining(), Duration::from_millis(100));
        assert!(!session.is_expired());

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(session.remaining(), Duration::ZERO);
        assert!(session.is_expired());
    }
}
