//! Lease lock primitive
//!
//! Provides:
//! - Acquire with a fresh or caller-supplied session token
//! - Release that never deletes another session's key
//! - Extend (same-token re-acquire, refreshing the lease)

use std::sync::Arc;
use std::time::Duration;

use redlease_common::{
    LockContext, LockError, LockResult, LockSettings, Logger, NopLogger, TokenGenerator,
    UuidTokenGenerator, fields,
};
use tokio::time::Instant;

use crate::metrics::{Outcome, record_acquire, record_release};
use crate::session::Session;
use crate::store::{
    LeaseStore, RELEASE_ABSENT, RELEASE_DELETED, RELEASE_NOT_OWNER, RELEASE_VANISHED, ScriptReply,
};

/// A named lock with a fixed lease, backed by a [`LeaseStore`].
///
/// The lock itself holds no session state: every successful acquire returns a
/// [`Session`], and the store key is the only record of who owns the lock.
/// Cloning is cheap and clones share the store handle, so one `LeaseLock` can
/// be used from many tasks at once.
#[derive(Clone)]
pub struct LeaseLock {
    store: Arc<dyn LeaseStore>,
    name: Arc<str>,
    lease: Duration,
    logger: Arc<dyn Logger>,
    tokens: Arc<dyn TokenGenerator>,
}

impl std::fmt::Debug for LeaseLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseLock")
            .field("name", &self.name)
            .field("lease", &self.lease)
            .finish_non_exhaustive()
    }
}

impl LeaseLock {
    /// Create a lock named `name` granting `lease` per acquisition.
    ///
    /// ## Errors
    /// - [`LockError::InvalidArgument`]: blank name, or a lease shorter than
    ///   the store's one millisecond expiry resolution
    pub fn new(
        store: Arc<dyn LeaseStore>,
        name: impl Into<String>,
        lease: Duration,
    ) -> LockResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(LockError::InvalidArgument(
                "lock name must not be empty".to_string(),
            ));
        }
        if lease.as_millis() == 0 {
            return Err(LockError::InvalidArgument(format!(
                "lease must be at least 1ms, got {:?}",
                lease
            )));
        }
        Ok(Self {
            store,
            name: Arc::from(name),
            lease,
            logger: Arc::new(NopLogger),
            tokens: Arc::new(UuidTokenGenerator),
        })
    }

    /// Create a lock named `name` with the lease from `settings`
    pub fn from_settings(
        store: Arc<dyn LeaseStore>,
        name: impl Into<String>,
        settings: &LockSettings,
    ) -> LockResult<Self> {
        Self::new(store, name, settings.lease())
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_token_generator(mut self, tokens: Arc<dyn TokenGenerator>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn logger(&self) -> &Arc<dyn Logger> {
        &self.logger
    }

    /// Generate a session token with this lock's token generator
    pub fn new_token(&self) -> String {
        self.tokens.new_token()
    }

    fn lease_ms(&self) -> u64 {
        u64::try_from(self.lease.as_millis()).unwrap_or(u64::MAX)
    }

    /// Try once to take the lock with a fresh session token.
    ///
    /// Returns `Ok(None)` when another session holds the lock.
    pub async fn acquire(&self, ctx: &LockContext) -> LockResult<Option<Session>> {
        let token = self.new_token();
        self.acquire_with_session(ctx, &token).await
    }

    /// Try once to take the lock using `token` as proof of ownership.
    ///
    /// If the key already holds `token`, the lease is refreshed instead.
    ///
    /// ## Returns
    /// - `Ok(Some(session))`: lock taken or renewed
    /// - `Ok(None)`: held by another session, or the store gave an
    ///   unrecognised reply (logged at error level)
    /// - `Err(LockError::Store)`: the outcome is unknown
    /// - `Err(LockError::Cancelled | DeadlineExceeded)`: `ctx` was already
    ///   finished; the store was not contacted
    pub async fn acquire_with_session(
        &self,
        ctx: &LockContext,
        token: &str,
    ) -> LockResult<Option<Session>> {
        if token.trim().is_empty() {
            return Err(LockError::InvalidArgument(
                "session token must not be empty".to_string(),
            ));
        }
        let log = self.logger.with_fields(fields![
            "action" => "acquire",
            "key" => &*self.name,
            "token" => token,
        ]);

        // once sent, the script may commit, so the reply is always awaited
        if let Some(err) = ctx.err() {
            log.debug("context finished before the request was sent", &fields!["error" => &err]);
            return Err(err);
        }

        let start = Instant::now();
        let reply = match self
            .store
            .acquire_script(&self.name, token, self.lease_ms())
            .await
        {
            Ok(reply) => reply,
            Err(err) => {
                log.error("acquire request failed", &fields!["error" => &err]);
                record_acquire(&self.name, Outcome::Error, start.elapsed());
                return Err(err);
            }
        };

        if reply.is_ok_marker() {
            let now = Instant::now();
            let spent = now.duration_since(start);
            let deadline = now + self.lease.saturating_sub(spent);
            log.debug(
                "lock acquired",
                &fields!["spent_ms" => spent.as_millis(), "valid_ms" => deadline.duration_since(now).as_millis()],
            );
            record_acquire(&self.name, Outcome::Acquired, spent);
            return Ok(Some(Session::new(
                self.name.clone(),
                token.to_string(),
                deadline,
            )));
        }

        match reply {
            ScriptReply::Nil => {
                log.debug("lock is held by another session", &[]);
                record_acquire(&self.name, Outcome::Contended, start.elapsed());
            }
            other => {
                log.error(
                    "unexpected acquire reply",
                    &fields!["reply" => &other, "reply_kind" => other.kind()],
                );
                record_acquire(&self.name, Outcome::Unexpected, start.elapsed());
            }
        }
        Ok(None)
    }

    /// Give the lock up if `session` still owns it.
    ///
    /// ## Returns
    /// - `Ok(true)`: the key was deleted, or was already gone
    /// - `Ok(false)`: another session owns the key (left untouched), or the
    ///   store gave an unrecognised reply (logged at error level)
    /// - `Err(LockError::NameMismatch)`: `session` belongs to another lock
    /// - `Err(LockError::Store)`: the outcome is unknown
    pub async fn release(&self, ctx: &LockContext, session: &Session) -> LockResult<bool> {
        self.check_session(session)?;
        let log = self.logger.with_fields(fields![
            "action" => "release",
            "key" => &*self.name,
            "token" => session.token(),
        ]);

        let reply = match ctx
            .run(self.store.release_script(&self.name, session.token()))
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(err)) => {
                log.error("release request failed", &fields!["error" => &err]);
                record_release(&self.name, Outcome::Error);
                return Err(err);
            }
            Err(err) => {
                log.debug("context finished before the store replied", &fields!["error" => &err]);
                return Err(err);
            }
        };

        let message = match reply {
            ScriptReply::Int(RELEASE_DELETED) => "lock released",
            ScriptReply::Int(RELEASE_VANISHED) => "lock vanished between read and delete",
            ScriptReply::Int(RELEASE_ABSENT) => "lock already expired or released",
            ScriptReply::Int(RELEASE_NOT_OWNER) => {
                log.debug("lock is owned by another session", &[]);
                record_release(&self.name, Outcome::NotOwner);
                return Ok(false);
            }
            other => {
                log.error(
                    "unexpected release reply",
                    &fields!["reply" => &other, "reply_kind" => other.kind()],
                );
                record_release(&self.name, Outcome::Unexpected);
                return Ok(false);
            }
        };
        log.debug(message, &[]);
        record_release(&self.name, Outcome::Released);
        Ok(true)
    }

    /// Refresh the lease of a held lock, keeping the session token.
    ///
    /// Returns `Ok(None)` if the lock has meanwhile been taken by another
    /// session.
    pub async fn extend(&self, ctx: &LockContext, session: &Session) -> LockResult<Option<Session>> {
        self.check_session(session)?;
        self.acquire_with_session(ctx, session.token()).await
    }

    fn check_session(&self, session: &Session) -> LockResult<()> {
        if session.name() != &*self.name {
            return Err(LockError::NameMismatch {
                lock: self.name.to_string(),
                session: session.name().to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use parking_lot::Mutex;
    use redlease_common::{Level, RecordingLogger};

    use super::*;
    use crate::memory::MemoryLeaseStore;

    /// Store that replays canned replies and counts calls
    #[derive(Default)]
    struct ScriptedStore {
        acquire: Mutex<Vec<LockResult<ScriptReply>>>,
        release: Mutex<Vec<LockResult<ScriptReply>>>,
        calls: AtomicUsize,
    }

    impl ScriptedStore {
        fn acquire_replies(replies: Vec<LockResult<ScriptReply>>) -> Self {
            Self {
                acquire: Mutex::new(replies),
                ..Default::default()
            }
        }

        fn release_replies(replies: Vec<LockResult<ScriptReply>>) -> Self {
            Self {
                release: Mutex::new(replies),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl LeaseStore for ScriptedStore {
        async fn acquire_script(&self, _: &str, _: &str, _: u64) -> LockResult<ScriptReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.acquire.lock().remove(0)
        }

        async fn release_script(&self, _: &str, _: &str) -> LockResult<ScriptReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.release.lock().remove(0)
        }
    }

    fn memory_lock(name: &str, lease: Duration) -> LeaseLock {
        LeaseLock::new(Arc::new(MemoryLeaseStore::new()), name, lease).unwrap()
    }

    #[test]
    fn test_new_validates_arguments() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());

        let err = LeaseLock::new(store.clone(), "  ", Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));

        let err = LeaseLock::new(store.clone(), "orders", Duration::ZERO).unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));

        let err = LeaseLock::new(store.clone(), "orders", Duration::from_micros(500)).unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));

        let lock = LeaseLock::new(store, "orders", Duration::from_millis(1)).unwrap();
        assert_eq!(lock.name(), "orders");
        assert_eq!(lock.lease(), Duration::from_millis(1));
        assert_eq!(lock.lease_ms(), 1);
    }

    #[test]
    fn test_from_settings_uses_configured_lease() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let settings = LockSettings {
            lease_ms: 1_500,
            ..Default::default()
        };

        let lock = LeaseLock::from_settings(store.clone(), "orders", &settings).unwrap();
        assert_eq!(lock.lease(), Duration::from_millis(1_500));

        let err = LeaseLock::from_settings(store, "", &settings).unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));
    }

    #[test]
    fn test_debug_hides_store() {
        let lock = memory_lock("orders", Duration::from_secs(1));
        let rendered = format!("{:?}", lock);
        assert!(rendered.contains("orders"));
        assert!(!rendered.contains("store"));
    }

    #[tokio::test]
    async fn test_blank_token_rejected() {
        let lock = memory_lock("orders", Duration::from_secs(1));
        let err = lock
            .acquire_with_session(&LockContext::background(), "")
            .await
            .unwrap_err();
        assert!(matches!(err, LockError::InvalidArgument(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_is_lease_minus_round_trip() {
        let lock = memory_lock("orders", Duration::from_millis(500));
        let before = Instant::now();
        let session = lock
            .acquire(&LockContext::background())
            .await
            .unwrap()
            .unwrap();
        assert!(session.deadline() <= before + Duration::from_millis(500));
        assert_eq!(session.remaining(), Duration::from_millis(500));
        assert_eq!(session.token().len(), redlease_common::TOKEN_LEN);
    }

    #[tokio::test]
    async fn test_release_with_foreign_session_is_rejected() {
        let store: Arc<dyn LeaseStore> = Arc::new(MemoryLeaseStore::new());
        let orders = LeaseLock::new(store.clone(), "orders", Duration::from_secs(5)).unwrap();
        let payments = LeaseLock::new(store, "payments", Duration::from_secs(5)).unwrap();
        let ctx = LockContext::background();

        let session = orders.acquire(&ctx).await.unwrap().unwrap();

        let err = payments.release(&ctx, &session).await.unwrap_err();
        assert!(matches!(err, LockError::NameMismatch { .. }));
        let err = payments.extend(&ctx, &session).await.unwrap_err();
        assert!(matches!(err, LockError::NameMismatch { .. }));

        assert!(orders.release(&ctx, &session).await.unwrap());
    }

    #[tokio::test]
    async fn test_unexpected_acquire_reply_is_logged_not_acquired() {
        let logger = RecordingLogger::new();
        let store = ScriptedStore::acquire_replies(vec![
            Ok(ScriptReply::Text("QUEUED".to_string())),
            Ok(ScriptReply::Int(1)),
        ]);
        let lock = LeaseLock::new(Arc::new(store), "orders", Duration::from_secs(1))
            .unwrap()
            .with_logger(Arc::new(logger.clone()));
        let ctx = LockContext::background();

        assert!(lock.acquire(&ctx).await.unwrap().is_none());
        assert!(lock.acquire(&ctx).await.unwrap().is_none());

        let errors = logger.records_at(Level::Error);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].field("reply"), Some("QUEUED"));
        assert_eq!(errors[1].field("reply_kind"), Some("int"));
        assert_eq!(errors[0].field("key"), Some("orders"));
    }

    #[tokio::test]
    async fn test_store_error_propagates() {
        let store = ScriptedStore::acquire_replies(vec![Err(LockError::Store(
            "connection reset".to_string(),
        ))]);
        let lock = LeaseLock::new(Arc::new(store), "orders", Duration::from_secs(1)).unwrap();

        let err = lock.acquire(&LockContext::background()).await.unwrap_err();
        assert!(err.is_store());
    }

    #[tokio::test]
    async fn test_release_reply_interpretation() {
        let logger = RecordingLogger::new();
        let store = Arc::new(ScriptedStore::release_replies(vec![
            Ok(ScriptReply::Int(RELEASE_VANISHED)),
            Ok(ScriptReply::Int(RELEASE_DELETED)),
            Ok(ScriptReply::Int(RELEASE_ABSENT)),
            Ok(ScriptReply::Int(RELEASE_NOT_OWNER)),
            Ok(ScriptReply::Int(42)),
            Ok(ScriptReply::Text("OK".to_string())),
            Err(LockError::Store("timeout".to_string())),
        ]));
        let lock = LeaseLock::new(store, "orders", Duration::from_secs(1))
            .unwrap()
            .with_logger(Arc::new(logger.clone()));
        let session = Session::new(
            Arc::from("orders"),
            "t1".to_string(),
            Instant::now() + Duration::from_secs(1),
        );
        let ctx = LockContext::background();

        assert!(lock.release(&ctx, &session).await.unwrap());
        assert!(lock.release(&ctx, &session).await.unwrap());
        assert!(lock.release(&ctx, &session).await.unwrap());
        assert!(!lock.release(&ctx, &session).await.unwrap());
        assert!(!lock.release(&ctx, &session).await.unwrap());
        assert!(!lock.release(&ctx, &session).await.unwrap());
        assert!(lock.release(&ctx, &session).await.unwrap_err().is_store());

        // unknown code, unknown shape, store failure
        assert_eq!(logger.records_at(Level::Error).len(), 3);
        assert!(logger.contains(Level::Debug, "owned by another session"));
    }

    #[tokio::test]
    async fn test_cancelled_context_reports_cancellation() {
        let store = Arc::new(ScriptedStore::acquire_replies(vec![Ok(ScriptReply::Nil)]));
        let lock = LeaseLock::new(store.clone(), "orders", Duration::from_secs(1)).unwrap();
        let ctx = LockContext::background();
        ctx.cancel();

        let err = lock.acquire(&ctx).await.unwrap_err();
        assert!(matches!(err, LockError::Cancelled));
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_custom_token_generator() {
        struct Fixed;
        impl TokenGenerator for Fixed {
            fn new_token(&self) -> String {
                "fixed-token".to_string()
            }
        }

        let lock = memory_lock("orders", Duration::from_secs(1)).with_token_generator(Arc::new(Fixed));
        let session = lock
            .acquire(&LockContext::background())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.token(), "fixed-token");
    }
}
