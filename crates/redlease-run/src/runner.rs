//! Acquire, run, release
//!
//! ```text
//! ACQUIRING --ctx done--> CANCELLED
//!     |
//!     v
//!  HOLDING --work ok / work error / work panic--> RELEASING --> DONE
//! ```
//!
//! Releasing always happens: after work returns, after work panics, and when
//! the `run` future itself is dropped while the lock is held (the release
//! loop then continues on a spawned task).

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use redlease_common::{
    DEFAULT_RELEASE_TIMEOUT_FLOOR_MS, LockContext, LockError, LockResult, LockSettings, Logger,
    fields,
};
use redlease_common::settings::DEFAULT_RETRY_INTERVAL_MS;
use redlease_lock::metrics::record_release_abandoned;
use redlease_lock::{LeaseLock, Session};

/// Runner tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Pause between acquire attempts and between release attempts
    pub retry_interval: Duration,
    /// Minimum timeout of a release attempt once the caller's context is done
    pub release_timeout_floor: Duration,
    /// Stop retrying the release after this many attempts; `None` retries
    /// until the release is confirmed
    pub max_release_attempts: Option<u32>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            retry_interval: Duration::from_millis(DEFAULT_RETRY_INTERVAL_MS),
            release_timeout_floor: Duration::from_millis(DEFAULT_RELEASE_TIMEOUT_FLOOR_MS),
            max_release_attempts: None,
        }
    }
}

impl RunOptions {
    pub fn new(retry_interval: Duration) -> Self {
        Self {
            retry_interval,
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &LockSettings) -> Self {
        Self {
            retry_interval: settings.retry_interval(),
            release_timeout_floor: settings.release_timeout_floor(),
            max_release_attempts: settings.max_release_attempts,
        }
    }

    pub fn with_max_release_attempts(mut self, attempts: u32) -> Self {
        self.max_release_attempts = Some(attempts);
        self
    }

    pub fn with_release_timeout_floor(mut self, floor: Duration) -> Self {
        self.release_timeout_floor = floor;
        self
    }

    fn release_timeout(&self) -> Duration {
        self.retry_interval.max(self.release_timeout_floor)
    }
}

/// Runs work while holding a [`LeaseLock`]
#[derive(Clone)]
pub struct Runner {
    options: RunOptions,
    logger: Option<Arc<dyn Logger>>,
}

impl Runner {
    /// Runner logging through each lock's own logger
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Acquire `lock`, run `work`, release `lock`.
    ///
    /// `work` gets a context whose deadline is the session's conservative
    /// deadline (or the caller's, if earlier) and is expected to stop when
    /// it is done; the runner never interrupts it.
    ///
    /// ## Returns
    /// - `Ok(())`: work succeeded
    /// - `Err(LockError::Cancelled | DeadlineExceeded)`: `ctx` finished
    ///   before the lock was acquired; the store is not contacted once
    ///   `ctx` is known to be done
    /// - `Err(LockError::Work)`: work returned an error
    /// - `Err(LockError::Panicked)`: work panicked
    ///
    /// Release failures are logged and retried, never returned.
    pub async fn run<F, Fut>(&self, ctx: &LockContext, lock: &LeaseLock, work: F) -> LockResult<()>
    where
        F: FnOnce(LockContext) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let token = lock.new_token();
        let base = self.logger.as_ref().unwrap_or(lock.logger());
        let log = base.with_fields(fields!["key" => lock.name(), "token" => &token]);

        let session = self.acquire(ctx, lock, &token, &log).await?;

        let mut guard = ReleaseGuard {
            pending: Some(ReleaseTask {
                lock: lock.clone(),
                session: session.clone(),
                ctx: ctx.clone(),
                options: self.options.clone(),
                log: log.clone(),
            }),
        };

        let outcome = execute(ctx.with_deadline(session.deadline()), work).await;
        if let Err(err) = &outcome {
            log.debug("protected work failed", &fields!["error" => err]);
        }

        guard.release().await;
        outcome
    }

    async fn acquire(
        &self,
        ctx: &LockContext,
        lock: &LeaseLock,
        token: &str,
        log: &Arc<dyn Logger>,
    ) -> LockResult<Session> {
        let mut attempts: u64 = 0;
        loop {
            if let Some(err) = ctx.err() {
                log.debug(
                    "context finished before the lock was acquired",
                    &fields!["error" => &err, "attempts" => attempts],
                );
                return Err(err);
            }

            attempts += 1;
            match lock.acquire_with_session(ctx, token).await {
                Ok(Some(session)) => return Ok(session),
                Ok(None) => {}
                Err(err @ (LockError::InvalidArgument(_) | LockError::NameMismatch { .. })) => {
                    return Err(err);
                }
                Err(err) => {
                    log.debug("acquire attempt failed", &fields!["error" => &err]);
                }
            }

            // a finished context is reported at the top of the loop
            let _ = ctx.sleep(self.options.retry_interval).await;
        }
    }
}

/// Acquire `lock`, run `work`, release `lock`, retrying every `retry_interval`
pub async fn run<F, Fut>(
    ctx: &LockContext,
    lock: &LeaseLock,
    work: F,
    retry_interval: Duration,
) -> LockResult<()>
where
    F: FnOnce(LockContext) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    Runner::new(RunOptions::new(retry_interval))
        .run(ctx, lock, work)
        .await
}

/// Same as [`run`], logging through `logger` instead of the lock's logger
pub async fn run_with_logger<F, Fut>(
    ctx: &LockContext,
    lock: &LeaseLock,
    work: F,
    retry_interval: Duration,
    logger: Arc<dyn Logger>,
) -> LockResult<()>
where
    F: FnOnce(LockContext) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    Runner::new(RunOptions::new(retry_interval))
        .with_logger(logger)
        .run(ctx, lock, work)
        .await
}

/// Call `work` and await it, turning a panic in either step into an error
async fn execute<F, Fut>(ctx: LockContext, work: F) -> LockResult<()>
where
    F: FnOnce(LockContext) -> Fut,
    Fut: Future<Output = anyhow::Result<()>>,
{
    let fut = match std::panic::catch_unwind(AssertUnwindSafe(|| work(ctx))) {
        Ok(fut) => fut,
        Err(payload) => return Err(LockError::Panicked(panic_message(payload))),
    };
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(LockError::Work(err)),
        Err(payload) => Err(LockError::Panicked(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else if let Some(err) = payload.downcast_ref::<anyhow::Error>() {
        err.to_string()
    } else {
        "non-string panic payload".to_string()
    }
}

struct ReleaseTask {
    lock: LeaseLock,
    session: Session,
    ctx: LockContext,
    options: RunOptions,
    log: Arc<dyn Logger>,
}

impl ReleaseTask {
    /// Retry releasing until confirmed, or until the attempt ceiling
    async fn release_until_confirmed(&self) {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            // the caller's cancellation must not block cleanup
            let release_ctx = if self.ctx.is_done() {
                LockContext::background().with_timeout(self.options.release_timeout())
            } else {
                self.ctx.child()
            };

            match self.lock.release(&release_ctx, &self.session).await {
                Ok(true) => {
                    self.log
                        .debug("lock released", &fields!["attempts" => attempts]);
                    return;
                }
                Ok(false) => {
                    self.log.debug(
                        "release not confirmed, key held by another session",
                        &fields!["attempts" => attempts],
                    );
                }
                Err(err) => {
                    self.log.debug(
                        "release attempt failed",
                        &fields!["error" => &err, "attempts" => attempts],
                    );
                }
            }

            if let Some(max) = self.options.max_release_attempts
                && attempts >= max
            {
                self.log.error(
                    "giving up releasing lock, it will expire on its own",
                    &fields!["attempts" => attempts],
                );
                record_release_abandoned(self.lock.name());
                return;
            }

            tokio::time::sleep(self.options.retry_interval).await;
        }
    }
}

/// Keeps the release pending until it is confirmed. Dropping a guard with a
/// pending release hands the release loop to a spawned task.
struct ReleaseGuard {
    pending: Option<ReleaseTask>,
}

impl ReleaseGuard {
    async fn release(&mut self) {
        if let Some(task) = &self.pending {
            task.release_until_confirmed().await;
        }
        self.pending = None;
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        let Some(task) = self.pending.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                task.log
                    .debug("run dropped while holding the lock, releasing in background", &[]);
                handle.spawn(async move { task.release_until_confirmed().await });
            }
            Err(_) => {
                task.log.error(
                    "run dropped outside a tokio runtime, lock left to expire",
                    &[],
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_timeout_uses_floor() {
        let options = RunOptions::new(Duration::from_millis(20));
        assert_eq!(options.release_timeout(), Duration::from_secs(10));

        let options = RunOptions::new(Duration::from_secs(30));
        assert_eq!(options.release_timeout(), Duration::from_secs(30));

        let options =
            RunOptions::new(Duration::from_millis(20)).with_release_timeout_floor(Duration::from_millis(50));
        assert_eq!(options.release_timeout(), Duration::from_millis(50));
    }

    #[test]
    fn test_options_from_settings() {
        let settings = LockSettings {
            retry_interval_ms: 250,
            release_timeout_floor_ms: 1_000,
            max_release_attempts: Some(5),
            ..Default::default()
        };
        let options = RunOptions::from_settings(&settings);
        assert_eq!(options.retry_interval, Duration::from_millis(250));
        assert_eq!(options.release_timeout_floor, Duration::from_secs(1));
        assert_eq!(options.max_release_attempts, Some(5));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("static")), "static");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(
            panic_message(Box::new(anyhow::anyhow!("wrapped"))),
            "wrapped"
        );
        assert_eq!(panic_message(Box::new(7_u8)), "non-string panic payload");
    }

    async fn panics_in_future(_: LockContext) -> anyhow::Result<()> {
        panic!("inside future")
    }

    fn panics_before_future(_: LockContext) -> std::future::Ready<anyhow::Result<()>> {
        panic!("before the future")
    }

    #[tokio::test]
    async fn test_execute_contains_panics() {
        let ctx = LockContext::background();

        let result = execute(ctx.clone(), |_| async { Ok(()) }).await;
        assert!(result.is_ok());

        let result = execute(ctx.clone(), |_| async { Err(anyhow::anyhow!("bad input")) }).await;
        assert!(matches!(result, Err(LockError::Work(_))));

        let result = execute(ctx.clone(), panics_in_future).await;
        assert!(matches!(result, Err(LockError::Panicked(m)) if m == "inside future"));

        let result = execute(ctx, panics_before_future).await;
        assert!(matches!(result, Err(LockError::Panicked(m)) if m == "before the future"));
    }
}
