//! Cancellation context for lock operations
//!
//! A `LockContext` combines a cancellation signal with an optional deadline.
//! Derived contexts (`child`, `with_deadline`, `with_timeout`) are cancelled
//! when their parent is cancelled, and never outlive the parent's deadline.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::{LockError, LockResult};

#[derive(Debug, Clone)]
pub struct LockContext {
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl Default for LockContext {
    fn default() -> Self {
        Self::background()
    }
}

impl LockContext {
    /// A context that is never cancelled and has no deadline
    pub fn background() -> Self {
        Self {
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Wrap an existing cancellation token
    pub fn from_token(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            deadline: None,
        }
    }

    /// Derive a context that can be cancelled independently of this one
    pub fn child(&self) -> Self {
        Self {
            cancel: self.cancel.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a context that expires at `at`, or at this context's deadline
    /// if that comes first
    pub fn with_deadline(&self, at: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) => current.min(at),
            None => at,
        };
        Self {
            cancel: self.cancel.child_token(),
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Cancel this context and every context derived from it
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline; `None` when there is no deadline
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// Why the context is done, or `None` while it is still live
    pub fn err(&self) -> Option<LockError> {
        if self.cancel.is_cancelled() {
            return Some(LockError::Cancelled);
        }
        match self.deadline {
            Some(at) if Instant::now() >= at => Some(LockError::DeadlineExceeded),
            _ => None,
        }
    }

    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Resolve once the context is cancelled or its deadline passes
    pub async fn done(&self) -> LockError {
        let expiry = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = self.cancel.cancelled() => LockError::Cancelled,
            _ = expiry => LockError::DeadlineExceeded,
        }
    }

    /// Drive `fut` to completion unless the context finishes first
    pub async fn run<F>(&self, fut: F) -> LockResult<F::Output>
    where
        F: Future,
    {
        if let Some(err) = self.err() {
            return Err(err);
        }
        tokio::select! {
            biased;
            out = fut => Ok(out),
            err = self.done() => Err(err),
        }
    }

    /// Sleep for `duration`, waking early if the context finishes
    pub async fn sleep(&self, duration: Duration) -> LockResult<()> {
        self.run(tokio::time::sleep(duration)).await
    }
}
