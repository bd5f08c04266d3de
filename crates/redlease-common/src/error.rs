//! Error types for redlease
//!
//! Contention ("held by someone else") and ownership mismatch on release are
//! not errors: they are reported as `Ok(None)` and `Ok(false)` by the lock
//! primitive. Everything here means the outcome is unknown, the caller gave
//! up, the protected work failed, or the API was misused.

/// Result type for lock operations
pub type LockResult<T> = Result<T, LockError>;

/// Errors that can occur during lock operations
#[derive(thiserror::Error, Debug)]
pub enum LockError {
    /// Transport or scripting failure reported by the backing store
    #[error("store error: {0}")]
    Store(String),

    /// The caller's context was cancelled
    #[error("context cancelled")]
    Cancelled,

    /// The caller's context deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The protected work panicked; the panic was contained
    #[error("work panicked (recovered): {0}")]
    Panicked(String),

    /// The protected work returned an error
    #[error("work failed: {0}")]
    Work(#[source] anyhow::Error),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A session was handed to a lock with a different name
    #[error("lock name mismatch: lock is '{lock}', session belongs to '{session}'")]
    NameMismatch { lock: String, session: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl LockError {
    /// True for `Cancelled` and `DeadlineExceeded`
    pub fn is_context(&self) -> bool {
        matches!(self, LockError::Cancelled | LockError::DeadlineExceeded)
    }

    pub fn is_store(&self) -> bool {
        matches!(self, LockError::Store(_))
    }
}

impl From<config::ConfigError> for LockError {
    fn from(err: config::ConfigError) -> Self {
        LockError::Config(err.to_string())
    }
}
