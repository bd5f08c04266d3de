//! redlease Common - Shared types, traits, and utilities
//!
//! This crate provides the foundational types used across all redlease components:
//! - Error taxonomy for lock operations
//! - Logger port with `tracing`, recording, and no-op backends
//! - Session token generation
//! - Cancellation context shared by lock calls and the runner
//! - Settings loading

pub mod context;
pub mod error;
pub mod logging;
pub mod settings;
pub mod token;

mod macros;

// Re-exports for convenience
pub use context::LockContext;
pub use error::{LockError, LockResult};
pub use logging::{Field, Level, Logger, NopLogger, RecordingLogger, TracingLogger};
pub use settings::LockSettings;
pub use token::{TokenGenerator, UuidTokenGenerator, new_token};

/// Length of a generated session token (hex-encoded UUID without dashes)
pub const TOKEN_LEN: usize = 32;

/// Floor applied to the timeout of a release attempt made after the caller's
/// context is already done
pub const DEFAULT_RELEASE_TIMEOUT_FLOOR_MS: u64 = 10_000;
