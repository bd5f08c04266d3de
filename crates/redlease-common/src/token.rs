//! Session token generation
//!
//! A token is the value written to the lock key; whoever's token is stored
//! owns the lock.

/// Source of unique session tokens
pub trait TokenGenerator: Send + Sync {
    /// Produce a fresh token. Collisions must be practically impossible.
    fn new_token(&self) -> String;
}

/// Generates random v4 UUIDs rendered as 32 lowercase hex characters
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTokenGenerator;

impl TokenGenerator for UuidTokenGenerator {
    fn new_token(&self) -> String {
        new_token()
    }
}

/// Generate a session token
///
/// # Examples
///
/// ```
/// use redlease_common::new_token;
///
/// let token = new_token();
/// assert_eq!(token.len(), 32);
/// assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
/// ```
pub fn new_token() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
