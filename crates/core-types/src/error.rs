//! Shared error type for the healing crates.

use thiserror::Error;

/// Error carried across crate boundaries.
///
/// Crate-local errors convert into this type; producers and ports return it
/// so the orchestrator can decide whether a failed call is worth retrying.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HealError {
    #[error("{message}")]
    Message { message: String },

    /// Network or parse hiccup inside a collaborator; safe to retry.
    #[error("transient failure: {0}")]
    Transient(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl HealError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::Timeout(message.into())
    }

    /// Check if the failed call may succeed when issued again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HealError::Transient(_) | HealError::Timeout(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, HealError::Cancelled)
    }
}

impl From<serde_json::Error> for HealError {
    fn from(err: serde_json::Error) -> Self {
        HealError::new(format!("invalid payload: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(HealError::transient("connection reset").is_retryable());
        assert!(HealError::timeout("poll").is_retryable());
        assert!(!HealError::new("bad locator").is_retryable());
        assert!(!HealError::Cancelled.is_retryable());
        assert!(HealError::Cancelled.is_cancelled());
    }

    #[test]
    fn display_keeps_message() {
        assert_eq!(HealError::new("boom").to_string(), "boom");
        assert_eq!(
            HealError::transient("reset").to_string(),
            "transient failure: reset"
        );
    }
}
