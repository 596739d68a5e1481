//! Error types for the qualification engine.
//!
//! Errors are classified by recoverability:
//! - Transient: network issues, timeouts, provider hiccups — retried with backoff
//! - Permanent: the provider confirms the action can never succeed — surfaced, never retried
//! - Validation: malformed input — rejected at the boundary, never reaches the evaluator

use thiserror::Error;

use crate::db::DbError;
use crate::types::MeetingStatus;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed rule/meeting/settings input, rejected before any state changes.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Meeting not found: {0}")]
    MeetingNotFound(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: MeetingStatus,
        to: MeetingStatus,
    },

    #[error("Meeting is {0}; only pending meetings are evaluated automatically")]
    NotPending(MeetingStatus),

    #[error("Configuration error: {0}")]
    Config(String),

    // Execution-side failures, classified for the retry loop
    #[error("Transient execution failure: {0}")]
    Transient(String),

    #[error("Permanent execution failure: {0}")]
    Permanent(String),
}

impl EngineError {
    /// Returns true if this error should be retried with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_is_retryable() {
        assert!(EngineError::Transient("smtp 451".into()).is_retryable());
    }

    #[test]
    fn test_permanent_is_not_retryable() {
        assert!(!EngineError::Permanent("mailbox invalid".into()).is_retryable());
        assert!(!EngineError::Validation("bad email".into()).is_retryable());
    }
}
