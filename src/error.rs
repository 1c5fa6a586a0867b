//! Error types for planning and execution.

use crate::models::{AccountId, TransferResult};
use thiserror::Error;

/// Fatal planning errors. No partial plan is ever returned with these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("Expected exactly one target account, found {found}")]
    Configuration { found: usize },
}

/// Authentication failure reported by the session transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Login rejected: {0}")]
    Rejected(String),

    #[error("Gateway unreachable: {0}")]
    Unreachable(String),

    #[error("Login timed out after {0}s")]
    Timeout(u64),
}

/// Could not obtain a session for an account. Callers may retry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Failed to acquire session for {account}: {source}")]
pub struct AcquireError {
    pub account: AccountId,
    #[source]
    pub source: AuthError,
}

/// Failure of a single send call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Transfer rejected: {0}")]
    Rejected(String),

    #[error("Session expired: {0}")]
    SessionExpired(String),

    #[error("Gateway unreachable: {0}")]
    Unreachable(String),
}

impl TransferError {
    /// Whether the session that produced this error can no longer be used.
    pub fn invalidates_session(&self) -> bool {
        matches!(self, TransferError::SessionExpired(_))
    }
}

/// Errors raised by the session manager before or during a send.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SendError {
    #[error("Session for {account} is bound to {bound}, cannot send to {requested}")]
    RecipientMismatch {
        account: AccountId,
        bound: AccountId,
        requested: AccountId,
    },

    #[error("Session for {0} is no longer valid")]
    SessionInvalid(AccountId),

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

/// Execution stopped before the whole plan was processed.
#[derive(Error, Debug, Clone)]
pub enum ExecuteError {
    #[error("Execution cancelled after {} recorded results", .completed.len())]
    Cancelled { completed: Vec<TransferResult> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_expired_sessions_invalidate() {
        assert!(TransferError::SessionExpired("401".into()).invalidates_session());
        assert!(!TransferError::Rejected("escrow".into()).invalidates_session());
        assert!(!TransferError::Unreachable("dns".into()).invalidates_session());
    }

    #[test]
    fn test_acquire_error_message_names_account() {
        let err = AcquireError {
            account: AccountId::from("farm07"),
            source: AuthError::Rejected("bad guard code".into()),
        };
        let message = err.to_string();
        assert!(message.contains("farm07"));
        assert!(message.contains("bad guard code"));
    }

    #[test]
    fn test_configuration_error_message() {
        let err = PlanError::Configuration { found: 2 };
        assert_eq!(err.to_string(), "Expected exactly one target account, found 2");
    }
}
