//! Error types for CoreBank operations.

use crate::{AccountId, TransactionId, TransactionStatus};
use thiserror::Error;

/// Main error type for CoreBank operations.
#[derive(Error, Debug)]
pub enum CoreBankError {
    /// Bad input shape or values. Never mutates state.
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Source account balance too low for the requested movement.
    #[error("Insufficient funds on {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        required: String,
        available: String,
    },

    /// Unknown account.
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    /// Unknown transaction.
    #[error("Transaction not found: {0}")]
    TransactionNotFound(TransactionId),

    /// Transaction was already reversed; reversal happens at most once.
    #[error("Transaction already reversed: {0}")]
    AlreadyReversed(TransactionId),

    /// Duplicate request (idempotency key already used).
    #[error("Duplicate request with idempotency key: {0}")]
    DuplicateRequest(String),

    /// Invalid state transition.
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    /// Ledger derivation could not balance. Programming-contract violation.
    #[error("Ledger contract violation: {0}")]
    LedgerContract(String),

    /// Publisher exhausted its bounded retries. The underlying transaction
    /// is already committed; this is an operational incident, not a rollback.
    #[error("Event delivery failed after {attempts} attempts: {kind} key={key}")]
    PublishRetryExhausted {
        kind: String,
        key: String,
        attempts: u32,
    },

    /// Balances mutated but the record could not be finalized consistently.
    /// Surfaced for manual reconciliation, never silently retried or rolled back.
    #[error("Fatal inconsistency on transaction {transaction_id}: {message}")]
    FatalInconsistency {
        transaction_id: TransactionId,
        message: String,
    },

    /// Operation timed out.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Store error.
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl CoreBankError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoreBankError::Timeout(_) | CoreBankError::Store(_)
        )
    }

    /// Get error code for logs and API surfaces.
    pub fn error_code(&self) -> &'static str {
        match self {
            CoreBankError::Validation { .. } => "VALIDATION_FAILED",
            CoreBankError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            CoreBankError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            CoreBankError::TransactionNotFound(_) => "TRANSACTION_NOT_FOUND",
            CoreBankError::AlreadyReversed(_) => "ALREADY_REVERSED",
            CoreBankError::DuplicateRequest(_) => "DUPLICATE_REQUEST",
            CoreBankError::InvalidTransition { .. } => "INVALID_TRANSITION",
            CoreBankError::LedgerContract(_) => "LEDGER_CONTRACT",
            CoreBankError::PublishRetryExhausted { .. } => "PUBLISH_RETRY_EXHAUSTED",
            CoreBankError::FatalInconsistency { .. } => "FATAL_INCONSISTENCY",
            CoreBankError::Timeout(_) => "TIMEOUT",
            CoreBankError::Store(_) => "STORE_ERROR",
            CoreBankError::Configuration(_) => "CONFIGURATION_ERROR",
        }
    }

    /// Convenience constructor for validation errors.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Validation error tied to a specific request field.
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }
}

impl From<crate::transaction::InvalidTransition> for CoreBankError {
    fn from(e: crate::transaction::InvalidTransition) -> Self {
        Self::InvalidTransition {
            from: e.from,
            to: e.to,
        }
    }
}

/// Result type alias for CoreBank operations.
pub type Result<T> = std::result::Result<T, CoreBankError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = CoreBankError::validation("amount must be positive");
        assert_eq!(err.error_code(), "VALIDATION_FAILED");

        let err = CoreBankError::AlreadyReversed(TransactionId::new());
        assert_eq!(err.error_code(), "ALREADY_REVERSED");
    }

    #[test]
    fn test_retryability() {
        assert!(CoreBankError::Timeout("debit".into()).is_retryable());
        assert!(!CoreBankError::validation("bad").is_retryable());
        assert!(!CoreBankError::AlreadyReversed(TransactionId::new()).is_retryable());
    }
}
