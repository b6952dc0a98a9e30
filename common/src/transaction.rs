//! Transaction types and state machine for CoreBank money movements.

use crate::{AccountId, Money, TransactionId, TransactionNumber};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Kind of money movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    /// Credit to a destination account, no source.
    Deposit,
    /// Debit from a source account, no destination.
    Withdrawal,
    /// Debit source, credit destination.
    Transfer,
    /// Compensating movement spawned by reversing a completed transaction.
    Reversal,
}

impl TransactionKind {
    /// Check whether this kind debits a source account.
    pub fn debits_source(&self) -> bool {
        !matches!(self, TransactionKind::Deposit)
    }

    /// Check whether this kind credits a destination account.
    pub fn credits_destination(&self) -> bool {
        !matches!(self, TransactionKind::Withdrawal)
    }
}

/// Transaction status representing the lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    /// Record created, balances not yet touched.
    Pending,
    /// Balances updated and ledger entries appended.
    Completed,
    /// Rejected before any balance mutation.
    Failed,
}

impl TransactionStatus {
    /// Check if this is a terminal state.
    pub fn is_final(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
    }

    /// Get valid next states from current state.
    pub fn valid_transitions(&self) -> &[TransactionStatus] {
        match self {
            TransactionStatus::Pending => {
                &[TransactionStatus::Completed, TransactionStatus::Failed]
            }
            TransactionStatus::Completed => &[],
            TransactionStatus::Failed => &[],
        }
    }

    /// Check if transition to given state is valid.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Failure codes for transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// Source account balance too low.
    InsufficientFunds,
    /// Business validation rejected the request.
    ValidationFailed,
    /// Account store unreachable or timed out.
    AccountUnavailable,
    /// Coordinator internal error.
    CoordinatorError,
}

/// Transaction failure information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionFailure {
    /// Failure code.
    pub code: FailureCode,
    /// Human-readable message.
    pub message: String,
    /// When the failure occurred.
    pub failed_at: DateTime<Utc>,
}

impl TransactionFailure {
    /// Create a new failure record.
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            failed_at: Utc::now(),
        }
    }
}

/// Timing for a transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionTiming {
    /// When the transaction was initiated.
    pub initiated_at: DateTime<Utc>,
    /// When the transaction completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// When the transaction failed (if applicable).
    pub failed_at: Option<DateTime<Utc>>,
}

impl TransactionTiming {
    /// Create new timing with current timestamp as initiation time.
    pub fn new() -> Self {
        Self {
            initiated_at: Utc::now(),
            completed_at: None,
            failed_at: None,
        }
    }

    /// Get total duration in milliseconds (if completed).
    pub fn total_duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|completed| (completed - self.initiated_at).num_milliseconds())
    }
}

impl Default for TransactionTiming {
    fn default() -> Self {
        Self::new()
    }
}

/// Reversal linkage between an original transaction and its compensating one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReversalLink {
    /// Whether this transaction has been reversed.
    pub is_reversed: bool,
    /// The reversal transaction that compensates this one.
    pub reversed_by: Option<TransactionId>,
    /// The original transaction this one compensates (set on REVERSAL records).
    pub reversal_of: Option<TransactionId>,
    /// Operator-supplied reason for the reversal.
    pub reversal_reason: Option<String>,
    /// When the reversal was recorded.
    pub reversed_at: Option<DateTime<Utc>>,
}

/// Post-operation balance snapshots kept for audit.
/// Immutable once the transaction reaches COMPLETED.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BalanceSnapshot {
    /// Source account balance after the debit.
    pub source_balance_after: Option<Decimal>,
    /// Destination account balance after the credit.
    pub destination_balance_after: Option<Decimal>,
}

/// A money movement record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction identifier.
    pub id: TransactionId,
    /// Business-facing reference.
    pub number: TransactionNumber,
    /// Kind of movement.
    pub kind: TransactionKind,
    /// Current status.
    pub status: TransactionStatus,
    /// Amount and currency.
    pub amount: Money,
    /// Source account (None for deposits).
    pub source_account: Option<AccountId>,
    /// Destination account (None for withdrawals).
    pub destination_account: Option<AccountId>,
    /// Free-form description.
    pub description: String,
    /// Lifecycle timestamps.
    pub timing: TransactionTiming,
    /// Balance snapshots stamped at completion.
    pub balances: BalanceSnapshot,
    /// Reversal linkage.
    pub reversal: ReversalLink,
    /// Set when balances moved but the record could not be fully finalized;
    /// requires manual reconciliation, never auto-repaired.
    pub needs_reconciliation: bool,
    /// Failure information (if failed).
    pub failure: Option<TransactionFailure>,
}

impl Transaction {
    /// Create a new pending transaction.
    pub fn new(
        kind: TransactionKind,
        source_account: Option<AccountId>,
        destination_account: Option<AccountId>,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        let id = TransactionId::new();
        Self {
            id,
            number: TransactionNumber::derive(&id),
            kind,
            status: TransactionStatus::Pending,
            amount,
            source_account,
            destination_account,
            description: description.into(),
            timing: TransactionTiming::new(),
            balances: BalanceSnapshot::default(),
            reversal: ReversalLink::default(),
            needs_reconciliation: false,
            failure: None,
        }
    }

    /// Create the compensating transaction for a completed original:
    /// accounts swapped, same amount, REVERSAL kind.
    pub fn reversal_of(original: &Transaction, reason: &str) -> Self {
        let mut tx = Self::new(
            TransactionKind::Reversal,
            original.destination_account.clone(),
            original.source_account.clone(),
            original.amount.clone(),
            format!("Reversal: {}", original.description),
        );
        tx.reversal.reversal_of = Some(original.id);
        tx.reversal.reversal_reason = Some(reason.to_string());
        tx
    }

    /// Transition to a new status.
    pub fn transition_to(&mut self, new_status: TransactionStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(new_status) {
            return Err(InvalidTransition {
                from: self.status,
                to: new_status,
            });
        }
        self.status = new_status;
        Ok(())
    }

    /// Mark the transaction completed and stamp the balance snapshots.
    pub fn complete(
        &mut self,
        source_balance_after: Option<Decimal>,
        destination_balance_after: Option<Decimal>,
    ) -> Result<(), InvalidTransition> {
        self.transition_to(TransactionStatus::Completed)?;
        self.balances = BalanceSnapshot {
            source_balance_after,
            destination_balance_after,
        };
        self.timing.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Mark the transaction failed.
    pub fn fail(&mut self, failure: TransactionFailure) -> Result<(), InvalidTransition> {
        self.transition_to(TransactionStatus::Failed)?;
        self.timing.failed_at = Some(failure.failed_at);
        self.failure = Some(failure);
        Ok(())
    }

    /// Flag the record for manual reconciliation.
    pub fn flag_reconciliation(&mut self) {
        self.needs_reconciliation = true;
    }

    /// Check if this transaction can still be reversed.
    pub fn is_reversible(&self) -> bool {
        self.status == TransactionStatus::Completed
            && self.kind != TransactionKind::Reversal
            && !self.reversal.is_reversed
    }
}

/// Error when attempting invalid state transition.
#[derive(Debug, Clone)]
pub struct InvalidTransition {
    pub from: TransactionStatus,
    pub to: TransactionStatus,
}

impl std::fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Invalid state transition from {:?} to {:?}",
            self.from, self.to
        )
    }
}

impl std::error::Error for InvalidTransition {}
