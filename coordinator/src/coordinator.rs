//! Core transaction coordinator implementation.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use corebank_common::{
    AccountId, CoreBankError, EventPayload, FailureCode, Money, Result, Transaction,
    TransactionFailure, TransactionId, TransactionKind, TransactionSnapshot, TransactionStatus,
};
use corebank_ledger::LedgerEngine;

use crate::accounts::AccountLedgerStore;
use crate::config::CoordinatorConfig;
use crate::metrics::{Metrics, SharedMetrics};
use crate::outbox::Outbox;
use crate::store::TransactionStore;

/// A money movement request received from the (out-of-scope) edge layer.
/// Requests arrive shape-checked and authenticated; business rules are
/// re-validated here regardless.
#[derive(Debug, Clone)]
pub struct TransactionRequest {
    /// Kind of movement.
    pub kind: TransactionKind,
    /// Source account (required for withdrawals and transfers).
    pub source_account: Option<AccountId>,
    /// Destination account (required for deposits and transfers).
    pub destination_account: Option<AccountId>,
    /// Amount and currency.
    pub amount: Money,
    /// Free-form description.
    pub description: String,
    /// Caller-supplied key collapsing retried requests into one effect.
    pub idempotency_key: Option<String>,
}

impl TransactionRequest {
    /// Build a transfer request.
    pub fn transfer(
        source: AccountId,
        destination: AccountId,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: TransactionKind::Transfer,
            source_account: Some(source),
            destination_account: Some(destination),
            amount,
            description: description.into(),
            idempotency_key: None,
        }
    }

    /// Build a deposit request.
    pub fn deposit(
        destination: AccountId,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: TransactionKind::Deposit,
            source_account: None,
            destination_account: Some(destination),
            amount,
            description: description.into(),
            idempotency_key: None,
        }
    }

    /// Build a withdrawal request.
    pub fn withdrawal(
        source: AccountId,
        amount: Money,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: TransactionKind::Withdrawal,
            source_account: Some(source),
            destination_account: None,
            amount,
            description: description.into(),
            idempotency_key: None,
        }
    }

    /// Attach an idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// The coordinator orchestrates the account balance collaborator and the
/// ledger engine, records the transaction lifecycle, and hands committed
/// outcomes to the outbox.
///
/// Error discipline: anything that goes wrong before the first durable
/// mutation is returned as a typed error; anything after is recorded on the
/// transaction itself, so the caller always receives a record reflecting
/// true state.
pub struct TransactionCoordinator {
    /// Configuration.
    config: CoordinatorConfig,
    /// Account balance collaborator.
    accounts: Arc<dyn AccountLedgerStore>,
    /// Ledger engine.
    ledger: Arc<LedgerEngine>,
    /// Transaction record store.
    store: Arc<TransactionStore>,
    /// Outbox for committed-state announcements.
    outbox: Arc<Outbox>,
    /// Metrics.
    metrics: SharedMetrics,
}

impl TransactionCoordinator {
    /// Create a new coordinator.
    pub fn new(
        config: CoordinatorConfig,
        accounts: Arc<dyn AccountLedgerStore>,
        outbox: Arc<Outbox>,
    ) -> Self {
        Self {
            config,
            accounts,
            ledger: Arc::new(LedgerEngine::new()),
            store: Arc::new(TransactionStore::new()),
            outbox,
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// The ledger engine, for statement and reconciliation queries.
    pub fn ledger(&self) -> &LedgerEngine {
        &self.ledger
    }

    /// Shared metrics handle.
    pub fn metrics(&self) -> SharedMetrics {
        self.metrics.clone()
    }

    /// Get a transaction by ID.
    pub fn transaction(&self, id: &TransactionId) -> Result<Transaction> {
        self.store
            .get(id)
            .ok_or(CoreBankError::TransactionNotFound(*id))
    }

    /// Get a transaction by business reference.
    pub fn transaction_by_number(&self, number: &str) -> Option<Transaction> {
        self.store.by_number(number)
    }

    /// Process a money movement to a terminal state.
    ///
    /// Returns a COMPLETED or FAILED record, or a typed error when the
    /// request was rejected before any durable mutation.
    #[instrument(skip(self, request), fields(kind = ?request.kind))]
    pub async fn process_transaction(&self, request: TransactionRequest) -> Result<Transaction> {
        self.validate_request(&request)?;

        if let Some(key) = &request.idempotency_key {
            if let Some(id) = self.store.lookup_idempotency(key) {
                debug!(idempotency_key = %key, transaction_id = %id, "Resend collapsed");
                return self.transaction(&id);
            }
        }

        self.resolve_accounts(&request).await?;

        let tx = Transaction::new(
            request.kind,
            request.source_account.clone(),
            request.destination_account.clone(),
            request.amount.clone(),
            request.description.clone(),
        );

        self.store.insert(tx.clone());

        if let Some(key) = &request.idempotency_key {
            if let Err(winner) = self.store.register_idempotency(key, tx.id) {
                // Lost a concurrent race on the same key; discard our record.
                self.store.remove(&tx.id);
                debug!(idempotency_key = %key, transaction_id = %winner, "Concurrent resend collapsed");
                return self.transaction(&winner);
            }
        }

        self.metrics.transaction_initiated();
        self.enqueue_event(
            &tx,
            EventPayload::TransactionInitiated {
                snapshot: TransactionSnapshot::capture(&tx),
            },
        );

        let tx = self.execute(tx).await?;

        if tx.status == TransactionStatus::Completed {
            self.enqueue_event(
                &tx,
                EventPayload::TransactionCompleted {
                    snapshot: TransactionSnapshot::capture(&tx),
                },
            );
            info!(transaction_id = %tx.id, number = %tx.number, "Transaction completed");
        }

        Ok(tx)
    }

    /// Reverse a completed transaction.
    ///
    /// Creates a fresh REVERSAL transaction with source and destination
    /// swapped, runs it through the same balance/ledger path, and links both
    /// records. Concurrent attempts race on a compare-and-set claim: exactly
    /// one wins, the loser observes `AlreadyReversed`.
    #[instrument(skip(self, reason), fields(transaction_id = %transaction_id))]
    pub async fn reverse_transaction(
        &self,
        transaction_id: TransactionId,
        reason: &str,
    ) -> Result<Transaction> {
        let original = self.transaction(&transaction_id)?;

        let reversal = Transaction::reversal_of(&original, reason);

        // The claim verifies is_reversed == false and stamps the linkage in
        // one exclusive write.
        self.store
            .claim_reversal(&transaction_id, reversal.id, reason)?;

        self.store.insert(reversal.clone());
        self.metrics.transaction_initiated();
        self.enqueue_event(
            &reversal,
            EventPayload::TransactionInitiated {
                snapshot: TransactionSnapshot::capture(&reversal),
            },
        );

        let reversal = self.execute(reversal).await?;

        match reversal.status {
            TransactionStatus::Completed => {
                self.metrics.transaction_reversed();
                self.enqueue_event(
                    &reversal,
                    EventPayload::TransactionReversed {
                        original_id: transaction_id,
                        reversal: TransactionSnapshot::capture(&reversal),
                        reason: reason.to_string(),
                    },
                );
                info!(
                    transaction_id = %transaction_id,
                    reversal_id = %reversal.id,
                    "Transaction reversed"
                );
                Ok(reversal)
            }
            _ => {
                // The reversal never moved money: reopen the claim so a
                // later attempt can succeed. A half-applied reversal keeps
                // the claim and waits for manual reconciliation.
                if !reversal.needs_reconciliation {
                    self.store
                        .release_reversal_claim(&transaction_id, &reversal.id);
                }
                warn!(
                    transaction_id = %transaction_id,
                    reversal_id = %reversal.id,
                    "Reversal did not complete"
                );
                Ok(reversal)
            }
        }
    }

    // --- Private methods ---

    /// Drive a pending transaction to a terminal state. From the debit
    /// onwards there is no abort path: the record always ends COMPLETED or
    /// FAILED (possibly flagged for reconciliation).
    async fn execute(&self, mut tx: Transaction) -> Result<Transaction> {
        // Advisory pre-check. Balances can change between here and the
        // debit; the atomic debit below is the authority.
        if let Some(source) = tx.source_account.clone() {
            match self
                .account_call(
                    self.accounts.has_sufficient_balance(&source, &tx.amount),
                    "balance pre-check",
                )
                .await
            {
                Ok(true) => {}
                Ok(false) => {
                    return Ok(self.fail_and_record(
                        tx,
                        FailureCode::InsufficientFunds,
                        "insufficient balance",
                    ));
                }
                Err(e) => {
                    return Ok(self.fail_and_record(
                        tx,
                        FailureCode::AccountUnavailable,
                        e.to_string(),
                    ));
                }
            }
        }

        let mut source_balance_after = None;
        if let Some(source) = tx.source_account.clone() {
            match self
                .account_call(self.accounts.debit(&source, &tx.amount), "debit")
                .await
            {
                Ok(balance) => source_balance_after = Some(balance),
                Err(CoreBankError::InsufficientFunds { .. }) => {
                    return Ok(self.fail_and_record(
                        tx,
                        FailureCode::InsufficientFunds,
                        "insufficient balance at debit",
                    ));
                }
                Err(CoreBankError::Timeout(op)) => {
                    // Unknown whether the debit applied.
                    error!(
                        transaction_id = %tx.id,
                        "Debit timed out; state unknown, manual reconciliation required"
                    );
                    tx.flag_reconciliation();
                    self.metrics.reconciliation_flagged();
                    return Ok(self.fail_and_record(
                        tx,
                        FailureCode::AccountUnavailable,
                        format!("debit timed out: {op}"),
                    ));
                }
                Err(e) => {
                    return Ok(self.fail_and_record(
                        tx,
                        FailureCode::AccountUnavailable,
                        e.to_string(),
                    ));
                }
            }
        }

        let mut destination_balance_after = None;
        if let Some(destination) = tx.destination_account.clone() {
            match self
                .account_call(self.accounts.credit(&destination, &tx.amount), "credit")
                .await
            {
                Ok(balance) => destination_balance_after = Some(balance),
                Err(e) => {
                    if source_balance_after.is_some() {
                        // The debit already applied; never roll it back
                        // silently.
                        error!(
                            transaction_id = %tx.id,
                            error = %e,
                            "Credit failed after debit; manual reconciliation required"
                        );
                        tx.flag_reconciliation();
                        self.metrics.reconciliation_flagged();
                    }
                    return Ok(self.fail_and_record(
                        tx,
                        FailureCode::AccountUnavailable,
                        e.to_string(),
                    ));
                }
            }
        }

        tx.complete(source_balance_after, destination_balance_after)?;
        self.store.update(tx.clone());
        self.metrics.transaction_completed();

        if let Err(e) = self.ledger.record_entries(&tx) {
            // Balances moved but the ledger write failed. The one case with
            // no automatic recovery: stays COMPLETED, flagged, alerted.
            error!(
                transaction_id = %tx.id,
                error = %e,
                "FATAL: ledger write failed after balance mutation; manual reconciliation required"
            );
            tx.flag_reconciliation();
            self.metrics.reconciliation_flagged();
            self.store.update(tx.clone());
        }

        Ok(tx)
    }

    fn validate_request(&self, request: &TransactionRequest) -> Result<()> {
        if request.kind == TransactionKind::Reversal {
            return Err(CoreBankError::validation(
                "reversals are created through reverse_transaction",
            ));
        }

        if !request.amount.is_positive() {
            return Err(CoreBankError::validation_field(
                "amount must be positive",
                "amount",
            ));
        }

        if request.kind.debits_source() && request.source_account.is_none() {
            return Err(CoreBankError::validation_field(
                "source account required",
                "source_account",
            ));
        }

        if request.kind.credits_destination() && request.destination_account.is_none() {
            return Err(CoreBankError::validation_field(
                "destination account required",
                "destination_account",
            ));
        }

        if let (Some(source), Some(destination)) =
            (&request.source_account, &request.destination_account)
        {
            if source == destination {
                return Err(CoreBankError::validation_field(
                    "cannot transfer to the same account",
                    "destination_account",
                ));
            }
        }

        for account in [&request.source_account, &request.destination_account]
            .into_iter()
            .flatten()
        {
            if !account.is_valid() {
                return Err(CoreBankError::validation_field(
                    format!("malformed account number: {account}"),
                    "account",
                ));
            }
        }

        Ok(())
    }

    /// Verify every referenced account resolves before creating a record.
    async fn resolve_accounts(&self, request: &TransactionRequest) -> Result<()> {
        for account in [&request.source_account, &request.destination_account]
            .into_iter()
            .flatten()
        {
            self.account_call(self.accounts.balance(account), "account lookup")
                .await?;
        }
        Ok(())
    }

    fn fail_and_record(
        &self,
        mut tx: Transaction,
        code: FailureCode,
        message: impl Into<String>,
    ) -> Transaction {
        let failure = TransactionFailure::new(code, message);
        if let Err(e) = tx.fail(failure) {
            error!(transaction_id = %tx.id, error = %e, "Could not mark transaction failed");
        }
        self.store.update(tx.clone());
        self.metrics.transaction_failed();

        let reason = tx
            .failure
            .as_ref()
            .map(|f| f.message.clone())
            .unwrap_or_default();
        self.enqueue_event(
            &tx,
            EventPayload::TransactionFailed {
                snapshot: TransactionSnapshot::capture(&tx),
                reason,
            },
        );

        tx
    }

    fn enqueue_event(&self, tx: &Transaction, payload: EventPayload) {
        self.outbox
            .enqueue(corebank_common::DomainEvent::for_transaction(tx, payload));
        self.metrics.event_enqueued();
    }

    async fn account_call<T>(
        &self,
        fut: impl Future<Output = Result<T>>,
        operation: &str,
    ) -> Result<T> {
        tokio::time::timeout(self.config.account_call_timeout, fut)
            .await
            .map_err(|_| CoreBankError::Timeout(operation.to_string()))?
    }
}
