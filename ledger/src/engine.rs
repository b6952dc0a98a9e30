//! Core ledger engine implementation.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{error, info, instrument};

use corebank_common::{
    AccountId, CoreBankError, Result, Transaction, TransactionId, TransactionKind,
    TransactionStatus,
};

use crate::entry::{EntrySet, LedgerEntry};

/// The ledger engine derives and stores balanced debit/credit rows for
/// completed transactions. The store is append-only: no update or delete
/// operation exists on this surface.
///
/// Transfers and reversals produce a debit row and a credit row that must
/// balance. Deposits and withdrawals record the customer-side row only;
/// the bank's cash counterpart lives outside this ledger.
pub struct LedgerEngine {
    /// Append-only entry log, in creation order.
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
    /// Log positions by account.
    by_account: Arc<DashMap<AccountId, Vec<usize>>>,
    /// Log positions by transaction.
    by_transaction: Arc<DashMap<TransactionId, Vec<usize>>>,
}

impl LedgerEngine {
    /// Create a new ledger engine.
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            by_account: Arc::new(DashMap::new()),
            by_transaction: Arc::new(DashMap::new()),
        }
    }

    /// Derive and append the entries for a completed transaction.
    ///
    /// A derivation that cannot balance (missing account on one side of a
    /// transfer) is a contract violation by the caller, not a user error:
    /// it fails loudly and appends nothing.
    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.id))]
    pub fn record_entries(&self, transaction: &Transaction) -> Result<Vec<LedgerEntry>> {
        if transaction.status != TransactionStatus::Completed {
            return Err(CoreBankError::LedgerContract(format!(
                "entries derive only from COMPLETED transactions, got {:?}",
                transaction.status
            )));
        }

        let set = self.derive(transaction)?;

        self.append(set.entries.clone());

        info!(
            transaction_id = %transaction.id,
            entries = set.entries.len(),
            "Ledger entries recorded"
        );

        Ok(set.entries)
    }

    /// Read all entries touching an account, timestamp ascending.
    pub fn entries_for_account(&self, account_id: &AccountId) -> Vec<LedgerEntry> {
        self.read_positions(self.by_account.get(account_id).map(|p| p.clone()))
    }

    /// Read all entries owned by a transaction, timestamp ascending.
    pub fn entries_for_transaction(&self, transaction_id: &TransactionId) -> Vec<LedgerEntry> {
        self.read_positions(self.by_transaction.get(transaction_id).map(|p| p.clone()))
    }

    /// Verify global ledger integrity: two-sided transactions balance.
    pub fn verify_integrity(&self) -> bool {
        let entries = self.entries.read();
        let mut per_tx: std::collections::HashMap<TransactionId, rust_decimal::Decimal> =
            std::collections::HashMap::new();
        let mut sides: std::collections::HashMap<TransactionId, usize> =
            std::collections::HashMap::new();

        for entry in entries.iter() {
            *per_tx
                .entry(entry.transaction_id)
                .or_insert(rust_decimal::Decimal::ZERO) += entry.signed_amount();
            *sides.entry(entry.transaction_id).or_insert(0) += 1;
        }

        per_tx
            .iter()
            .all(|(tx, net)| sides[tx] < 2 || net.is_zero())
    }

    // --- Private methods ---

    fn derive(&self, transaction: &Transaction) -> Result<EntrySet> {
        let amount = transaction.amount.value;
        let currency = transaction.amount.currency.clone();
        let mut set = EntrySet::new(transaction.id);

        match transaction.kind {
            TransactionKind::Transfer => {
                let source = transaction.source_account.clone().ok_or_else(|| {
                    CoreBankError::LedgerContract("transfer without source account".to_string())
                })?;
                let destination = transaction.destination_account.clone().ok_or_else(|| {
                    CoreBankError::LedgerContract(
                        "transfer without destination account".to_string(),
                    )
                })?;

                set.push(LedgerEntry::debit(
                    transaction.id,
                    source,
                    amount,
                    currency.clone(),
                ));
                set.push(LedgerEntry::credit(
                    transaction.id,
                    destination,
                    amount,
                    currency,
                ));

                if !set.is_balanced() {
                    error!(
                        transaction_id = %transaction.id,
                        "Derived entry set does not balance"
                    );
                    return Err(CoreBankError::LedgerContract(
                        "derived entries do not balance".to_string(),
                    ));
                }
            }
            TransactionKind::Reversal => {
                // A reversal mirrors the account structure of its original:
                // two rows when both sides exist, one otherwise.
                match (
                    transaction.source_account.clone(),
                    transaction.destination_account.clone(),
                ) {
                    (Some(source), Some(destination)) => {
                        set.push(LedgerEntry::debit(
                            transaction.id,
                            source,
                            amount,
                            currency.clone(),
                        ));
                        set.push(LedgerEntry::credit(
                            transaction.id,
                            destination,
                            amount,
                            currency,
                        ));

                        if !set.is_balanced() {
                            error!(
                                transaction_id = %transaction.id,
                                "Derived entry set does not balance"
                            );
                            return Err(CoreBankError::LedgerContract(
                                "derived entries do not balance".to_string(),
                            ));
                        }
                    }
                    (Some(source), None) => {
                        set.push(LedgerEntry::debit(transaction.id, source, amount, currency));
                    }
                    (None, Some(destination)) => {
                        set.push(LedgerEntry::credit(
                            transaction.id,
                            destination,
                            amount,
                            currency,
                        ));
                    }
                    (None, None) => {
                        return Err(CoreBankError::LedgerContract(
                            "reversal without any account".to_string(),
                        ));
                    }
                }
            }
            TransactionKind::Deposit => {
                let destination = transaction.destination_account.clone().ok_or_else(|| {
                    CoreBankError::LedgerContract(
                        "deposit without destination account".to_string(),
                    )
                })?;
                set.push(LedgerEntry::credit(
                    transaction.id,
                    destination,
                    amount,
                    currency,
                ));
            }
            TransactionKind::Withdrawal => {
                let source = transaction.source_account.clone().ok_or_else(|| {
                    CoreBankError::LedgerContract("withdrawal without source account".to_string())
                })?;
                set.push(LedgerEntry::debit(transaction.id, source, amount, currency));
            }
        }

        Ok(set)
    }

    fn append(&self, new_entries: Vec<LedgerEntry>) {
        let mut log = self.entries.write();
        for entry in new_entries {
            let position = log.len();
            self.by_account
                .entry(entry.account_id.clone())
                .or_default()
                .push(position);
            self.by_transaction
                .entry(entry.transaction_id)
                .or_default()
                .push(position);
            log.push(entry);
        }
    }

    fn read_positions(&self, positions: Option<Vec<usize>>) -> Vec<LedgerEntry> {
        let Some(positions) = positions else {
            return Vec::new();
        };
        let log = self.entries.read();
        // Positions are appended in log order, which is creation order.
        positions.iter().map(|&p| log[p].clone()).collect()
    }
}

impl Default for LedgerEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corebank_common::{Currency, Money};
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    fn completed_transfer(amount: i64) -> Transaction {
        let mut tx = Transaction::new(
            TransactionKind::Transfer,
            Some(AccountId::new("ACC-A")),
            Some(AccountId::new("ACC-B")),
            Money::new(Decimal::from(amount), Currency::usd()),
            "Test transfer",
        );
        tx.complete(None, None).unwrap();
        tx
    }

    #[test]
    fn test_transfer_produces_balanced_pair() {
        let engine = LedgerEngine::new();
        let tx = completed_transfer(50);

        let entries = engine.record_entries(&tx).unwrap();

        assert_eq!(entries.len(), 2);
        let debit = entries.iter().find(|e| e.is_debit()).unwrap();
        let credit = entries.iter().find(|e| !e.is_debit()).unwrap();
        assert_eq!(debit.account_id, AccountId::new("ACC-A"));
        assert_eq!(credit.account_id, AccountId::new("ACC-B"));
        assert_eq!(debit.amount(), tx.amount.value);
        assert_eq!(credit.amount(), tx.amount.value);
    }

    #[test]
    fn test_deposit_produces_single_credit() {
        let engine = LedgerEngine::new();
        let mut tx = Transaction::new(
            TransactionKind::Deposit,
            None,
            Some(AccountId::new("ACC-B")),
            Money::new(Decimal::from(25), Currency::usd()),
            "Cash deposit",
        );
        tx.complete(None, Some(Decimal::from(25))).unwrap();

        let entries = engine.record_entries(&tx).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_debit());
    }

    #[test]
    fn test_withdrawal_produces_single_debit() {
        let engine = LedgerEngine::new();
        let mut tx = Transaction::new(
            TransactionKind::Withdrawal,
            Some(AccountId::new("ACC-A")),
            None,
            Money::new(Decimal::from(25), Currency::usd()),
            "ATM withdrawal",
        );
        tx.complete(Some(Decimal::from(75)), None).unwrap();

        let entries = engine.record_entries(&tx).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_debit());
    }

    #[test]
    fn test_reversal_of_withdrawal_mirrors_single_row() {
        let engine = LedgerEngine::new();
        let mut tx = Transaction::new(
            TransactionKind::Reversal,
            None,
            Some(AccountId::new("ACC-A")),
            Money::new(Decimal::from(25), Currency::usd()),
            "Reversal: ATM withdrawal",
        );
        tx.complete(None, Some(Decimal::from(100))).unwrap();

        let entries = engine.record_entries(&tx).unwrap();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_debit());
        assert_eq!(entries[0].account_id, AccountId::new("ACC-A"));
    }

    #[test]
    fn test_pending_transaction_is_rejected() {
        let engine = LedgerEngine::new();
        let tx = Transaction::new(
            TransactionKind::Transfer,
            Some(AccountId::new("ACC-A")),
            Some(AccountId::new("ACC-B")),
            Money::new(Decimal::from(50), Currency::usd()),
            "Still pending",
        );

        let err = engine.record_entries(&tx).unwrap_err();
        assert_eq!(err.error_code(), "LEDGER_CONTRACT");
    }

    #[test]
    fn test_transfer_missing_side_fails_loudly() {
        let engine = LedgerEngine::new();
        let mut tx = Transaction::new(
            TransactionKind::Transfer,
            Some(AccountId::new("ACC-A")),
            None,
            Money::new(Decimal::from(50), Currency::usd()),
            "Broken transfer",
        );
        tx.complete(None, None).unwrap();

        let err = engine.record_entries(&tx).unwrap_err();
        assert_eq!(err.error_code(), "LEDGER_CONTRACT");
        assert!(engine.entries_for_transaction(&tx.id).is_empty());
    }

    #[test]
    fn test_reads_are_ordered_and_scoped() {
        let engine = LedgerEngine::new();
        let tx1 = completed_transfer(10);
        let tx2 = completed_transfer(20);

        engine.record_entries(&tx1).unwrap();
        engine.record_entries(&tx2).unwrap();

        let account_a = engine.entries_for_account(&AccountId::new("ACC-A"));
        assert_eq!(account_a.len(), 2);
        assert!(account_a[0].created_at <= account_a[1].created_at);
        assert_eq!(account_a[0].transaction_id, tx1.id);

        let for_tx2 = engine.entries_for_transaction(&tx2.id);
        assert_eq!(for_tx2.len(), 2);
        assert!(for_tx2.iter().all(|e| e.transaction_id == tx2.id));
    }

    proptest! {
        /// Property: any sequence of completed transfers leaves the ledger
        /// balanced, with debits == credits == transferred total.
        #[test]
        fn ledger_stays_balanced(amounts in prop::collection::vec(1i64..1_000_000i64, 1..20)) {
            let engine = LedgerEngine::new();
            let mut total = Decimal::ZERO;

            for amount in &amounts {
                let tx = completed_transfer(*amount);
                let entries = engine.record_entries(&tx).unwrap();
                let set = EntrySet { entries, transaction_id: tx.id };
                prop_assert!(set.is_balanced());
                total += Decimal::from(*amount);
            }

            prop_assert!(engine.verify_integrity());

            let debits: Decimal = engine
                .entries_for_account(&AccountId::new("ACC-A"))
                .iter()
                .filter_map(|e| e.debit)
                .sum();
            prop_assert_eq!(debits, total);
        }
    }
}
