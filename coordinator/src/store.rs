//! In-memory transaction store with idempotency and reversal-claim support.

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, info};

use corebank_common::{CoreBankError, Result, Transaction, TransactionId};

/// Transaction record store. Writes are single-record commits: readers see
/// the pre- or post-commit version of a record, never a partial one.
pub struct TransactionStore {
    /// Records by ID.
    transactions: DashMap<TransactionId, Transaction>,
    /// Business reference to ID mapping.
    by_number: DashMap<String, TransactionId>,
    /// Idempotency key to transaction ID mapping.
    idempotency: DashMap<String, TransactionId>,
}

impl TransactionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            transactions: DashMap::new(),
            by_number: DashMap::new(),
            idempotency: DashMap::new(),
        }
    }

    /// Insert a new record.
    pub fn insert(&self, transaction: Transaction) {
        self.by_number
            .insert(transaction.number.to_string(), transaction.id);
        self.transactions.insert(transaction.id, transaction);
    }

    /// Overwrite a record (single-record commit).
    pub fn update(&self, transaction: Transaction) {
        self.transactions.insert(transaction.id, transaction);
    }

    /// Remove a record (only used to unwind an idempotency race loser).
    pub fn remove(&self, id: &TransactionId) {
        if let Some((_, tx)) = self.transactions.remove(id) {
            self.by_number.remove(tx.number.as_str());
        }
    }

    /// Get a record by ID.
    pub fn get(&self, id: &TransactionId) -> Option<Transaction> {
        self.transactions.get(id).map(|t| t.clone())
    }

    /// Get a record by business reference.
    pub fn by_number(&self, number: &str) -> Option<Transaction> {
        self.by_number
            .get(number)
            .and_then(|id| self.get(&id))
    }

    /// Map an idempotency key to a transaction, first writer wins.
    /// Returns the already-registered ID when the key was taken.
    pub fn register_idempotency(
        &self,
        key: &str,
        id: TransactionId,
    ) -> std::result::Result<(), TransactionId> {
        match self.idempotency.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(existing) => Err(*existing.get()),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(id);
                Ok(())
            }
        }
    }

    /// Look up the transaction recorded for an idempotency key.
    pub fn lookup_idempotency(&self, key: &str) -> Option<TransactionId> {
        self.idempotency.get(key).map(|id| *id)
    }

    /// Atomically claim the right to reverse a transaction: verifies
    /// `is_reversed == false` and stamps the reversal linkage in the same
    /// exclusive-access write. Of two concurrent claims exactly one wins;
    /// the loser observes `AlreadyReversed`.
    pub fn claim_reversal(
        &self,
        original_id: &TransactionId,
        reversal_id: TransactionId,
        reason: &str,
    ) -> Result<Transaction> {
        let mut original = self
            .transactions
            .get_mut(original_id)
            .ok_or(CoreBankError::TransactionNotFound(*original_id))?;

        if original.reversal.is_reversed {
            return Err(CoreBankError::AlreadyReversed(*original_id));
        }

        if !original.is_reversible() {
            return Err(CoreBankError::validation(
                "only completed, non-reversal transactions can be reversed",
            ));
        }

        original.reversal.is_reversed = true;
        original.reversal.reversed_by = Some(reversal_id);
        original.reversal.reversal_reason = Some(reason.to_string());
        original.reversal.reversed_at = Some(Utc::now());

        info!(
            transaction_id = %original_id,
            reversal_id = %reversal_id,
            "Reversal claimed"
        );

        Ok(original.clone())
    }

    /// Unwind a claim whose reversal could not complete, so a later attempt
    /// can succeed. Only the claim holder may release.
    pub fn release_reversal_claim(&self, original_id: &TransactionId, reversal_id: &TransactionId) {
        if let Some(mut original) = self.transactions.get_mut(original_id) {
            if original.reversal.reversed_by.as_ref() == Some(reversal_id) {
                original.reversal.is_reversed = false;
                original.reversal.reversed_by = None;
                original.reversal.reversal_reason = None;
                original.reversal.reversed_at = None;
                debug!(
                    transaction_id = %original_id,
                    reversal_id = %reversal_id,
                    "Reversal claim released"
                );
            }
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

impl Default for TransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corebank_common::{AccountId, Currency, Money, TransactionKind};
    use rust_decimal::Decimal;

    fn completed_transfer() -> Transaction {
        let mut tx = Transaction::new(
            TransactionKind::Transfer,
            Some(AccountId::new("ACC-A")),
            Some(AccountId::new("ACC-B")),
            Money::new(Decimal::from(50), Currency::usd()),
            "Test transfer",
        );
        tx.complete(None, None).unwrap();
        tx
    }

    #[test]
    fn test_insert_and_lookup() {
        let store = TransactionStore::new();
        let tx = completed_transfer();
        let id = tx.id;
        let number = tx.number.to_string();

        store.insert(tx);

        assert!(store.get(&id).is_some());
        assert_eq!(store.by_number(&number).unwrap().id, id);
    }

    #[test]
    fn test_idempotency_first_writer_wins() {
        let store = TransactionStore::new();
        let first = TransactionId::new();
        let second = TransactionId::new();

        assert!(store.register_idempotency("req-1", first).is_ok());
        assert_eq!(store.register_idempotency("req-1", second), Err(first));
        assert_eq!(store.lookup_idempotency("req-1"), Some(first));
    }

    #[test]
    fn test_claim_reversal_exactly_once() {
        let store = TransactionStore::new();
        let tx = completed_transfer();
        let id = tx.id;
        store.insert(tx);

        let first_claim = store.claim_reversal(&id, TransactionId::new(), "dup charge");
        assert!(first_claim.is_ok());

        let second_claim = store.claim_reversal(&id, TransactionId::new(), "dup charge");
        assert_eq!(second_claim.unwrap_err().error_code(), "ALREADY_REVERSED");
    }

    #[test]
    fn test_claim_rejects_pending_transaction() {
        let store = TransactionStore::new();
        let tx = Transaction::new(
            TransactionKind::Transfer,
            Some(AccountId::new("ACC-A")),
            Some(AccountId::new("ACC-B")),
            Money::new(Decimal::from(50), Currency::usd()),
            "Still pending",
        );
        let id = tx.id;
        store.insert(tx);

        let err = store
            .claim_reversal(&id, TransactionId::new(), "too early")
            .unwrap_err();
        assert_eq!(err.error_code(), "VALIDATION_FAILED");
    }

    #[test]
    fn test_release_reopens_claim() {
        let store = TransactionStore::new();
        let tx = completed_transfer();
        let id = tx.id;
        store.insert(tx);

        let reversal_id = TransactionId::new();
        store.claim_reversal(&id, reversal_id, "first try").unwrap();
        store.release_reversal_claim(&id, &reversal_id);

        assert!(store
            .claim_reversal(&id, TransactionId::new(), "second try")
            .is_ok());
    }

    #[test]
    fn test_release_ignores_non_holder() {
        let store = TransactionStore::new();
        let tx = completed_transfer();
        let id = tx.id;
        store.insert(tx);

        let holder = TransactionId::new();
        store.claim_reversal(&id, holder, "claimed").unwrap();
        store.release_reversal_claim(&id, &TransactionId::new());

        // Claim still held.
        assert!(store.get(&id).unwrap().reversal.is_reversed);
    }
}
