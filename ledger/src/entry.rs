//! Ledger entry types for double-entry bookkeeping.

use chrono::{DateTime, Utc};
use corebank_common::{AccountId, Currency, TransactionId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single ledger row. Exactly one of `debit`/`credit` is set and non-zero;
/// the constructors are the only way to build one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Unique entry ID.
    pub id: Uuid,
    /// Transaction this entry belongs to.
    pub transaction_id: TransactionId,
    /// Account affected.
    pub account_id: AccountId,
    /// Debit amount (outgoing side).
    pub debit: Option<Decimal>,
    /// Credit amount (incoming side).
    pub credit: Option<Decimal>,
    /// Currency.
    pub currency: Currency,
    /// When this entry was created.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Create a debit entry.
    pub fn debit(
        transaction_id: TransactionId,
        account_id: AccountId,
        amount: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            account_id,
            debit: Some(amount),
            credit: None,
            currency,
            created_at: Utc::now(),
        }
    }

    /// Create a credit entry.
    pub fn credit(
        transaction_id: TransactionId,
        account_id: AccountId,
        amount: Decimal,
        currency: Currency,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            transaction_id,
            account_id,
            debit: None,
            credit: Some(amount),
            currency,
            created_at: Utc::now(),
        }
    }

    /// Check if this is a debit row.
    pub fn is_debit(&self) -> bool {
        self.debit.is_some()
    }

    /// The amount on whichever side is set.
    pub fn amount(&self) -> Decimal {
        self.debit.or(self.credit).unwrap_or(Decimal::ZERO)
    }

    /// Get signed amount (positive for debit, negative for credit).
    pub fn signed_amount(&self) -> Decimal {
        match (self.debit, self.credit) {
            (Some(d), _) => d,
            (_, Some(c)) => -c,
            _ => Decimal::ZERO,
        }
    }
}

/// The set of entries derived for one transaction.
#[derive(Debug, Clone)]
pub struct EntrySet {
    /// Entries in the set.
    pub entries: Vec<LedgerEntry>,
    /// Owning transaction.
    pub transaction_id: TransactionId,
}

impl EntrySet {
    /// Create a new entry set.
    pub fn new(transaction_id: TransactionId) -> Self {
        Self {
            entries: Vec::new(),
            transaction_id,
        }
    }

    /// Add an entry to the set.
    pub fn push(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    /// Verify the set is balanced (debits == credits per currency).
    pub fn is_balanced(&self) -> bool {
        use std::collections::HashMap;

        let mut balances: HashMap<String, Decimal> = HashMap::new();

        for entry in &self.entries {
            let currency = entry.currency.code().to_string();
            *balances.entry(currency).or_insert(Decimal::ZERO) += entry.signed_amount();
        }

        balances.values().all(|&balance| balance == Decimal::ZERO)
    }

    /// Get total debits.
    pub fn total_debits(&self) -> Decimal {
        self.entries.iter().filter_map(|e| e.debit).sum()
    }

    /// Get total credits.
    pub fn total_credits(&self) -> Decimal {
        self.entries.iter().filter_map(|e| e.credit).sum()
    }
}
