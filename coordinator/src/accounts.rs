//! Account balance collaborator contract and in-memory reference store.

use std::collections::HashMap;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::debug;

use corebank_common::{AccountId, CoreBankError, Money, Result};

/// The account balance collaborator the coordinator debits and credits
/// through. Each call is atomic per account: concurrent movements touching
/// the same account serialize here, so the coordinator never holds a lock
/// spanning two accounts.
#[async_trait::async_trait]
pub trait AccountLedgerStore: Send + Sync {
    /// Debit an account, returning the new balance. Fails with a typed
    /// insufficient-funds error without mutating when the balance is short.
    async fn debit(&self, account: &AccountId, amount: &Money) -> Result<Decimal>;

    /// Credit an account, returning the new balance.
    async fn credit(&self, account: &AccountId, amount: &Money) -> Result<Decimal>;

    /// Advisory balance pre-check; the debit itself remains the authority.
    async fn has_sufficient_balance(&self, account: &AccountId, amount: &Money) -> Result<bool>;

    /// Current balance.
    async fn balance(&self, account: &AccountId) -> Result<Decimal>;
}

/// In-memory account store for tests and simulation.
pub struct InMemoryAccounts {
    /// Balances by account. The write guard serializes mutations, giving
    /// each debit/credit call per-account atomicity.
    balances: Arc<RwLock<HashMap<AccountId, Decimal>>>,
}

impl InMemoryAccounts {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            balances: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Open an account with an initial balance.
    pub async fn open_account(&self, account: AccountId, opening_balance: Decimal) {
        self.balances.write().await.insert(account, opening_balance);
    }
}

impl Default for InMemoryAccounts {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AccountLedgerStore for InMemoryAccounts {
    async fn debit(&self, account: &AccountId, amount: &Money) -> Result<Decimal> {
        let mut balances = self.balances.write().await;
        let balance = balances
            .get_mut(account)
            .ok_or_else(|| CoreBankError::AccountNotFound(account.clone()))?;

        if *balance < amount.value {
            return Err(CoreBankError::InsufficientFunds {
                account: account.clone(),
                required: amount.value.to_string(),
                available: balance.to_string(),
            });
        }

        *balance -= amount.value;
        debug!(account = %account, amount = %amount, balance = %balance, "Account debited");
        Ok(*balance)
    }

    async fn credit(&self, account: &AccountId, amount: &Money) -> Result<Decimal> {
        let mut balances = self.balances.write().await;
        let balance = balances
            .get_mut(account)
            .ok_or_else(|| CoreBankError::AccountNotFound(account.clone()))?;

        *balance += amount.value;
        debug!(account = %account, amount = %amount, balance = %balance, "Account credited");
        Ok(*balance)
    }

    async fn has_sufficient_balance(&self, account: &AccountId, amount: &Money) -> Result<bool> {
        let balances = self.balances.read().await;
        let balance = balances
            .get(account)
            .ok_or_else(|| CoreBankError::AccountNotFound(account.clone()))?;
        Ok(*balance >= amount.value)
    }

    async fn balance(&self, account: &AccountId) -> Result<Decimal> {
        let balances = self.balances.read().await;
        balances
            .get(account)
            .copied()
            .ok_or_else(|| CoreBankError::AccountNotFound(account.clone()))
    }
}
