//! Randomized movement scenarios.

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use tracing::info;

use corebank_common::{AccountId, Currency, Money, TransactionId, TransactionStatus};
use corebank_coordinator::{TransactionCoordinator, TransactionRequest};

/// Outcome counts for a scenario run.
#[derive(Debug, Default)]
pub struct ScenarioReport {
    pub requested: usize,
    pub completed: usize,
    pub failed: usize,
    pub rejected: usize,
    pub reversed: usize,
}

/// A randomized mix of transfers, deposits, and withdrawals, followed by a
/// wave of reversals over a sample of the completed transfers.
pub struct Scenario {
    accounts: Vec<AccountId>,
    movements: usize,
    rng: StdRng,
}

impl Scenario {
    /// Create a scenario over `account_count` accounts.
    pub fn new(account_count: usize, movements: usize, seed: Option<u64>) -> Self {
        let accounts = (0..account_count)
            .map(|i| AccountId::new(format!("ACC-{:04}", i + 1)))
            .collect();

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            accounts,
            movements,
            rng,
        }
    }

    /// The accounts this scenario touches.
    pub fn accounts(&self) -> &[AccountId] {
        &self.accounts
    }

    /// Drive the scenario through the coordinator.
    pub async fn run(&mut self, coordinator: &TransactionCoordinator) -> ScenarioReport {
        let mut report = ScenarioReport::default();
        let requests = self.build_requests();
        report.requested = requests.len();

        let outcomes = join_all(
            requests
                .into_iter()
                .map(|request| coordinator.process_transaction(request)),
        )
        .await;

        let mut completed_transfers: Vec<TransactionId> = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(tx) if tx.status == TransactionStatus::Completed => {
                    report.completed += 1;
                    if tx.source_account.is_some() && tx.destination_account.is_some() {
                        completed_transfers.push(tx.id);
                    }
                }
                Ok(_) => report.failed += 1,
                Err(_) => report.rejected += 1,
            }
        }

        // Reverse roughly one in five completed transfers.
        for id in completed_transfers {
            if self.rng.gen_range(0..5) == 0 {
                if let Ok(reversal) =
                    coordinator.reverse_transaction(id, "scenario reversal").await
                {
                    if reversal.status == TransactionStatus::Completed {
                        report.reversed += 1;
                    }
                }
            }
        }

        info!(
            requested = report.requested,
            completed = report.completed,
            failed = report.failed,
            rejected = report.rejected,
            reversed = report.reversed,
            "Scenario finished"
        );

        report
    }

    fn build_requests(&mut self) -> Vec<TransactionRequest> {
        let mut requests = Vec::with_capacity(self.movements);

        for _ in 0..self.movements {
            let amount = Money::new(
                Decimal::from(self.rng.gen_range(1..500)),
                Currency::usd(),
            );

            let request = match self.rng.gen_range(0..10) {
                0..=5 => {
                    let (source, destination) = self.pick_pair();
                    TransactionRequest::transfer(source, destination, amount, "scenario transfer")
                }
                6 | 7 => TransactionRequest::deposit(
                    self.pick_account(),
                    amount,
                    "scenario deposit",
                ),
                _ => TransactionRequest::withdrawal(
                    self.pick_account(),
                    amount,
                    "scenario withdrawal",
                ),
            };

            requests.push(request);
        }

        requests
    }

    fn pick_account(&mut self) -> AccountId {
        self.accounts[self.rng.gen_range(0..self.accounts.len())].clone()
    }

    fn pick_pair(&mut self) -> (AccountId, AccountId) {
        let source = self.rng.gen_range(0..self.accounts.len());
        let mut destination = self.rng.gen_range(0..self.accounts.len());
        while destination == source {
            destination = self.rng.gen_range(0..self.accounts.len());
        }
        (
            self.accounts[source].clone(),
            self.accounts[destination].clone(),
        )
    }
}
