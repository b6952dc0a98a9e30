//! CoreBank Transaction Coordinator
//!
//! The coordinator validates, executes, and records the lifecycle of a money
//! movement: it orchestrates the account balance collaborator and the ledger
//! engine, and announces committed outcomes through the outbox.

pub mod accounts;
pub mod config;
pub mod coordinator;
pub mod metrics;
pub mod outbox;
pub mod store;

pub use accounts::{AccountLedgerStore, InMemoryAccounts};
pub use config::CoordinatorConfig;
pub use coordinator::{TransactionCoordinator, TransactionRequest};
pub use outbox::{Outbox, OutboxDispatcher};
