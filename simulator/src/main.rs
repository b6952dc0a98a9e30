//! CoreBank Simulator
//!
//! Drives randomized money movements through the full pipeline: coordinator,
//! ledger engine, outbox dispatcher, event log, and an idempotent audit
//! consumer.

use std::sync::Arc;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod audit;
mod scenario;

use audit::AuditTrail;
use scenario::Scenario;

use corebank_coordinator::{
    CoordinatorConfig, InMemoryAccounts, Outbox, OutboxDispatcher, TransactionCoordinator,
};
use corebank_events::{EventConsumer, EventPublisher, InMemoryEventLog};

/// CoreBank Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "CoreBank movement engine simulation environment")]
struct Args {
    /// Number of accounts to open
    #[arg(short, long, default_value = "10")]
    accounts: usize,

    /// Number of movements to request
    #[arg(short, long, default_value = "200")]
    movements: usize,

    /// Opening balance per account
    #[arg(long, default_value = "1000")]
    opening_balance: i64,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting CoreBank Simulator");
    info!("Accounts: {}", args.accounts);
    info!("Movements: {}", args.movements);

    let config = CoordinatorConfig::from_env();
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {e}"))?;

    // Assemble the pipeline.
    let accounts = InMemoryAccounts::shared();
    let outbox = Outbox::shared();
    let log = InMemoryEventLog::shared();

    let coordinator =
        TransactionCoordinator::new(config.clone(), accounts.clone(), outbox.clone());
    let publisher = EventPublisher::new(log.clone(), config.publisher.clone());
    let dispatcher = Arc::new(OutboxDispatcher::new(
        outbox.clone(),
        publisher,
        config.outbox_drain_interval,
        coordinator.metrics(),
    ));

    // Background outbox relay, as in production.
    let background_dispatcher = dispatcher.clone();
    tokio::spawn(async move {
        background_dispatcher.run_drain_loop().await;
    });

    // Seed accounts and run the scenario.
    let mut scenario = Scenario::new(args.accounts, args.movements, args.seed);
    for account in scenario.accounts() {
        accounts
            .open_account(account.clone(), Decimal::from(args.opening_balance))
            .await;
    }

    let report = scenario.run(&coordinator).await;

    // Flush whatever the background loop has not relayed yet, then feed the
    // audit consumer.
    dispatcher.drain_now().await;

    let consumer = EventConsumer::new(log.clone(), "audit", config.consumer.clone());
    let audit = AuditTrail::new();
    let delivered = consumer.run_until_idle(&audit).await;

    // Run report.
    let metrics = coordinator.metrics().snapshot();
    info!("Simulation complete");
    info!(
        "Movements: {} requested, {} completed, {} failed, {} rejected, {} reversed",
        report.requested, report.completed, report.failed, report.rejected, report.reversed
    );
    info!(
        "Events: {} enqueued, {} published, {} undeliverable",
        metrics.events_enqueued, metrics.events_published, metrics.events_undeliverable
    );
    info!(
        "Audit: {} deliveries, {} rows, {} duplicates collapsed",
        delivered,
        audit.row_count(),
        audit.duplicates_collapsed()
    );
    info!(
        "Ledger integrity: {}",
        if coordinator.ledger().verify_integrity() {
            "balanced"
        } else {
            "UNBALANCED"
        }
    );
    info!(
        "Reconciliation flags: {}",
        metrics.reconciliation_flags
    );

    Ok(())
}
