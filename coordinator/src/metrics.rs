//! Metrics collection for coordinator monitoring.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Coordinator metrics.
pub struct Metrics {
    /// Total transactions processed.
    pub transactions_total: AtomicU64,
    /// Completed transactions.
    pub transactions_completed: AtomicU64,
    /// Failed transactions.
    pub transactions_failed: AtomicU64,
    /// Completed reversals.
    pub transactions_reversed: AtomicU64,
    /// Transactions currently in flight.
    pub transactions_active: AtomicU64,
    /// Records flagged for manual reconciliation.
    pub reconciliation_flags: AtomicU64,
    /// Events handed to the outbox.
    pub events_enqueued: AtomicU64,
    /// Events relayed to the transport.
    pub events_published: AtomicU64,
    /// Events parked after exhausted publish retries.
    pub events_undeliverable: AtomicU64,
}

impl Metrics {
    /// Create new metrics instance.
    pub fn new() -> Self {
        Self {
            transactions_total: AtomicU64::new(0),
            transactions_completed: AtomicU64::new(0),
            transactions_failed: AtomicU64::new(0),
            transactions_reversed: AtomicU64::new(0),
            transactions_active: AtomicU64::new(0),
            reconciliation_flags: AtomicU64::new(0),
            events_enqueued: AtomicU64::new(0),
            events_published: AtomicU64::new(0),
            events_undeliverable: AtomicU64::new(0),
        }
    }

    /// Record a transaction entering the pipeline.
    pub fn transaction_initiated(&self) {
        self.transactions_total.fetch_add(1, Ordering::Relaxed);
        self.transactions_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record transaction completion.
    pub fn transaction_completed(&self) {
        self.transactions_completed.fetch_add(1, Ordering::Relaxed);
        self.transactions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record transaction failure.
    pub fn transaction_failed(&self) {
        self.transactions_failed.fetch_add(1, Ordering::Relaxed);
        self.transactions_active.fetch_sub(1, Ordering::Relaxed);
    }

    /// Record a completed reversal.
    pub fn transaction_reversed(&self) {
        self.transactions_reversed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a reconciliation flag.
    pub fn reconciliation_flagged(&self) {
        self.reconciliation_flags.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event handed to the outbox.
    pub fn event_enqueued(&self) {
        self.events_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event relayed to the transport.
    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an event parked as undeliverable.
    pub fn event_undeliverable(&self) {
        self.events_undeliverable.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            transactions_total: self.transactions_total.load(Ordering::Relaxed),
            transactions_completed: self.transactions_completed.load(Ordering::Relaxed),
            transactions_failed: self.transactions_failed.load(Ordering::Relaxed),
            transactions_reversed: self.transactions_reversed.load(Ordering::Relaxed),
            transactions_active: self.transactions_active.load(Ordering::Relaxed),
            reconciliation_flags: self.reconciliation_flags.load(Ordering::Relaxed),
            events_enqueued: self.events_enqueued.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            events_undeliverable: self.events_undeliverable.load(Ordering::Relaxed),
        }
    }

    /// Export metrics in Prometheus format.
    pub fn to_prometheus(&self) -> String {
        let snapshot = self.snapshot();
        format!(
            r#"# HELP corebank_transactions_total Total number of transactions
# TYPE corebank_transactions_total counter
corebank_transactions_total {}

# HELP corebank_transactions_completed Total completed transactions
# TYPE corebank_transactions_completed counter
corebank_transactions_completed {}

# HELP corebank_transactions_failed Total failed transactions
# TYPE corebank_transactions_failed counter
corebank_transactions_failed {}

# HELP corebank_transactions_reversed Total completed reversals
# TYPE corebank_transactions_reversed counter
corebank_transactions_reversed {}

# HELP corebank_transactions_active Current in-flight transactions
# TYPE corebank_transactions_active gauge
corebank_transactions_active {}

# HELP corebank_reconciliation_flags Records requiring manual reconciliation
# TYPE corebank_reconciliation_flags counter
corebank_reconciliation_flags {}

# HELP corebank_events_enqueued Events handed to the outbox
# TYPE corebank_events_enqueued counter
corebank_events_enqueued {}

# HELP corebank_events_published Events relayed to the transport
# TYPE corebank_events_published counter
corebank_events_published {}

# HELP corebank_events_undeliverable Events parked after exhausted retries
# TYPE corebank_events_undeliverable counter
corebank_events_undeliverable {}
"#,
            snapshot.transactions_total,
            snapshot.transactions_completed,
            snapshot.transactions_failed,
            snapshot.transactions_reversed,
            snapshot.transactions_active,
            snapshot.reconciliation_flags,
            snapshot.events_enqueued,
            snapshot.events_published,
            snapshot.events_undeliverable,
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub transactions_total: u64,
    pub transactions_completed: u64,
    pub transactions_failed: u64,
    pub transactions_reversed: u64,
    pub transactions_active: u64,
    pub reconciliation_flags: u64,
    pub events_enqueued: u64,
    pub events_published: u64,
    pub events_undeliverable: u64,
}

/// Shared metrics instance.
pub type SharedMetrics = Arc<Metrics>;
