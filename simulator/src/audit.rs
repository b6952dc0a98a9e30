//! Idempotent audit consumer used by the simulation.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use corebank_common::{DomainEvent, EventKind, Result, Timestamp};
use corebank_events::{EventHandler, ProcessedSet};

/// One audit row per distinct event.
#[derive(Debug, Clone)]
pub struct AuditRow {
    pub event_kind: EventKind,
    pub partition_key: String,
    pub recorded_at: Timestamp,
}

/// Audit trail consumer. Keyed on the event id, a redelivered event is a
/// no-op: the row count never grows under replay.
#[derive(Default)]
pub struct AuditTrail {
    processed: ProcessedSet,
    rows: Mutex<Vec<AuditRow>>,
    duplicates_collapsed: AtomicU64,
}

impl AuditTrail {
    /// Create an empty audit trail.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of audit rows written.
    pub fn row_count(&self) -> usize {
        self.rows.lock().len()
    }

    /// Number of redeliveries collapsed into no-ops.
    pub fn duplicates_collapsed(&self) -> u64 {
        self.duplicates_collapsed.load(Ordering::Relaxed)
    }

    /// Rows written so far.
    pub fn rows(&self) -> Vec<AuditRow> {
        self.rows.lock().clone()
    }
}

#[async_trait::async_trait]
impl EventHandler for AuditTrail {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        if !self.processed.mark(event.id) {
            self.duplicates_collapsed.fetch_add(1, Ordering::Relaxed);
            debug!(event_id = %event.id, "Duplicate delivery collapsed");
            return Ok(());
        }

        self.rows.lock().push(AuditRow {
            event_kind: event.kind(),
            partition_key: event.partition_key.clone(),
            recorded_at: event.occurred_at,
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corebank_common::{
        AccountId, Currency, EventPayload, Money, Transaction, TransactionKind,
        TransactionSnapshot,
    };
    use rust_decimal::Decimal;

    fn test_event() -> DomainEvent {
        let tx = Transaction::new(
            TransactionKind::Transfer,
            Some(AccountId::new("ACC-A")),
            Some(AccountId::new("ACC-B")),
            Money::new(Decimal::from(50), Currency::usd()),
            "Test transfer",
        );
        DomainEvent::for_transaction(
            &tx,
            EventPayload::TransactionCompleted {
                snapshot: TransactionSnapshot::capture(&tx),
            },
        )
    }

    #[tokio::test]
    async fn test_duplicate_deliveries_collapse() {
        let audit = AuditTrail::new();
        let event = test_event();

        audit.handle(&event).await.unwrap();
        audit.handle(&event).await.unwrap();
        audit.handle(&event).await.unwrap();

        assert_eq!(audit.row_count(), 1);
        assert_eq!(audit.duplicates_collapsed(), 2);
    }
}
