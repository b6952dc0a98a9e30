//! Consumer runtime: at-least-once delivery with manual acknowledgment.

use std::sync::Arc;

use dashmap::DashSet;
use tracing::{info, warn};

use corebank_common::{DomainEvent, EventId, Result};

use crate::config::ConsumerConfig;
use crate::log::{Delivery, InMemoryEventLog};

/// Trait for handling delivered events.
///
/// A handler may see the same event more than once (redelivery after a crash
/// between side effect and acknowledgment) and must be idempotent: keyed on
/// the event id, "already processed" is a no-op, not a duplicate side effect.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    /// Process one event. Returning an error leaves the delivery
    /// unacknowledged; it will be redelivered.
    async fn handle(&self, event: &DomainEvent) -> Result<()>;
}

/// Default handler that logs events without processing them.
pub struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &DomainEvent) -> Result<()> {
        info!(
            event_id = %event.id,
            kind = %event.kind(),
            key = %event.partition_key,
            "Event received"
        );
        Ok(())
    }
}

/// Helper for the consumer-side idempotency obligation: a set of processed
/// event ids. `mark` returns false for an id already recorded, letting the
/// caller collapse a redelivery into a no-op.
#[derive(Default)]
pub struct ProcessedSet {
    seen: DashSet<EventId>,
}

impl ProcessedSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Record an event id. Returns true if this is the first time.
    pub fn mark(&self, id: EventId) -> bool {
        self.seen.insert(id)
    }

    /// Check whether an event id was already processed.
    pub fn contains(&self, id: &EventId) -> bool {
        self.seen.contains(id)
    }

    /// Number of distinct events processed.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been processed yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// A consumer-group binding over the event log.
///
/// Delivery is at-least-once: a record stays in the group's view until
/// explicitly acknowledged, and acknowledgment happens only after the
/// handler's side effect completed. A record that keeps failing is routed
/// to the dead-letter store after `max_deliveries` instead of retrying
/// forever.
pub struct EventConsumer {
    log: Arc<InMemoryEventLog>,
    group: String,
    config: ConsumerConfig,
}

impl EventConsumer {
    /// Bind a consumer group to the log.
    pub fn new(log: Arc<InMemoryEventLog>, group: impl Into<String>, config: ConsumerConfig) -> Self {
        Self {
            log,
            group: group.into(),
            config,
        }
    }

    /// The consumer group name.
    pub fn group(&self) -> &str {
        &self.group
    }

    /// Fetch the next unacknowledged delivery, if any.
    pub fn poll(&self) -> Option<Delivery> {
        self.log.next_for_group(&self.group)
    }

    /// Acknowledge a delivery after its side effect is durable.
    pub fn ack(&self, delivery: &Delivery) {
        self.log.ack(&self.group, delivery);
    }

    /// Deliver one event to the handler, acknowledging on success.
    /// Returns false when the log had nothing pending for this group.
    pub async fn run_once(&self, handler: &dyn EventHandler) -> bool {
        let Some(delivery) = self.poll() else {
            return false;
        };

        match handler.handle(&delivery.event).await {
            Ok(()) => {
                self.ack(&delivery);
            }
            Err(e) => {
                warn!(
                    group = %self.group,
                    event_id = %delivery.event.id,
                    attempt = delivery.attempt,
                    error = %e,
                    "Handler failed; delivery left unacknowledged"
                );
                if delivery.attempt >= self.config.max_deliveries {
                    self.log.dead_letter(&self.group, delivery);
                }
            }
        }

        true
    }

    /// Drain everything currently pending for this group.
    pub async fn run_until_idle(&self, handler: &dyn EventHandler) -> u64 {
        let mut processed = 0;
        while self.run_once(handler).await {
            processed += 1;
        }
        processed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::EventTransport;
    use corebank_common::{
        AccountId, CoreBankError, Currency, EventPayload, Money, Transaction, TransactionKind,
        TransactionSnapshot,
    };
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn test_event(source: &str) -> DomainEvent {
        let tx = Transaction::new(
            TransactionKind::Transfer,
            Some(AccountId::new(source)),
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

    /// Audit-style handler: one row per event id, duplicates collapse.
    struct AuditHandler {
        processed: ProcessedSet,
        rows: AtomicU32,
    }

    impl AuditHandler {
        fn new() -> Self {
            Self {
                processed: ProcessedSet::new(),
                rows: AtomicU32::new(0),
            }
        }

        fn row_count(&self) -> u32 {
            self.rows.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl EventHandler for AuditHandler {
        async fn handle(&self, event: &DomainEvent) -> Result<()> {
            if !self.processed.mark(event.id) {
                // Already audited; redelivery is a no-op.
                return Ok(());
            }
            self.rows.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Handler that fails a fixed number of times before succeeding.
    struct FlakyHandler {
        failures_left: AtomicU32,
        handled: AtomicU32,
    }

    #[async_trait::async_trait]
    impl EventHandler for FlakyHandler {
        async fn handle(&self, _event: &DomainEvent) -> Result<()> {
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(CoreBankError::Store("side effect failed".to_string()));
            }
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_successful_delivery_is_acked() {
        let log = InMemoryEventLog::shared();
        log.append(&test_event("ACC-A")).await.unwrap();

        let consumer = EventConsumer::new(log.clone(), "audit", ConsumerConfig::default());
        let handler = AuditHandler::new();

        assert!(consumer.run_once(&handler).await);
        assert!(!consumer.run_once(&handler).await);
        assert_eq!(handler.row_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_delivery_is_redelivered_then_succeeds() {
        let log = InMemoryEventLog::shared();
        log.append(&test_event("ACC-A")).await.unwrap();

        let consumer = EventConsumer::new(log.clone(), "audit", ConsumerConfig::default());
        let handler = FlakyHandler {
            failures_left: AtomicU32::new(2),
            handled: AtomicU32::new(0),
        };

        consumer.run_until_idle(&handler).await;

        assert_eq!(handler.handled.load(Ordering::SeqCst), 1);
        assert!(log.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn test_poison_event_goes_to_dead_letter() {
        let log = InMemoryEventLog::shared();
        log.append(&test_event("ACC-A")).await.unwrap();

        let config = ConsumerConfig {
            max_deliveries: 3,
            ..ConsumerConfig::default()
        };
        let consumer = EventConsumer::new(log.clone(), "audit", config);
        let handler = FlakyHandler {
            failures_left: AtomicU32::new(u32::MAX),
            handled: AtomicU32::new(0),
        };

        consumer.run_until_idle(&handler).await;

        assert_eq!(log.dead_letters().len(), 1);
        assert_eq!(log.dead_letters()[0].attempts, 3);
        // Partition is unblocked.
        assert!(consumer.poll().is_none());
    }

    #[tokio::test]
    async fn test_crash_between_side_effect_and_ack_is_survivable() {
        let log = InMemoryEventLog::shared();
        log.append(&test_event("ACC-A")).await.unwrap();

        let consumer = EventConsumer::new(log.clone(), "audit", ConsumerConfig::default());
        let handler = AuditHandler::new();

        // Simulated crash: side effect runs, acknowledgment never happens.
        let delivery = consumer.poll().unwrap();
        handler.handle(&delivery.event).await.unwrap();
        drop(delivery);

        // After restart the same event is redelivered; the audit row count
        // must not grow.
        consumer.run_until_idle(&handler).await;
        assert_eq!(handler.row_count(), 1);
        assert!(consumer.poll().is_none());
    }

    #[tokio::test]
    async fn test_same_key_events_arrive_in_order() {
        let log = InMemoryEventLog::shared();
        let e1 = test_event("ACC-A");
        let e2 = test_event("ACC-A");
        log.append(&e1).await.unwrap();
        log.append(&e2).await.unwrap();

        let consumer = EventConsumer::new(log.clone(), "audit", ConsumerConfig::default());

        let d1 = consumer.poll().unwrap();
        assert_eq!(d1.event.id, e1.id);
        consumer.ack(&d1);

        let d2 = consumer.poll().unwrap();
        assert_eq!(d2.event.id, e2.id);
    }
}
