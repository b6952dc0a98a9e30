//! Transactional outbox: events enqueue with the state change that caused
//! them and a dispatcher relays them to the publisher afterwards, so a
//! committed state change can never lose its announcement.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info};

use corebank_common::{CoreBankError, DomainEvent};
use corebank_events::EventPublisher;

use crate::metrics::SharedMetrics;

/// Ordered queue of events awaiting relay to the transport.
pub struct Outbox {
    /// Events not yet handed to the publisher, in enqueue order.
    pending: Mutex<VecDeque<DomainEvent>>,
    /// Events whose publish retries were exhausted; parked for manual
    /// re-drive, never dropped.
    undeliverable: Mutex<Vec<DomainEvent>>,
}

impl Outbox {
    /// Create an empty outbox.
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            undeliverable: Mutex::new(Vec::new()),
        }
    }

    /// Shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Enqueue an event. Called in the same logical commit as the state
    /// change the event describes.
    pub fn enqueue(&self, event: DomainEvent) {
        self.pending.lock().push_back(event);
    }

    /// Number of events awaiting relay.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Events parked after exhausted retries.
    pub fn undeliverable(&self) -> Vec<DomainEvent> {
        self.undeliverable.lock().clone()
    }

    fn take_next(&self) -> Option<DomainEvent> {
        self.pending.lock().pop_front()
    }

    fn park(&self, event: DomainEvent) {
        self.undeliverable.lock().push(event);
    }
}

impl Default for Outbox {
    fn default() -> Self {
        Self::new()
    }
}

/// Drains the outbox to the publisher. A single dispatcher drains in
/// enqueue order, which preserves per-key ordering end to end.
pub struct OutboxDispatcher {
    outbox: Arc<Outbox>,
    publisher: EventPublisher,
    drain_interval: Duration,
    metrics: SharedMetrics,
}

impl OutboxDispatcher {
    /// Create a new dispatcher.
    pub fn new(
        outbox: Arc<Outbox>,
        publisher: EventPublisher,
        drain_interval: Duration,
        metrics: SharedMetrics,
    ) -> Self {
        Self {
            outbox,
            publisher,
            drain_interval,
            metrics,
        }
    }

    /// Relay everything currently pending. Returns the number published.
    /// An event whose retries are exhausted is parked and alerted; it does
    /// not block later events or fail the transactions behind them.
    pub async fn drain_now(&self) -> u64 {
        let mut published = 0;

        while let Some(event) = self.outbox.take_next() {
            match self.publisher.publish(&event).await {
                Ok(_) => {
                    published += 1;
                    self.metrics.event_published();
                }
                Err(CoreBankError::PublishRetryExhausted { .. }) => {
                    self.metrics.event_undeliverable();
                    error!(
                        event_id = %event.id,
                        kind = %event.kind(),
                        key = %event.partition_key,
                        "Outbox record parked as undeliverable"
                    );
                    self.outbox.park(event);
                }
                Err(e) => {
                    self.metrics.event_undeliverable();
                    error!(
                        event_id = %event.id,
                        error = %e,
                        "Unexpected publish error; record parked"
                    );
                    self.outbox.park(event);
                }
            }
        }

        published
    }

    /// Run the periodic drain loop.
    pub async fn run_drain_loop(&self) {
        info!(interval_ms = self.drain_interval.as_millis() as u64, "Outbox dispatcher started");
        loop {
            tokio::time::sleep(self.drain_interval).await;
            self.drain_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Metrics;
    use corebank_common::{
        AccountId, Currency, EventPayload, Money, Transaction, TransactionKind,
        TransactionSnapshot,
    };
    use corebank_events::{InMemoryEventLog, PublisherConfig};
    use rust_decimal::Decimal;

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
            EventPayload::TransactionInitiated {
                snapshot: TransactionSnapshot::capture(&tx),
            },
        )
    }

    fn fast_publisher(log: Arc<InMemoryEventLog>) -> EventPublisher {
        EventPublisher::new(
            log,
            PublisherConfig {
                max_attempts: 2,
                attempt_timeout: Duration::from_millis(200),
                retry_backoff: Duration::from_millis(1),
            },
        )
    }

    #[tokio::test]
    async fn test_drain_preserves_order() {
        let log = InMemoryEventLog::shared();
        let outbox = Outbox::shared();
        let dispatcher = OutboxDispatcher::new(
            outbox.clone(),
            fast_publisher(log.clone()),
            Duration::from_millis(10),
            Arc::new(Metrics::new()),
        );

        let first = test_event("ACC-A");
        let second = test_event("ACC-A");
        outbox.enqueue(first.clone());
        outbox.enqueue(second.clone());

        assert_eq!(dispatcher.drain_now().await, 2);
        assert_eq!(outbox.pending_len(), 0);

        assert_eq!(log.read("ACC-A", 0).unwrap().id, first.id);
        assert_eq!(log.read("ACC-A", 1).unwrap().id, second.id);
    }

    #[tokio::test]
    async fn test_exhausted_event_is_parked_not_dropped() {
        let log = InMemoryEventLog::shared();
        let outbox = Outbox::shared();
        let dispatcher = OutboxDispatcher::new(
            outbox.clone(),
            fast_publisher(log.clone()),
            Duration::from_millis(10),
            Arc::new(Metrics::new()),
        );

        outbox.enqueue(test_event("ACC-A"));
        log.fail_next_appends(2);

        assert_eq!(dispatcher.drain_now().await, 0);
        assert_eq!(outbox.undeliverable().len(), 1);
        assert_eq!(outbox.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_parked_event_does_not_block_later_ones() {
        let log = InMemoryEventLog::shared();
        let outbox = Outbox::shared();
        let dispatcher = OutboxDispatcher::new(
            outbox.clone(),
            fast_publisher(log.clone()),
            Duration::from_millis(10),
            Arc::new(Metrics::new()),
        );

        outbox.enqueue(test_event("ACC-A"));
        outbox.enqueue(test_event("ACC-C"));
        log.fail_next_appends(2);

        assert_eq!(dispatcher.drain_now().await, 1);
        assert_eq!(outbox.undeliverable().len(), 1);
        assert_eq!(log.partition_len("ACC-C"), 1);
    }
}
