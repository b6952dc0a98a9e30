//! Event transport contract and the in-memory partitioned log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use corebank_common::{CoreBankError, DomainEvent, EventId, Result};

/// Transport seam the publisher writes through. Implementations must keep
/// same-key appends in call order and commit a given event id at most once.
#[async_trait::async_trait]
pub trait EventTransport: Send + Sync {
    /// Append an event to its partition, returning the partition offset.
    /// Appending an event id that is already present returns the original
    /// offset without a second record (idempotent producer semantics).
    async fn append(&self, event: &DomainEvent) -> Result<u64>;
}

/// One delivery of an event to a consumer group.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// The event.
    pub event: DomainEvent,
    /// Partition the event was read from.
    pub partition_key: String,
    /// Offset within the partition.
    pub offset: u64,
    /// How many times this group has seen this event (1 = first delivery).
    pub attempt: u32,
}

/// A dead-lettered event with its delivery history.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    /// Consumer group that exhausted its deliveries.
    pub group: String,
    /// The undeliverable event.
    pub event: DomainEvent,
    /// Deliveries attempted before parking.
    pub attempts: u32,
}

#[derive(Default)]
struct Partition {
    records: Vec<DomainEvent>,
    seen: HashMap<EventId, u64>,
}

/// In-memory reference implementation of the durable event log.
///
/// Each partition key maps to an ordered record vector; consumer groups
/// track a per-partition committed offset, advanced only by explicit
/// acknowledgment. Unacknowledged records are redelivered on every poll.
pub struct InMemoryEventLog {
    /// Partitions by key.
    partitions: DashMap<String, Partition>,
    /// Committed offsets by (group, partition key).
    offsets: DashMap<(String, String), u64>,
    /// Delivery counts by (group, partition key, offset).
    attempts: DashMap<(String, String, u64), u32>,
    /// Dead-lettered events awaiting manual inspection.
    dead_letters: RwLock<Vec<DeadLetter>>,
    /// Fault injection: number of upcoming appends to fail.
    fail_next: AtomicU32,
}

impl InMemoryEventLog {
    /// Create a new empty log.
    pub fn new() -> Self {
        Self {
            partitions: DashMap::new(),
            offsets: DashMap::new(),
            attempts: DashMap::new(),
            dead_letters: RwLock::new(Vec::new()),
            fail_next: AtomicU32::new(0),
        }
    }

    /// Shared handle.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Inject `n` transient append failures (test hook).
    pub fn fail_next_appends(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Number of records in a partition.
    pub fn partition_len(&self, key: &str) -> u64 {
        self.partitions
            .get(key)
            .map(|p| p.records.len() as u64)
            .unwrap_or(0)
    }

    /// All partition keys currently holding records.
    pub fn partition_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.partitions.iter().map(|p| p.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Total records across all partitions.
    pub fn total_records(&self) -> u64 {
        self.partitions
            .iter()
            .map(|p| p.records.len() as u64)
            .sum()
    }

    /// Read one record.
    pub fn read(&self, key: &str, offset: u64) -> Option<DomainEvent> {
        self.partitions
            .get(key)
            .and_then(|p| p.records.get(offset as usize).cloned())
    }

    /// Next unacknowledged delivery for a group, scanning partitions in key
    /// order. Increments the delivery count for the returned record.
    pub fn next_for_group(&self, group: &str) -> Option<Delivery> {
        for key in self.partition_keys() {
            let committed = self
                .offsets
                .get(&(group.to_string(), key.clone()))
                .map(|o| *o)
                .unwrap_or(0);

            if let Some(event) = self.read(&key, committed) {
                let mut attempt = self
                    .attempts
                    .entry((group.to_string(), key.clone(), committed))
                    .or_insert(0);
                *attempt += 1;

                return Some(Delivery {
                    event,
                    partition_key: key,
                    offset: committed,
                    attempt: *attempt,
                });
            }
        }
        None
    }

    /// Acknowledge a delivery, advancing the group's committed offset.
    pub fn ack(&self, group: &str, delivery: &Delivery) {
        self.offsets.insert(
            (group.to_string(), delivery.partition_key.clone()),
            delivery.offset + 1,
        );
        self.attempts.remove(&(
            group.to_string(),
            delivery.partition_key.clone(),
            delivery.offset,
        ));
        debug!(
            group,
            partition = %delivery.partition_key,
            offset = delivery.offset,
            "Delivery acknowledged"
        );
    }

    /// Park an undeliverable event and advance past it so the partition
    /// is not blocked forever.
    pub fn dead_letter(&self, group: &str, delivery: Delivery) {
        warn!(
            group,
            partition = %delivery.partition_key,
            offset = delivery.offset,
            attempts = delivery.attempt,
            event_id = %delivery.event.id,
            "Event routed to dead-letter store"
        );
        self.ack(group, &delivery);
        self.dead_letters.write().push(DeadLetter {
            group: group.to_string(),
            event: delivery.event,
            attempts: delivery.attempt,
        });
    }

    /// Dead letters recorded so far.
    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.read().clone()
    }
}

impl Default for InMemoryEventLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EventTransport for InMemoryEventLog {
    async fn append(&self, event: &DomainEvent) -> Result<u64> {
        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0
            && self
                .fail_next
                .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            return Err(CoreBankError::Store(
                "injected transient append failure".to_string(),
            ));
        }

        let mut partition = self.partitions.entry(event.partition_key.clone()).or_default();

        if let Some(existing) = partition.seen.get(&event.id) {
            debug!(
                event_id = %event.id,
                partition = %event.partition_key,
                offset = existing,
                "Duplicate append suppressed"
            );
            return Ok(*existing);
        }

        let offset = partition.records.len() as u64;
        partition.seen.insert(event.id, offset);
        partition.records.push(event.clone());
        Ok(offset)
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

    #[tokio::test]
    async fn test_append_assigns_sequential_offsets() {
        let log = InMemoryEventLog::new();

        assert_eq!(log.append(&test_event("ACC-A")).await.unwrap(), 0);
        assert_eq!(log.append(&test_event("ACC-A")).await.unwrap(), 1);
        assert_eq!(log.append(&test_event("ACC-C")).await.unwrap(), 0);

        assert_eq!(log.partition_len("ACC-A"), 2);
        assert_eq!(log.partition_len("ACC-C"), 1);
    }

    #[tokio::test]
    async fn test_duplicate_append_commits_once() {
        let log = InMemoryEventLog::new();
        let event = test_event("ACC-A");

        let first = log.append(&event).await.unwrap();
        let second = log.append(&event).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(log.partition_len("ACC-A"), 1);
    }

    #[tokio::test]
    async fn test_redelivery_until_ack() {
        let log = InMemoryEventLog::new();
        log.append(&test_event("ACC-A")).await.unwrap();

        let d1 = log.next_for_group("audit").unwrap();
        assert_eq!(d1.attempt, 1);

        // Not acknowledged: same record comes back, attempt incremented.
        let d2 = log.next_for_group("audit").unwrap();
        assert_eq!(d2.offset, d1.offset);
        assert_eq!(d2.attempt, 2);

        log.ack("audit", &d2);
        assert!(log.next_for_group("audit").is_none());
    }

    #[tokio::test]
    async fn test_groups_track_independent_offsets() {
        let log = InMemoryEventLog::new();
        log.append(&test_event("ACC-A")).await.unwrap();

        let audit = log.next_for_group("audit").unwrap();
        log.ack("audit", &audit);

        // A different group still sees the record.
        assert!(log.next_for_group("notification").is_some());
    }

    #[tokio::test]
    async fn test_dead_letter_unblocks_partition() {
        let log = InMemoryEventLog::new();
        log.append(&test_event("ACC-A")).await.unwrap();
        log.append(&test_event("ACC-A")).await.unwrap();

        let stuck = log.next_for_group("audit").unwrap();
        log.dead_letter("audit", stuck);

        let next = log.next_for_group("audit").unwrap();
        assert_eq!(next.offset, 1);
        assert_eq!(log.dead_letters().len(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection() {
        let log = InMemoryEventLog::new();
        log.fail_next_appends(1);

        assert!(log.append(&test_event("ACC-A")).await.is_err());
        assert!(log.append(&test_event("ACC-A")).await.is_ok());
    }
}
