//! Domain event definitions for the reliable-delivery pipeline.

use crate::{AccountId, EventId, Money, Transaction, TransactionId, TransactionStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The fixed set of announced state changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// A pending transaction record was durably created.
    TransactionInitiated,
    /// A transaction reached COMPLETED.
    TransactionCompleted,
    /// A transaction reached FAILED.
    TransactionFailed,
    /// A completed transaction was reversed.
    TransactionReversed,
}

impl EventKind {
    /// Dotted event-type name used on the wire and in consumer routing.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::TransactionInitiated => "transaction.initiated",
            EventKind::TransactionCompleted => "transaction.completed",
            EventKind::TransactionFailed => "transaction.failed",
            EventKind::TransactionReversed => "transaction.reversed",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Snapshot of a transaction record at emission time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionSnapshot {
    pub transaction_id: TransactionId,
    pub number: String,
    pub status: TransactionStatus,
    pub amount: Money,
    pub source_account: Option<AccountId>,
    pub destination_account: Option<AccountId>,
    pub source_balance_after: Option<Decimal>,
    pub destination_balance_after: Option<Decimal>,
    pub needs_reconciliation: bool,
}

impl TransactionSnapshot {
    /// Capture a snapshot from a transaction record.
    pub fn capture(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id,
            number: tx.number.to_string(),
            status: tx.status,
            amount: tx.amount.clone(),
            source_account: tx.source_account.clone(),
            destination_account: tx.destination_account.clone(),
            source_balance_after: tx.balances.source_balance_after,
            destination_balance_after: tx.balances.destination_balance_after,
            needs_reconciliation: tx.needs_reconciliation,
        }
    }
}

/// Closed set of event payloads, tagged by event type.
/// Each variant has a defined schema decoded explicitly per consumer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    #[serde(rename = "transaction.initiated")]
    TransactionInitiated { snapshot: TransactionSnapshot },
    #[serde(rename = "transaction.completed")]
    TransactionCompleted { snapshot: TransactionSnapshot },
    #[serde(rename = "transaction.failed")]
    TransactionFailed {
        snapshot: TransactionSnapshot,
        reason: String,
    },
    #[serde(rename = "transaction.reversed")]
    TransactionReversed {
        original_id: TransactionId,
        reversal: TransactionSnapshot,
        reason: String,
    },
}

impl EventPayload {
    /// The event kind this payload announces.
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::TransactionInitiated { .. } => EventKind::TransactionInitiated,
            EventPayload::TransactionCompleted { .. } => EventKind::TransactionCompleted,
            EventPayload::TransactionFailed { .. } => EventKind::TransactionFailed,
            EventPayload::TransactionReversed { .. } => EventKind::TransactionReversed,
        }
    }
}

/// A domain event announcing a committed state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Unique event identifier (transport-level dedup key).
    pub id: EventId,
    /// Events with the same key route to the same ordered stream.
    pub partition_key: String,
    /// Typed payload.
    pub payload: EventPayload,
    /// When the event was emitted.
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    /// Create a new event for a transaction, keyed per partitioning policy:
    /// source account when present, destination account otherwise,
    /// transaction id as a last resort.
    pub fn for_transaction(tx: &Transaction, payload: EventPayload) -> Self {
        let partition_key = tx
            .source_account
            .as_ref()
            .or(tx.destination_account.as_ref())
            .map(|a| a.to_string())
            .unwrap_or_else(|| tx.id.to_string());

        Self {
            id: EventId::new(),
            partition_key,
            payload,
            occurred_at: Utc::now(),
        }
    }

    /// The event kind.
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Currency, TransactionKind};

    fn create_test_transaction() -> Transaction {
        Transaction::new(
            TransactionKind::Transfer,
            Some(AccountId::new("ACC-A")),
            Some(AccountId::new("ACC-B")),
            Money::new(Decimal::from(50), Currency::usd()),
            "Test transfer",
        )
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            EventKind::TransactionInitiated.as_str(),
            "transaction.initiated"
        );
        assert_eq!(
            EventKind::TransactionReversed.as_str(),
            "transaction.reversed"
        );
    }

    #[test]
    fn test_partition_key_prefers_source_account() {
        let tx = create_test_transaction();
        let event = DomainEvent::for_transaction(
            &tx,
            EventPayload::TransactionInitiated {
                snapshot: TransactionSnapshot::capture(&tx),
            },
        );
        assert_eq!(event.partition_key, "ACC-A");
        assert_eq!(event.kind(), EventKind::TransactionInitiated);
    }

    #[test]
    fn test_partition_key_for_deposit_uses_destination() {
        let tx = Transaction::new(
            TransactionKind::Deposit,
            None,
            Some(AccountId::new("ACC-B")),
            Money::new(Decimal::from(10), Currency::usd()),
            "Cash deposit",
        );
        let event = DomainEvent::for_transaction(
            &tx,
            EventPayload::TransactionInitiated {
                snapshot: TransactionSnapshot::capture(&tx),
            },
        );
        assert_eq!(event.partition_key, "ACC-B");
    }

    #[test]
    fn test_payload_round_trips_with_tag() {
        let tx = create_test_transaction();
        let payload = EventPayload::TransactionFailed {
            snapshot: TransactionSnapshot::capture(&tx),
            reason: "insufficient funds".to_string(),
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"event_type\":\"transaction.failed\""));

        let decoded: EventPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.kind(), EventKind::TransactionFailed);
    }
}
