//! Time utilities and timeout constants for CoreBank.

use chrono::{DateTime, Duration, Utc};

/// Default per-concern timeouts. Every outbound call carries one of these,
/// independently overridable through configuration.
pub mod constants {
    use std::time::Duration;

    /// Timeout for a single account store call (debit/credit/balance check).
    pub fn account_call_timeout() -> Duration {
        Duration::from_secs(2)
    }

    /// Timeout for a single transaction/ledger store write.
    pub fn store_call_timeout() -> Duration {
        Duration::from_secs(2)
    }

    /// Timeout for one publish attempt to the event transport.
    pub fn publish_attempt_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// Backoff between publish attempts.
    pub fn publish_retry_backoff() -> Duration {
        Duration::from_millis(50)
    }

    /// Interval between outbox drain passes.
    pub fn outbox_drain_interval() -> Duration {
        Duration::from_millis(100)
    }
}

/// A timestamp with timezone (always UTC for CoreBank).
pub type Timestamp = DateTime<Utc>;

/// Get the current timestamp.
pub fn now() -> Timestamp {
    Utc::now()
}

/// Check if a timestamp has expired (is in the past).
pub fn is_expired(expiry: Timestamp) -> bool {
    now() > expiry
}

/// Calculate expiry time from now.
pub fn expires_in(duration: Duration) -> Timestamp {
    now() + duration
}

/// Deadline for an outbound call.
#[derive(Debug, Clone)]
pub struct Deadline {
    /// Deadline for the operation.
    pub at: Timestamp,
    /// Operation description for timeout errors.
    pub operation: String,
}

impl Deadline {
    /// Create a new deadline.
    pub fn new(duration: std::time::Duration, operation: impl Into<String>) -> Self {
        Self {
            at: expires_in(Duration::from_std(duration).unwrap_or_else(|_| Duration::zero())),
            operation: operation.into(),
        }
    }

    /// Check if the deadline has been exceeded.
    pub fn is_exceeded(&self) -> bool {
        is_expired(self.at)
    }

    /// Get remaining time as std::time::Duration.
    pub fn remaining(&self) -> std::time::Duration {
        let remaining = self.at - now();
        if remaining < Duration::zero() {
            std::time::Duration::ZERO
        } else {
            remaining.to_std().unwrap_or(std::time::Duration::ZERO)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_expired() {
        let past = now() - Duration::seconds(10);
        assert!(is_expired(past));

        let future = now() + Duration::seconds(10);
        assert!(!is_expired(future));
    }

    #[test]
    fn test_deadline() {
        let deadline = Deadline::new(std::time::Duration::from_secs(10), "debit");
        assert!(!deadline.is_exceeded());
        assert!(deadline.remaining() > std::time::Duration::ZERO);
    }
}
