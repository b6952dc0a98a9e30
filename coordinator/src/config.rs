//! Coordinator configuration.

use std::time::Duration;

use corebank_common::time::constants;
use corebank_events::{ConsumerConfig, PublisherConfig};

/// Main coordinator configuration. Constructed once at startup and passed
/// explicitly to each component; nothing reads ambient global state.
#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    /// Timeout per account collaborator call (debit/credit/balance check).
    pub account_call_timeout: Duration,
    /// Timeout per transaction/ledger store operation.
    pub store_call_timeout: Duration,
    /// Interval between outbox drain passes.
    pub outbox_drain_interval: Duration,
    /// Publisher configuration.
    pub publisher: PublisherConfig,
    /// Consumer runtime configuration.
    pub consumer: ConsumerConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            account_call_timeout: constants::account_call_timeout(),
            store_call_timeout: constants::store_call_timeout(),
            outbox_drain_interval: constants::outbox_drain_interval(),
            publisher: PublisherConfig::default(),
            consumer: ConsumerConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(timeout) = env_millis("COREBANK_ACCOUNT_TIMEOUT_MS") {
            config.account_call_timeout = timeout;
        }

        if let Some(timeout) = env_millis("COREBANK_STORE_TIMEOUT_MS") {
            config.store_call_timeout = timeout;
        }

        if let Some(interval) = env_millis("COREBANK_OUTBOX_DRAIN_INTERVAL_MS") {
            config.outbox_drain_interval = interval;
        }

        if let Ok(attempts) = std::env::var("COREBANK_PUBLISH_MAX_ATTEMPTS") {
            if let Ok(attempts) = attempts.parse() {
                config.publisher.max_attempts = attempts;
            }
        }

        config
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.account_call_timeout.is_zero() {
            return Err("Account call timeout cannot be zero".to_string());
        }

        if self.store_call_timeout.is_zero() {
            return Err("Store call timeout cannot be zero".to_string());
        }

        self.publisher.validate()?;
        self.consumer.validate()?;

        Ok(())
    }
}

fn env_millis(var: &str) -> Option<Duration> {
    std::env::var(var)
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_millis)
}
