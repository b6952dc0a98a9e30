//! Event pipeline configuration.

use std::time::Duration;

use corebank_common::time::constants;

/// Publisher configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Maximum append attempts before the failure is surfaced.
    pub max_attempts: u32,
    /// Timeout for a single append attempt.
    pub attempt_timeout: Duration,
    /// Backoff between attempts.
    pub retry_backoff: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            attempt_timeout: constants::publish_attempt_timeout(),
            retry_backoff: constants::publish_retry_backoff(),
        }
    }
}

impl PublisherConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("Publisher must attempt at least once".to_string());
        }
        if self.attempt_timeout.is_zero() {
            return Err("Publish attempt timeout cannot be zero".to_string());
        }
        Ok(())
    }
}

/// Consumer runtime configuration.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Deliveries of one event to one group before dead-lettering.
    pub max_deliveries: u32,
    /// Pause between polls when the log is idle.
    pub poll_interval: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_deliveries: 5,
            poll_interval: Duration::from_millis(50),
        }
    }
}

impl ConsumerConfig {
    /// Validate configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_deliveries == 0 {
            return Err("Consumers must accept at least one delivery".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PublisherConfig::default().validate().is_ok());
        assert!(ConsumerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_publisher_config() {
        let config = PublisherConfig {
            max_attempts: 0,
            ..PublisherConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
