//! Event publisher with bounded retry and observable failure.

use std::sync::Arc;

use tokio::sync::oneshot;
use tracing::{error, info, instrument, warn};

use corebank_common::{CoreBankError, DomainEvent, Result};

use crate::config::PublisherConfig;
use crate::log::EventTransport;

/// Publishes committed domain events to the transport.
///
/// The publisher is invoked only after the state a payload describes is
/// durably committed (coordinator responsibility). Its own obligations:
/// retry transient transport failures within a bounded window, never
/// reorder same-key events, and never lose a message silently — an
/// exhausted retry budget is alerted and surfaced as an error.
#[derive(Clone)]
pub struct EventPublisher {
    transport: Arc<dyn EventTransport>,
    config: PublisherConfig,
}

impl EventPublisher {
    /// Create a new publisher over a transport.
    pub fn new(transport: Arc<dyn EventTransport>, config: PublisherConfig) -> Self {
        Self { transport, config }
    }

    /// Publish one event, retrying up to the configured attempt budget.
    /// Returns the committed partition offset.
    #[instrument(skip(self, event), fields(event_id = %event.id, kind = %event.kind(), key = %event.partition_key))]
    pub async fn publish(&self, event: &DomainEvent) -> Result<u64> {
        let mut last_error: Option<CoreBankError> = None;

        for attempt in 1..=self.config.max_attempts {
            match tokio::time::timeout(self.config.attempt_timeout, self.transport.append(event))
                .await
            {
                Ok(Ok(offset)) => {
                    info!(
                        event_id = %event.id,
                        kind = %event.kind(),
                        key = %event.partition_key,
                        offset,
                        attempt,
                        "Event published"
                    );
                    return Ok(offset);
                }
                Ok(Err(e)) => {
                    warn!(
                        event_id = %event.id,
                        kind = %event.kind(),
                        attempt,
                        error = %e,
                        "Publish attempt failed"
                    );
                    last_error = Some(e);
                }
                Err(_) => {
                    warn!(
                        event_id = %event.id,
                        kind = %event.kind(),
                        attempt,
                        "Publish attempt timed out"
                    );
                    last_error = Some(CoreBankError::Timeout(format!(
                        "publish {}",
                        event.kind()
                    )));
                }
            }

            if attempt < self.config.max_attempts {
                tokio::time::sleep(self.config.retry_backoff).await;
            }
        }

        // Message loss is an operational incident, not a normal error.
        error!(
            event_id = %event.id,
            kind = %event.kind(),
            key = %event.partition_key,
            attempts = self.config.max_attempts,
            last_error = %last_error
                .as_ref()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
            "Event delivery failed after all attempts; manual intervention required"
        );

        Err(CoreBankError::PublishRetryExhausted {
            kind: event.kind().as_str().to_string(),
            key: event.partition_key.clone(),
            attempts: self.config.max_attempts,
        })
    }

    /// Publish as an explicit detached task. The returned channel resolves
    /// with the publish result; dropping it detaches without weakening the
    /// retry/alert contract, which runs in the task either way.
    pub fn publish_detached(&self, event: DomainEvent) -> oneshot::Receiver<Result<u64>> {
        let (tx, rx) = oneshot::channel();
        let publisher = self.clone();

        tokio::spawn(async move {
            let result = publisher.publish(&event).await;
            let _ = tx.send(result);
        });

        rx
    }
}
