//! CoreBank Event Pipeline
//!
//! Durable, ordered, at-least-once delivery of domain events. The publisher
//! retries within a bounded window and never drops silently; the transport
//! deduplicates on event id so a retried append commits once; consumers
//! acknowledge manually and are obliged to process idempotently.

pub mod config;
pub mod consumer;
pub mod log;
pub mod publisher;

pub use config::{ConsumerConfig, PublisherConfig};
pub use consumer::{EventConsumer, EventHandler, ProcessedSet};
pub use log::{Delivery, EventTransport, InMemoryEventLog};
pub use publisher::EventPublisher;
