//! Kafka publisher for kafka-sync.
//!
//! [`KafkaPublisher`] owns one rdkafka producer for the lifetime of a run and
//! publishes [`EncodedMessage`]s to a single topic under the acknowledgment
//! policy in [`ProducerConfig`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use kafka_sync_producer::{KafkaPublisher, MessagePublisher, ProducerConfig};
//! use kafka_types::EncodedMessage;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), kafka_sync_producer::PublishError> {
//! let config = ProducerConfig::new(vec!["localhost:9092".to_string()]);
//! let mut publisher = KafkaPublisher::new(&config, "information-topic")?;
//!
//! let message = EncodedMessage { payload: br#"{"id":"1"}"#.to_vec(), key: None };
//! publisher.send(&message).await?;
//! publisher.shutdown(Duration::from_secs(30)).await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use kafka_types::EncodedMessage;
use std::time::Duration;

mod config;
mod error;
mod publisher;

pub use config::{Acks, Compression, ConfigError, ProducerConfig};
pub use error::PublishError;
pub use publisher::KafkaPublisher;
pub use rdkafka::error::KafkaError;
pub use rdkafka::types::RDKafkaErrorCode;

/// Where a message ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Acknowledged by the broker at this placement
    Placed { partition: i32, offset: i64 },
    /// Handed to the client without waiting; confirmed by the next `flush`
    Enqueued,
}

/// Sends encoded messages to one destination.
#[async_trait]
pub trait MessagePublisher: Send {
    /// Publish one message.
    ///
    /// An error reported here may belong to an earlier enqueued message
    /// whose delivery failed in the background.
    async fn send(&mut self, message: &EncodedMessage) -> Result<Delivery, PublishError>;

    /// Wait until every message sent so far is acknowledged or failed.
    async fn flush(&mut self, timeout: Duration) -> Result<(), PublishError>;

    /// Flush, then release the client. Later sends fail.
    async fn shutdown(&mut self, timeout: Duration) -> Result<(), PublishError>;
}
