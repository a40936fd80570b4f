//! rdkafka-backed publisher.

use async_trait::async_trait;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use kafka_types::EncodedMessage;
use rdkafka::error::KafkaError;
use rdkafka::producer::{DeliveryFuture, FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use std::time::Duration;

use crate::config::ProducerConfig;
use crate::error::PublishError;
use crate::{Delivery, MessagePublisher};

/// Pause before retrying a send when the local queue is full and nothing is
/// pending on our side.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(100);

/// Publishes to one topic through a single rdkafka producer.
///
/// When the acknowledgment policy waits, every `send` resolves to the
/// broker-assigned placement. Otherwise messages are enqueued and their
/// delivery reports are collected in the background; a failure among them
/// is returned by the next `send` or `flush`.
pub struct KafkaPublisher {
    producer: Option<FutureProducer>,
    topic: String,
    wait_for_ack: bool,
    log_deliveries: bool,
    queue_timeout: Duration,
    pending: FuturesUnordered<DeliveryFuture>,
    deferred: Option<PublishError>,
}

impl KafkaPublisher {
    /// Create the producer. No broker connection is required until the
    /// first message is sent.
    pub fn new(config: &ProducerConfig, topic: &str) -> Result<Self, PublishError> {
        config.validate()?;
        let producer: FutureProducer = config.client_config().create()?;

        tracing::info!(
            "Kafka producer created for topic '{}' (brokers: {}, acks: {}, compression: {})",
            topic,
            config.brokers.join(","),
            config.acks,
            config.compression
        );

        Ok(Self {
            producer: Some(producer),
            topic: topic.to_string(),
            wait_for_ack: config.waits_for_ack(),
            log_deliveries: config.debug,
            queue_timeout: config.message_timeout,
            pending: FuturesUnordered::new(),
            deferred: None,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Messages enqueued whose delivery report has not been collected.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Collect delivery reports that are already available.
    fn reap_ready(&mut self) {
        while let Some(Some(report)) = self.pending.next().now_or_never() {
            record_report(report, &mut self.deferred);
        }
    }

    fn take_deferred(&mut self) -> Result<(), PublishError> {
        match self.deferred.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_and_wait(&mut self, message: &EncodedMessage) -> Result<Delivery, PublishError> {
        let producer = self.producer.as_ref().ok_or(PublishError::Closed)?;
        let record = build_record(&self.topic, message);

        let (partition, offset) = producer
            .send(record, self.queue_timeout)
            .await
            .map_err(|(err, _)| PublishError::Kafka(err))?;

        if self.log_deliveries {
            tracing::debug!(
                "Delivered message (key: {:?}) to {} partition {} offset {}",
                message.key,
                self.topic,
                partition,
                offset
            );
        }
        Ok(Delivery::Placed { partition, offset })
    }

    async fn enqueue(&mut self, message: &EncodedMessage) -> Result<Delivery, PublishError> {
        let producer = self.producer.as_ref().ok_or(PublishError::Closed)?;
        let mut record = build_record(&self.topic, message);

        loop {
            match producer.send_result(record) {
                Ok(delivery) => {
                    self.pending.push(delivery);
                    return Ok(Delivery::Enqueued);
                }
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned)) => {
                    record = returned;
                    tracing::trace!("Producer queue full, waiting for a delivery report");
                    match self.pending.next().await {
                        Some(report) => record_report(report, &mut self.deferred),
                        None => tokio::time::sleep(QUEUE_FULL_BACKOFF).await,
                    }
                }
                Err((err, _)) => return Err(PublishError::Kafka(err)),
            }
        }
    }
}

fn build_record<'a>(topic: &'a str, message: &'a EncodedMessage) -> FutureRecord<'a, str, Vec<u8>> {
    let record = FutureRecord::to(topic).payload(&message.payload);
    match &message.key {
        Some(key) => record.key(key.as_str()),
        None => record,
    }
}

/// Keep the first failure among collected delivery reports.
fn record_report(
    report: <DeliveryFuture as std::future::Future>::Output,
    deferred: &mut Option<PublishError>,
) {
    let failure = match report {
        Ok(Ok(_)) => return,
        Ok(Err((err, _))) => PublishError::Deferred(err),
        Err(_canceled) => PublishError::Canceled,
    };
    tracing::error!("Background delivery failed: {}", failure);
    if deferred.is_none() {
        *deferred = Some(failure);
    }
}

#[async_trait]
impl MessagePublisher for KafkaPublisher {
    async fn send(&mut self, message: &EncodedMessage) -> Result<Delivery, PublishError> {
        self.reap_ready();
        self.take_deferred()?;

        if self.wait_for_ack {
            self.send_and_wait(message).await
        } else {
            self.enqueue(message).await
        }
    }

    async fn flush(&mut self, timeout: Duration) -> Result<(), PublishError> {
        let total = self.pending.len();
        let pending = &mut self.pending;
        let deferred = &mut self.deferred;
        let drained = tokio::time::timeout(timeout, async {
            while let Some(report) = pending.next().await {
                record_report(report, deferred);
            }
        })
        .await;

        if drained.is_err() {
            return Err(PublishError::FlushTimeout {
                pending: self.pending.len(),
                timeout,
            });
        }
        if total > 0 {
            tracing::debug!("Flushed {} pending message(s) to {}", total, self.topic);
        }
        self.take_deferred()
    }

    async fn shutdown(&mut self, timeout: Duration) -> Result<(), PublishError> {
        let flushed = self.flush(timeout).await;

        if let Some(producer) = self.producer.take() {
            let drained = tokio::task::spawn_blocking(move || producer.flush(timeout)).await;
            match drained {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("Kafka producer flush on shutdown failed: {}", e),
                Err(e) => tracing::warn!("Kafka producer shutdown task failed: {}", e),
            }
            tracing::info!("Kafka producer for topic '{}' closed", self.topic);
        }

        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Acks;

    fn unreachable_config() -> ProducerConfig {
        ProducerConfig {
            acks: Acks::None,
            message_timeout: Duration::from_millis(200),
            ..ProducerConfig::new(vec!["127.0.0.1:1".to_string()])
        }
    }

    fn message(n: u32) -> EncodedMessage {
        EncodedMessage {
            payload: format!(r#"{{"id":"{n}"}}"#).into_bytes(),
            key: Some(n.to_string()),
        }
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let config = ProducerConfig::new(vec![]);
        assert!(matches!(
            KafkaPublisher::new(&config, "t"),
            Err(PublishError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_no_wait_failure_surfaces_on_flush() {
        let mut publisher = KafkaPublisher::new(&unreachable_config(), "t").unwrap();

        for n in 0..3 {
            assert_eq!(publisher.send(&message(n)).await.unwrap(), Delivery::Enqueued);
        }
        assert_eq!(publisher.pending(), 3);

        let err = publisher.flush(Duration::from_secs(20)).await.unwrap_err();
        assert!(matches!(err, PublishError::Deferred(_)));
        assert!(!err.is_record_scoped());
        assert_eq!(publisher.pending(), 0);
    }

    #[tokio::test]
    async fn test_send_after_shutdown_fails() {
        let mut publisher = KafkaPublisher::new(&unreachable_config(), "t").unwrap();
        publisher.shutdown(Duration::from_millis(100)).await.unwrap();

        assert!(matches!(
            publisher.send(&message(1)).await,
            Err(PublishError::Closed)
        ));
    }
}
