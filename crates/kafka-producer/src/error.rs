use rdkafka::error::KafkaError;
use rdkafka::types::RDKafkaErrorCode;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),

    #[error("Broker rejected message: {0}")]
    Rejected(String),

    #[error("Background delivery failed: {0}")]
    Deferred(KafkaError),

    #[error("{pending} message(s) not acknowledged within {timeout:?}")]
    FlushTimeout { pending: usize, timeout: Duration },

    #[error("Delivery report was dropped before completion")]
    Canceled,

    #[error("Publisher has been shut down")]
    Closed,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl PublishError {
    /// Whether the failure concerns only the message that was sent.
    ///
    /// Message-specific rejections are; transport, timeout, queue and
    /// background delivery failures are not.
    pub fn is_record_scoped(&self) -> bool {
        match self {
            PublishError::Rejected(_) => true,
            PublishError::Kafka(e) => e.rdkafka_error_code().is_some_and(is_message_specific),
            _ => false,
        }
    }
}

fn is_message_specific(code: RDKafkaErrorCode) -> bool {
    matches!(
        code,
        RDKafkaErrorCode::MessageSizeTooLarge
            | RDKafkaErrorCode::InvalidMessage
            | RDKafkaErrorCode::InvalidMessageSize
            | RDKafkaErrorCode::InvalidRecord
            | RDKafkaErrorCode::InvalidTimestamp
            | RDKafkaErrorCode::BadMessage
    )
}
