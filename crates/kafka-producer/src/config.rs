//! Producer configuration.

use rdkafka::ClientConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("At least one Kafka broker address is required")]
    NoBrokers,

    #[error("Unknown acknowledgment policy '{0}' (expected one of: none, leader, all)")]
    UnknownAcks(String),

    #[error("Unknown compression '{0}' (expected one of: none, gzip, snappy, lz4, zstd)")]
    UnknownCompression(String),

    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

/// How many replicas must confirm a message before it counts as sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Acks {
    /// Do not wait for the broker
    None,
    /// Partition leader only
    Leader,
    /// All in-sync replicas
    #[default]
    All,
}

impl Acks {
    /// librdkafka `acks` value.
    pub fn as_kafka_value(&self) -> &'static str {
        match self {
            Acks::None => "0",
            Acks::Leader => "1",
            Acks::All => "all",
        }
    }
}

impl fmt::Display for Acks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Acks::None => "none",
            Acks::Leader => "leader",
            Acks::All => "all",
        })
    }
}

impl FromStr for Acks {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "0" | "none" | "no-wait" => Ok(Acks::None),
            "1" | "leader" => Ok(Acks::Leader),
            "all" | "-1" => Ok(Acks::All),
            _ => Err(ConfigError::UnknownAcks(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Snappy,
    Lz4,
    Zstd,
}

impl Compression {
    pub fn as_str(&self) -> &'static str {
        match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Snappy => "snappy",
            Compression::Lz4 => "lz4",
            Compression::Zstd => "zstd",
        }
    }
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Compression {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(Compression::None),
            "gzip" => Ok(Compression::Gzip),
            "snappy" => Ok(Compression::Snappy),
            "lz4" => Ok(Compression::Lz4),
            "zstd" => Ok(Compression::Zstd),
            _ => Err(ConfigError::UnknownCompression(s.to_string())),
        }
    }
}

/// Broker publish settings (library type without clap)
#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub brokers: Vec<String>,
    pub compression: Compression,
    pub acks: Acks,
    /// Client-side retries for transient send failures
    pub retries: u32,
    /// Byte threshold at which a partition batch is sent
    pub batch_size: usize,
    /// Longest time a message waits for its batch to fill
    pub linger: Duration,
    /// Bound on how long one message may wait for acknowledgment
    pub message_timeout: Duration,
    /// Wait for and log every acknowledgment, whatever the policy
    pub debug: bool,
}

impl ProducerConfig {
    pub fn new(brokers: Vec<String>) -> Self {
        Self {
            brokers,
            compression: Compression::default(),
            acks: Acks::default(),
            retries: 3,
            batch_size: 16_384,
            linger: Duration::from_millis(5),
            message_timeout: Duration::from_secs(30),
            debug: false,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(ConfigError::NoBrokers);
        }
        if self.batch_size == 0 {
            return Err(ConfigError::Zero("batch size"));
        }
        if self.message_timeout.is_zero() {
            return Err(ConfigError::Zero("message timeout"));
        }
        Ok(())
    }

    /// Whether each send waits for its acknowledgment.
    pub fn waits_for_ack(&self) -> bool {
        self.debug || self.acks != Acks::None
    }

    /// rdkafka client settings for these options.
    ///
    /// One in-flight request per connection keeps retried messages in order
    /// within a partition.
    pub fn client_config(&self) -> ClientConfig {
        let brokers: Vec<&str> = self
            .brokers
            .iter()
            .map(|b| b.trim())
            .filter(|b| !b.is_empty())
            .collect();

        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", brokers.join(","))
            .set("compression.type", self.compression.as_str())
            .set("acks", self.acks.as_kafka_value())
            .set("retries", self.retries.to_string())
            .set("batch.size", self.batch_size.to_string())
            .set("linger.ms", self.linger.as_millis().to_string())
            .set(
                "message.timeout.ms",
                self.message_timeout.as_millis().to_string(),
            )
            .set("max.in.flight.requests.per.connection", "1");
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_config_mapping() {
        let config = ProducerConfig {
            compression: Compression::Lz4,
            acks: Acks::Leader,
            retries: 7,
            batch_size: 4096,
            linger: Duration::from_millis(20),
            message_timeout: Duration::from_secs(10),
            ..ProducerConfig::new(vec!["k1:9092".into(), " k2:9092 ".into(), "".into()])
        };
        let client = config.client_config();

        assert_eq!(client.get("bootstrap.servers"), Some("k1:9092,k2:9092"));
        assert_eq!(client.get("compression.type"), Some("lz4"));
        assert_eq!(client.get("acks"), Some("1"));
        assert_eq!(client.get("retries"), Some("7"));
        assert_eq!(client.get("batch.size"), Some("4096"));
        assert_eq!(client.get("linger.ms"), Some("20"));
        assert_eq!(client.get("message.timeout.ms"), Some("10000"));
        assert_eq!(
            client.get("max.in.flight.requests.per.connection"),
            Some("1")
        );
    }

    #[test]
    fn test_acks_parsing() {
        assert_eq!("none".parse::<Acks>(), Ok(Acks::None));
        assert_eq!("0".parse::<Acks>(), Ok(Acks::None));
        assert_eq!("Leader".parse::<Acks>(), Ok(Acks::Leader));
        assert_eq!("-1".parse::<Acks>(), Ok(Acks::All));
        assert_eq!(
            "two".parse::<Acks>(),
            Err(ConfigError::UnknownAcks("two".into()))
        );
    }

    #[test]
    fn test_compression_parsing() {
        assert_eq!("zstd".parse::<Compression>(), Ok(Compression::Zstd));
        assert!("brotli".parse::<Compression>().is_err());
    }

    #[test]
    fn test_waits_for_ack() {
        let mut config = ProducerConfig::new(vec!["k:9092".into()]);
        assert!(config.waits_for_ack());
        config.acks = Acks::None;
        assert!(!config.waits_for_ack());
        config.debug = true;
        assert!(config.waits_for_ack());
    }

    #[test]
    fn test_validate() {
        assert_eq!(
            ProducerConfig::new(vec![" ".into()]).validate(),
            Err(ConfigError::NoBrokers)
        );
        let config = ProducerConfig {
            batch_size: 0,
            ..ProducerConfig::new(vec!["k:9092".into()])
        };
        assert_eq!(config.validate(), Err(ConfigError::Zero("batch size")));
        assert!(ProducerConfig::new(vec!["k:9092".into()]).validate().is_ok());
    }
}
