//! kafka-sync library
//!
//! Incrementally publishes the records of a MongoDB collection to a Kafka
//! topic. Each run resumes after the key of the last record the previous
//! run published, streams the newer records in key order, converts them
//! into JSON messages and publishes them, then persists the new resume
//! token.
//!
//! # Crates
//!
//! - `checkpoint` - resume token storage
//! - `mongodb_types` - ordering-key codec and BSON coercion
//! - `kafka_sync_mongodb_source` - ordered, paged collection reads
//! - `kafka_types` - message model and encoding per data kind
//! - `kafka_sync_producer` - Kafka publisher
//!
//! # CLI Usage
//!
//! ```bash
//! # Publish information records added since the last run
//! kafka-sync sync --topic information \
//!   --source-uri mongodb://localhost:27017 --source-database crawler \
//!   --brokers localhost:9092
//!
//! # Republish everything, skipping bad records for good
//! kafka-sync sync --topic information --full-reprocess \
//!   --on-record-error skip-and-continue ...
//! ```

use clap::Parser;
use kafka_sync_producer::{Acks, Compression, ProducerConfig};
use std::path::PathBuf;
use std::time::Duration;

pub mod config;
pub mod sync;
pub mod testing;

pub use sync::{
    RecordFailurePolicy, RunOutcome, RunReport, Stage, SyncConfig, SyncError, SyncOrchestrator,
};

use config::parse_duration;

#[derive(Parser, Clone, Debug)]
pub struct SourceOpts {
    /// MongoDB connection string
    #[arg(
        long,
        default_value = "mongodb://localhost:27017",
        env = "MONGODB_URI"
    )]
    pub source_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DATABASE")]
    pub source_database: Option<String>,

    /// Records fetched per page
    #[arg(long, default_value = "1000")]
    pub page_size: usize,

    /// Retries for a page fetch that fails transiently
    #[arg(long, default_value = "3")]
    pub page_retries: u32,

    /// Base delay between page fetch retries (e.g. "500ms", "2s")
    #[arg(long, default_value = "500ms", value_parser = parse_duration)]
    pub page_retry_backoff: Duration,

    /// Server-side time limit for one page query
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub read_timeout: Duration,
}

// CLI type → MongoDB source library type conversions
impl From<&SourceOpts> for kafka_sync_mongodb_source::SourceOpts {
    fn from(opts: &SourceOpts) -> Self {
        Self {
            source_uri: opts.source_uri.clone(),
            source_database: opts.source_database.clone(),
            read_timeout: Some(opts.read_timeout),
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct KafkaOpts {
    /// Kafka broker addresses (comma separated)
    #[arg(
        long,
        default_value = "localhost:9092",
        env = "KAFKA_BROKERS",
        value_delimiter = ','
    )]
    pub brokers: Vec<String>,

    /// Compression codec: none, gzip, snappy, lz4, zstd
    #[arg(long, default_value = "none")]
    pub compression: Compression,

    /// Acknowledgment policy: none (do not wait), leader, all
    #[arg(long, default_value = "all")]
    pub acks: Acks,

    /// Client retries for transient send failures
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Batch size threshold in bytes
    #[arg(long, default_value = "16384")]
    pub batch_size: usize,

    /// Maximum time a message waits for its batch (e.g. "5ms")
    #[arg(long, default_value = "5ms", value_parser = parse_duration)]
    pub linger: Duration,

    /// Maximum time a message may wait for acknowledgment
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub message_timeout: Duration,

    /// Maximum time to flush and close the producer at the end of a run
    #[arg(long, default_value = "30s", value_parser = parse_duration)]
    pub shutdown_timeout: Duration,
}

impl KafkaOpts {
    /// Producer settings; `debug` waits for and logs every acknowledgment.
    pub fn producer_config(&self, debug: bool) -> ProducerConfig {
        ProducerConfig {
            brokers: self.brokers.clone(),
            compression: self.compression,
            acks: self.acks,
            retries: self.retries,
            batch_size: self.batch_size,
            linger: self.linger,
            message_timeout: self.message_timeout,
            debug,
        }
    }
}

#[derive(Parser, Clone, Debug)]
pub struct CheckpointOpts {
    /// Directory holding resume tokens, one file per topic and collection
    #[arg(
        long,
        default_value = ".kafka-sync-cursors",
        env = "KAFKA_SYNC_CHECKPOINT_DIR"
    )]
    pub checkpoint_dir: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        source: SourceOpts,
        #[command(flatten)]
        kafka: KafkaOpts,
    }

    #[test]
    fn test_kafka_opts_to_producer_config() {
        let cli = TestCli::parse_from([
            "test",
            "--source-database",
            "crawler",
            "--brokers",
            "k1:9092,k2:9092",
            "--acks",
            "leader",
            "--compression",
            "gzip",
            "--linger",
            "20ms",
        ]);

        let config = cli.kafka.producer_config(true);
        assert_eq!(config.brokers, vec!["k1:9092", "k2:9092"]);
        assert_eq!(config.acks, Acks::Leader);
        assert_eq!(config.compression, Compression::Gzip);
        assert_eq!(config.linger, Duration::from_millis(20));
        assert_eq!(config.message_timeout, Duration::from_secs(30));
        assert!(config.debug);

        let source = kafka_sync_mongodb_source::SourceOpts::from(&cli.source);
        assert_eq!(source.source_database.as_deref(), Some("crawler"));
        assert_eq!(source.read_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_rejects_unknown_acks() {
        let result = TestCli::try_parse_from(["test", "--acks", "some"]);
        assert!(result.is_err());
    }
}
