//! Command-line interface for kafka-sync
//!
//! # Usage Examples
//!
//! ## Incremental Sync
//! ```bash
//! # Information records, resuming after the stored token
//! kafka-sync sync \
//!   --topic information \
//!   --source-uri mongodb://localhost:27017 \
//!   --source-database crawler \
//!   --brokers localhost:9092
//!
//! # Any collection mirrored as-is, keyed by an integer sequence
//! kafka-sync sync \
//!   --topic orders --data-kind raw --collection orders \
//!   --key-field seq --key-kind int64 --routing-field customer_id \
//!   --filter '{"status": "paid"}' \
//!   --source-database shop --acks none
//! ```
//!
//! ## Resume Tokens
//! ```bash
//! # Show the stored token for a topic and collection
//! kafka-sync cursor --topic information --collection raw_information_list
//! ```
//!
//! ## Exit Status
//! - `0`: every record was published
//! - `1`: the run stopped early (fatal error, halt policy, or cancellation)
//! - `2`: the run finished but skipped at least one record

use anyhow::Context;
use bson::Document;
use checkpoint::{CheckpointID, FilesystemStore, ResumeStore};
use clap::{Parser, Subcommand};
use kafka_sync::{
    CheckpointOpts, KafkaOpts, RecordFailurePolicy, SourceOpts, SyncConfig, SyncOrchestrator,
};
use kafka_sync_mongodb_source::{MongoPageSource, StreamConfig};
use kafka_sync_producer::KafkaPublisher;
use kafka_types::DataKind;
use mongodb_types::KeyKind;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "kafka-sync")]
#[command(about = "Incrementally publish MongoDB collection records to Kafka")]
#[command(long_about = None)]
struct Cli {
    /// Verbose logging; also waits for and logs every Kafka acknowledgment
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the records added since the last run
    Sync {
        /// Destination Kafka topic
        #[arg(long)]
        topic: String,

        /// Message profile: information, raw
        #[arg(long, default_value = "information")]
        data_kind: DataKind,

        /// Source collection (defaults to the data kind's collection)
        #[arg(long)]
        collection: Option<String>,

        /// Unique, ascending ordering key field
        #[arg(long, default_value = "_id")]
        key_field: String,

        /// Ordering key type: objectid, string, int64
        #[arg(long, default_value = "objectid")]
        key_kind: KeyKind,

        /// Source field used as the Kafka message key
        #[arg(long)]
        routing_field: Option<String>,

        /// Extra source filter as (extended) JSON
        #[arg(long, value_parser = kafka_sync::config::parse_filter)]
        filter: Option<Document>,

        /// Ignore the stored resume token and start from the beginning
        #[arg(long)]
        full_reprocess: bool,

        /// What to do with a record that fails to transform or publish
        #[arg(long, value_enum, default_value_t = RecordFailurePolicy::HoldCursor)]
        on_record_error: RecordFailurePolicy,

        #[command(flatten)]
        source_opts: SourceOpts,

        #[command(flatten)]
        kafka_opts: KafkaOpts,

        #[command(flatten)]
        checkpoint_opts: CheckpointOpts,
    },

    /// Show the stored resume token for a topic and collection
    Cursor {
        /// Destination Kafka topic
        #[arg(long)]
        topic: String,

        /// Source collection
        #[arg(long, default_value = "raw_information_list")]
        collection: String,

        #[command(flatten)]
        checkpoint_opts: CheckpointOpts,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match run().await {
        Ok(0) => Ok(()),
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(1);
        }
    }
}

async fn run() -> anyhow::Result<i32> {
    let cli = Cli::parse();

    // Initialize tracing; RUST_LOG wins over --debug
    let filter = if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        EnvFilter::from_default_env()
    } else if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Sync {
            topic,
            data_kind,
            collection,
            key_field,
            key_kind,
            routing_field,
            filter,
            full_reprocess,
            on_record_error,
            source_opts,
            kafka_opts,
            checkpoint_opts,
        } => {
            let collection = collection
                .or_else(|| data_kind.default_collection().map(str::to_string))
                .with_context(|| {
                    format!("--collection is required for the '{data_kind}' data kind")
                })?;
            let checkpoint = CheckpointID::new(topic.as_str(), collection.as_str())
                .context("Invalid topic or collection name")?;

            let stream = StreamConfig {
                collection: collection.clone(),
                key_field: key_field.clone(),
                key_kind,
                page_size: source_opts.page_size,
                filter: filter.unwrap_or_default(),
                fetch_retries: source_opts.page_retries,
                retry_backoff: source_opts.page_retry_backoff,
            };
            let config = SyncConfig {
                checkpoint,
                stream,
                full_reprocess,
                policy: on_record_error,
                routing_field,
                shutdown_timeout: kafka_opts.shutdown_timeout,
            };

            // Fail on bad settings before touching either side
            config
                .stream
                .validate()
                .context("Invalid source configuration")?;
            let producer_config = kafka_opts.producer_config(cli.debug);
            producer_config
                .validate()
                .context("Invalid Kafka configuration")?;

            let mongo_opts = kafka_sync_mongodb_source::SourceOpts::from(&source_opts);
            let source = MongoPageSource::connect(&mongo_opts, &collection)
                .await
                .context("Failed to connect to MongoDB")?;
            let publisher = KafkaPublisher::new(&producer_config, &topic)
                .context("Failed to create Kafka producer")?;
            let store = FilesystemStore::new(&checkpoint_opts.checkpoint_dir);
            let codec = data_kind.codec(&topic, &key_field);

            let cancel = CancellationToken::new();
            let signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("Interrupt received, stopping after the current record");
                    signal.cancel();
                }
            });

            let report = SyncOrchestrator::new(&store, publisher, codec, config)
                .run(source, cancel)
                .await;
            Ok(report.exit_code())
        }
        Commands::Cursor {
            topic,
            collection,
            checkpoint_opts,
        } => {
            let id = CheckpointID::new(topic, collection)
                .context("Invalid topic or collection name")?;
            let store = FilesystemStore::new(&checkpoint_opts.checkpoint_dir);
            match store.load(&id).await? {
                Some(token) => println!("{token}"),
                None => println!(
                    "No resume token stored for {id} in {}",
                    store.token_path(&id).display()
                ),
            }
            Ok(0)
        }
    }
}
