//! One incremental synchronization run.
//!
//! A run moves the records of one source collection that were added since
//! the previous run to one Kafka topic:
//!
//! 1. **Loading** - read the resume token for the (topic, collection) pair;
//!    a missing, corrupt or undecodable token means "start from the
//!    beginning".
//! 2. **Streaming** - pull records in ascending key order and, strictly one
//!    at a time, transform, encode and publish each. The in-memory cursor
//!    advances only after a record's publish succeeded.
//! 3. **Finalizing** - flush and release the publisher, then persist the
//!    cursor exactly once. This happens on every exit path, including
//!    aborts and cancellation.
//!
//! # Record failures
//!
//! A record that cannot be transformed, encoded, or that the broker rejects
//! for its content is handled according to [`RecordFailurePolicy`]. Any
//! skipped record makes the run finish with a non-zero exit code.
//!
//! # No-wait acknowledgment
//!
//! When the publisher does not wait for acknowledgments, cursor positions
//! reached through enqueued messages stay *pending* until the final flush
//! succeeds. If it fails, or the run stops on a publisher error, only the
//! last confirmed position is persisted and the unconfirmed records are
//! published again by the next run.

use bson::Bson;
use checkpoint::{load_resume_token, CheckpointID, ResumeStore, ResumeToken};
use kafka_sync_mongodb_source::{OrderedRecordStream, PageSource, Record, SourceError, StreamConfig};
use kafka_sync_producer::{Delivery, MessagePublisher, PublishError};
use kafka_types::{routing_key, MessageCodec};
use mongodb_types::bson_to_text;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Records between progress log lines.
const PROGRESS_INTERVAL: u64 = 10_000;

/// What to do with a record that fails to transform, encode or publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum RecordFailurePolicy {
    /// Skip it and keep publishing, but never move the cursor past it
    #[default]
    HoldCursor,
    /// Stop the run at the first failing record
    Halt,
    /// Skip it and move the cursor past it, accepting its loss
    SkipAndContinue,
}

impl fmt::Display for RecordFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RecordFailurePolicy::HoldCursor => "hold-cursor",
            RecordFailurePolicy::Halt => "halt",
            RecordFailurePolicy::SkipAndContinue => "skip-and-continue",
        })
    }
}

/// Per-record pipeline stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    Transform,
    Encode,
    Publish,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Transform => "transform",
            Stage::Encode => "encode",
            Stage::Publish => "publish",
        })
    }
}

/// Conditions that end a run early.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Reading source failed: {0}")]
    Source(#[from] SourceError),

    #[error("Record {key}: key cannot be used as a resume token: {reason}")]
    Key { key: String, reason: String },

    #[error("Record {key} failed at {stage}: {cause}")]
    Record {
        key: String,
        stage: Stage,
        cause: String,
    },

    #[error("Publishing record {key} failed: {source}")]
    Publish { key: String, source: PublishError },

    #[error("Flushing publisher failed: {0}")]
    Flush(PublishError),

    #[error("Persisting resume token failed: {0:#}")]
    Persist(anyhow::Error),

    #[error("Run cancelled")]
    Cancelled,
}

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every record was published
    Completed,
    /// The source was exhausted but some records were skipped
    CompletedWithSkips,
    /// Stopped at a failing record under [`RecordFailurePolicy::Halt`]
    Halted,
    /// Stopped by a fatal error
    Aborted,
    /// Stopped by an external signal
    Cancelled,
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Completed => 0,
            RunOutcome::CompletedWithSkips => 2,
            RunOutcome::Halted | RunOutcome::Aborted | RunOutcome::Cancelled => 1,
        }
    }

    fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Completed | RunOutcome::CompletedWithSkips)
    }
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunOutcome::Completed => "completed",
            RunOutcome::CompletedWithSkips => "completed with skipped records",
            RunOutcome::Halted => "halted",
            RunOutcome::Aborted => "aborted",
            RunOutcome::Cancelled => "cancelled",
        })
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub checkpoint: CheckpointID,
    pub outcome: RunOutcome,
    /// Token the run resumed after
    pub start_token: Option<ResumeToken>,
    /// Token held at the end of the run
    pub final_token: Option<ResumeToken>,
    /// Whether `final_token` was written to the store
    pub persisted: bool,
    pub processed: u64,
    pub published: u64,
    pub skipped: u64,
    pub pages_fetched: u64,
    pub first_error: Option<String>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        self.outcome.exit_code()
    }

    pub fn log_summary(&self) {
        let token = |t: &Option<ResumeToken>| {
            t.as_ref()
                .map_or_else(|| "<none>".to_string(), |t| t.to_string())
        };
        let secs = self.elapsed.as_secs_f64();
        let rate = if secs > 0.0 {
            self.published as f64 / secs
        } else {
            0.0
        };
        let summary = format!(
            "Sync {} {}: processed {}, published {}, skipped {}, pages {}, token {} -> {} (persisted: {}) in {:?} ({:.2} msg/sec)",
            self.checkpoint,
            self.outcome,
            self.processed,
            self.published,
            self.skipped,
            self.pages_fetched,
            token(&self.start_token),
            token(&self.final_token),
            self.persisted,
            self.elapsed,
            rate
        );
        match (&self.first_error, self.outcome) {
            (_, RunOutcome::Completed) => tracing::info!("{summary}"),
            (Some(e), _) => tracing::warn!("{summary}; first error: {e}"),
            (None, _) => tracing::warn!("{summary}"),
        }
    }
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub checkpoint: CheckpointID,
    pub stream: StreamConfig,
    /// Ignore the stored token and start from the beginning
    pub full_reprocess: bool,
    pub policy: RecordFailurePolicy,
    /// Source field whose value becomes the message key
    pub routing_field: Option<String>,
    /// Bound on flushing and closing the publisher
    pub shutdown_timeout: Duration,
}

/// Mutable state of one run. Only the orchestrator writes it.
#[derive(Debug, Default)]
struct RunState {
    loaded: Option<ResumeToken>,
    /// Last position whose publish is acknowledged
    confirmed: Option<ResumeToken>,
    /// Last position reached through enqueued, unacknowledged messages
    pending: Option<ResumeToken>,
    /// Set at the first failure under the hold-cursor policy
    held: bool,
    processed: u64,
    published: u64,
    skipped: u64,
    pages_fetched: u64,
    first_error: Option<String>,
}

impl RunState {
    fn new(loaded: Option<ResumeToken>) -> Self {
        Self {
            confirmed: loaded.clone(),
            loaded,
            ..Self::default()
        }
    }

    /// Move the cursor to `token`.
    ///
    /// Stays pending while anything before it awaits acknowledgment.
    fn advance(&mut self, token: ResumeToken, unconfirmed: bool) {
        if self.held {
            return;
        }
        if unconfirmed || self.pending.is_some() {
            self.pending = Some(token);
        } else {
            self.confirmed = Some(token);
        }
    }

    fn confirm_pending(&mut self) {
        if let Some(token) = self.pending.take() {
            self.confirmed = Some(token);
        }
    }

    fn note_error(&mut self, error: impl fmt::Display) {
        if self.first_error.is_none() {
            self.first_error = Some(error.to_string());
        }
    }
}

/// Outcome of handing one record through the pipeline.
enum RecordFailure {
    /// Concerns this record only; subject to the failure policy
    Scoped { stage: Stage, cause: String },
    Fatal(SyncError),
}

/// Drives one run: load token, stream, transform, encode, publish, persist.
pub struct SyncOrchestrator<'a, R: ?Sized, P> {
    store: &'a R,
    publisher: P,
    codec: Box<dyn MessageCodec>,
    config: SyncConfig,
}

impl<'a, R, P> SyncOrchestrator<'a, R, P>
where
    R: ResumeStore + ?Sized,
    P: MessagePublisher,
{
    pub fn new(
        store: &'a R,
        publisher: P,
        codec: Box<dyn MessageCodec>,
        config: SyncConfig,
    ) -> Self {
        Self {
            store,
            publisher,
            codec,
            config,
        }
    }

    /// Execute the run to completion.
    ///
    /// Never returns early: whatever happens while streaming, the publisher
    /// is released and the cursor persisted before the report is returned.
    pub async fn run<S: PageSource>(mut self, source: S, cancel: CancellationToken) -> RunReport {
        let started = Instant::now();
        tracing::info!(
            "Starting sync {} ({} profile, policy {})",
            self.config.checkpoint,
            self.codec.data_kind(),
            self.config.policy
        );

        let (mut state, resume_key) = self.load().await;
        let result = self
            .stream_records(source, resume_key, &mut state, &cancel)
            .await;
        self.finalize(state, result, started).await
    }

    async fn load(&self) -> (RunState, Option<Bson>) {
        let loaded =
            load_resume_token(self.store, &self.config.checkpoint, self.config.full_reprocess)
                .await;

        let Some(token) = loaded else {
            return (RunState::new(None), None);
        };
        match self.config.stream.key_kind.key_from_token(token.as_str()) {
            Ok(key) => (RunState::new(Some(token)), Some(key)),
            Err(e) => {
                tracing::warn!(
                    "Stored resume token for {} cannot be decoded, starting from the beginning: {}",
                    self.config.checkpoint,
                    e
                );
                (RunState::new(None), None)
            }
        }
    }

    async fn stream_records<S: PageSource>(
        &mut self,
        source: S,
        resume_key: Option<Bson>,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<(), SyncError> {
        let mut stream = OrderedRecordStream::new(source, self.config.stream.clone(), resume_key)?;

        loop {
            // Checked between records; an in-flight publish always completes.
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                next = stream.next_record() => next,
            };
            state.pages_fetched = stream.pages_fetched();
            let Some(record) = next? else {
                return Ok(());
            };

            state.processed += 1;
            let key = key_text(&record);
            let token = self.resume_token(&record, &key)?;

            match self.publish_record(&record, &key).await {
                Ok(delivery) => {
                    state.published += 1;
                    tracing::trace!("Published record {}: {:?}", key, delivery);
                    state.advance(token, delivery == Delivery::Enqueued);
                }
                Err(RecordFailure::Fatal(e)) => return Err(e),
                Err(RecordFailure::Scoped { stage, cause }) => {
                    state.skipped += 1;
                    tracing::warn!(
                        "Record {} failed at {} stage in {}: {}",
                        key,
                        stage,
                        self.config.checkpoint,
                        cause
                    );
                    let failure = SyncError::Record { key, stage, cause };
                    match self.config.policy {
                        RecordFailurePolicy::Halt => return Err(failure),
                        RecordFailurePolicy::HoldCursor => {
                            if !state.held {
                                tracing::warn!(
                                    "Holding resume cursor at {} for {}; later records are still published",
                                    state
                                        .pending
                                        .as_ref()
                                        .or(state.confirmed.as_ref())
                                        .map_or("<start>", |t| t.as_str()),
                                    self.config.checkpoint
                                );
                                state.held = true;
                            }
                            state.note_error(failure);
                        }
                        RecordFailurePolicy::SkipAndContinue => {
                            state.note_error(failure);
                            state.advance(token, false);
                        }
                    }
                }
            }

            if state.processed % PROGRESS_INTERVAL == 0 {
                tracing::info!(
                    "Sync {} progress: processed {}, published {}, skipped {}",
                    self.config.checkpoint,
                    state.processed,
                    state.published,
                    state.skipped
                );
            }
        }
    }

    fn resume_token(&self, record: &Record, key: &str) -> Result<ResumeToken, SyncError> {
        let text = self
            .config
            .stream
            .key_kind
            .token_from_key(&record.key)
            .map_err(|e| SyncError::Key {
                key: key.to_string(),
                reason: e.to_string(),
            })?;
        ResumeToken::new(text).map_err(|e| SyncError::Key {
            key: key.to_string(),
            reason: e.to_string(),
        })
    }

    async fn publish_record(
        &mut self,
        record: &Record,
        key: &str,
    ) -> Result<Delivery, RecordFailure> {
        let message = self
            .codec
            .transform(&record.document)
            .map_err(|e| RecordFailure::Scoped {
                stage: Stage::Transform,
                cause: e.to_string(),
            })?;

        let routing = self
            .config
            .routing_field
            .as_deref()
            .and_then(|field| routing_key(&record.document, field));
        let encoded = self
            .codec
            .encode(&message, routing)
            .map_err(|e| RecordFailure::Scoped {
                stage: Stage::Encode,
                cause: e.to_string(),
            })?;

        match self.publisher.send(&encoded).await {
            Ok(delivery) => Ok(delivery),
            Err(e) if e.is_record_scoped() => Err(RecordFailure::Scoped {
                stage: Stage::Publish,
                cause: e.to_string(),
            }),
            Err(e) => Err(RecordFailure::Fatal(SyncError::Publish {
                key: key.to_string(),
                source: e,
            })),
        }
    }

    async fn finalize(
        mut self,
        mut state: RunState,
        result: Result<(), SyncError>,
        started: Instant,
    ) -> RunReport {
        let mut outcome = match &result {
            Ok(()) if state.skipped == 0 => RunOutcome::Completed,
            Ok(()) => RunOutcome::CompletedWithSkips,
            Err(SyncError::Cancelled) => RunOutcome::Cancelled,
            Err(SyncError::Record { .. }) => RunOutcome::Halted,
            Err(_) => RunOutcome::Aborted,
        };
        // A publisher failure may report any enqueued message, so nothing
        // sent without acknowledgment counts as delivered.
        if matches!(result, Err(SyncError::Publish { .. })) {
            if let Some(unconfirmed) = state.pending.take() {
                tracing::warn!(
                    "Discarding unconfirmed position {} for {} after a publisher failure",
                    unconfirmed,
                    self.config.checkpoint
                );
            }
        }
        if let Err(e) = result {
            match outcome {
                RunOutcome::Cancelled => {
                    tracing::warn!("Sync {} cancelled, finalizing", self.config.checkpoint)
                }
                _ => tracing::error!("Sync {} stopping: {}", self.config.checkpoint, e),
            }
            state.note_error(e);
        }

        match self.publisher.shutdown(self.config.shutdown_timeout).await {
            Ok(()) => state.confirm_pending(),
            Err(e) => {
                tracing::error!(
                    "Flushing publisher for {} failed, unconfirmed records will be published again: {}",
                    self.config.checkpoint,
                    e
                );
                state.pending = None;
                state.note_error(SyncError::Flush(e));
                if outcome.is_success() {
                    outcome = RunOutcome::Aborted;
                }
            }
        }

        let mut persisted = false;
        if let Some(token) = &state.confirmed {
            match self.store.save(&self.config.checkpoint, token).await {
                Ok(()) => {
                    persisted = true;
                    tracing::info!(
                        "Saved resume token {} for {}",
                        token,
                        self.config.checkpoint
                    );
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to save resume token {} for {}: {:#}",
                        token,
                        self.config.checkpoint,
                        e
                    );
                    state.note_error(SyncError::Persist(e));
                    if outcome.is_success() {
                        outcome = RunOutcome::Aborted;
                    }
                }
            }
        }

        let report = RunReport {
            checkpoint: self.config.checkpoint.clone(),
            outcome,
            start_token: state.loaded,
            final_token: state.confirmed,
            persisted,
            processed: state.processed,
            published: state.published,
            skipped: state.skipped,
            pages_fetched: state.pages_fetched,
            first_error: state.first_error,
            elapsed: started.elapsed(),
        };
        report.log_summary();
        report
    }
}

fn key_text(record: &Record) -> String {
    bson_to_text(&record.key).unwrap_or_else(|| record.key.to_string())
}
