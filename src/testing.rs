//! In-memory collaborators for hermetic sync tests.
//!
//! [`MemoryPublisher`] records what would have been sent to Kafka and can
//! be told to reject messages, fail deliveries in the background, or fail
//! its flush. [`FailingStore`] wraps a real store and counts saves,
//! optionally failing loads or saves.

use anyhow::Result;
use async_trait::async_trait;
use checkpoint::{CheckpointID, FilesystemStore, ResumeStore, ResumeToken};
use kafka_sync_producer::{Delivery, KafkaError, MessagePublisher, PublishError, RDKafkaErrorCode};
use kafka_types::EncodedMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type FailWhen = Box<dyn Fn(&EncodedMessage) -> Option<PublishError> + Send>;

#[derive(Default)]
struct PublisherState {
    no_wait: bool,
    fail_when: Option<FailWhen>,
    fail_flush: bool,
    fail_deliveries_at: Option<usize>,
    delivered: Vec<EncodedMessage>,
    enqueued: Vec<EncodedMessage>,
    attempts: usize,
    shutdowns: usize,
    closed: bool,
}

/// Publisher that keeps messages in memory.
///
/// Clones share state, so a test can keep one handle while the orchestrator
/// consumes another.
#[derive(Clone, Default)]
pub struct MemoryPublisher {
    state: Arc<Mutex<PublisherState>>,
}

impl MemoryPublisher {
    /// Acknowledges every send immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueues sends; they count as delivered only after a flush.
    pub fn no_wait() -> Self {
        let publisher = Self::default();
        publisher.lock().no_wait = true;
        publisher
    }

    /// Reject sends for which `f` returns an error.
    pub fn fail_when<F>(self, f: F) -> Self
    where
        F: Fn(&EncodedMessage) -> Option<PublishError> + Send + 'static,
    {
        self.lock().fail_when = Some(Box::new(f));
        self
    }

    /// Drop enqueued messages and fail the next flush that has any.
    pub fn fail_flush(self) -> Self {
        self.lock().fail_flush = true;
        self
    }

    /// On the `attempt`th send, report that every message enqueued so far
    /// timed out, the way a no-wait client surfaces background failures on
    /// its next send. Those messages are dropped and later flushes succeed.
    pub fn fail_deliveries_at(self, attempt: usize) -> Self {
        self.lock().fail_deliveries_at = Some(attempt);
        self
    }

    /// Messages delivered so far, in send order.
    pub fn delivered(&self) -> Vec<EncodedMessage> {
        self.lock().delivered.clone()
    }

    /// Delivered payloads parsed as JSON.
    pub fn delivered_json(&self) -> Vec<serde_json::Value> {
        self.lock()
            .delivered
            .iter()
            .filter_map(|m| serde_json::from_slice(&m.payload).ok())
            .collect()
    }

    /// Values of a top-level string field across delivered payloads.
    pub fn delivered_field(&self, field: &str) -> Vec<String> {
        self.delivered_json()
            .iter()
            .filter_map(|v| v.get(field).and_then(|f| f.as_str()).map(str::to_string))
            .collect()
    }

    /// Number of `send` calls, rejected ones included.
    pub fn attempts(&self) -> usize {
        self.lock().attempts
    }

    pub fn shutdowns(&self) -> usize {
        self.lock().shutdowns
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl MessagePublisher for MemoryPublisher {
    async fn send(&mut self, message: &EncodedMessage) -> Result<Delivery, PublishError> {
        let mut state = self.lock();
        if state.closed {
            return Err(PublishError::Closed);
        }
        state.attempts += 1;
        if state.fail_deliveries_at == Some(state.attempts) && !state.enqueued.is_empty() {
            state.enqueued.clear();
            return Err(PublishError::Deferred(KafkaError::MessageProduction(
                RDKafkaErrorCode::MessageTimedOut,
            )));
        }
        if let Some(err) = state.fail_when.as_ref().and_then(|f| f(message)) {
            return Err(err);
        }

        if state.no_wait {
            state.enqueued.push(message.clone());
            Ok(Delivery::Enqueued)
        } else {
            state.delivered.push(message.clone());
            let offset = i64::try_from(state.delivered.len()).unwrap_or(i64::MAX) - 1;
            Ok(Delivery::Placed {
                partition: 0,
                offset,
            })
        }
    }

    async fn flush(&mut self, timeout: Duration) -> Result<(), PublishError> {
        let mut state = self.lock();
        if state.enqueued.is_empty() {
            return Ok(());
        }
        if state.fail_flush {
            let pending = state.enqueued.len();
            state.enqueued.clear();
            return Err(PublishError::FlushTimeout { pending, timeout });
        }
        let enqueued = std::mem::take(&mut state.enqueued);
        state.delivered.extend(enqueued);
        Ok(())
    }

    async fn shutdown(&mut self, timeout: Duration) -> Result<(), PublishError> {
        let flushed = self.flush(timeout).await;
        let mut state = self.lock();
        state.closed = true;
        state.shutdowns += 1;
        flushed
    }
}

/// Store wrapper that counts saves and can be told to fail.
pub struct FailingStore {
    inner: FilesystemStore,
    fail_loads: bool,
    fail_saves: bool,
    saves: AtomicUsize,
}

impl FailingStore {
    pub fn new(inner: FilesystemStore) -> Self {
        Self {
            inner,
            fail_loads: false,
            fail_saves: false,
            saves: AtomicUsize::new(0),
        }
    }

    pub fn failing_loads(mut self) -> Self {
        self.fail_loads = true;
        self
    }

    pub fn failing_saves(mut self) -> Self {
        self.fail_saves = true;
        self
    }

    /// Save attempts so far, failed ones included.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ResumeStore for FailingStore {
    async fn load(&self, id: &CheckpointID) -> Result<Option<ResumeToken>> {
        if self.fail_loads {
            anyhow::bail!("injected load failure for {id}");
        }
        self.inner.load(id).await
    }

    async fn save(&self, id: &CheckpointID, token: &ResumeToken) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail_saves {
            anyhow::bail!("injected save failure for {id}");
        }
        self.inner.save(id, token).await
    }
}
