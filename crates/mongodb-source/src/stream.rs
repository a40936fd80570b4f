//! Ordered record stream over a page source.

use bson::{Bson, Document};
use futures::Stream;
use mongodb_types::{bson_to_text, KeyKind};
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::time::Duration;

use crate::source::{PageQuery, PageSource, Record, SourceError};

/// Upper bound on the configured page size.
pub const MAX_PAGE_SIZE: usize = 100_000;

/// What to read and how.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Source collection name, used for logging
    pub collection: String,
    /// Ordering key field name
    pub key_field: String,
    /// Native type of the ordering key
    pub key_kind: KeyKind,
    /// Records per page
    pub page_size: usize,
    /// Extra caller filter in MongoDB query language
    pub filter: Document,
    /// Retries for a page fetch that fails transiently
    pub fetch_retries: u32,
    /// Base delay between fetch retries, multiplied by the attempt number
    pub retry_backoff: Duration,
}

impl StreamConfig {
    pub fn new(collection: impl Into<String>, key_field: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key_field: key_field.into(),
            key_kind: KeyKind::default(),
            page_size: 1000,
            filter: Document::new(),
            fetch_retries: 3,
            retry_backoff: Duration::from_millis(500),
        }
    }

    pub fn validate(&self) -> Result<(), SourceError> {
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(SourceError::InvalidConfig(format!(
                "page size must be between 1 and {MAX_PAGE_SIZE}, got {}",
                self.page_size
            )));
        }
        if self.key_field.is_empty() {
            return Err(SourceError::InvalidConfig(
                "ordering key field name is empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Single-pass, lazily paged sequence of records in ascending key order.
///
/// Records after `resume_after` are fetched one page at a time; the next
/// page is requested only once the current one has been handed out. To
/// restart, build a new stream from an updated resume key.
pub struct OrderedRecordStream<S> {
    source: S,
    config: StreamConfig,
    /// Key the next page query starts after
    after: Option<Bson>,
    /// Key of the last record handed out
    last_key: Option<Bson>,
    buffer: VecDeque<Document>,
    exhausted: bool,
    pages_fetched: u64,
}

impl<S: PageSource> OrderedRecordStream<S> {
    pub fn new(
        source: S,
        config: StreamConfig,
        resume_after: Option<Bson>,
    ) -> Result<Self, SourceError> {
        config.validate()?;
        Ok(Self {
            source,
            after: resume_after.clone(),
            last_key: resume_after,
            config,
            buffer: VecDeque::new(),
            exhausted: false,
            pages_fetched: 0,
        })
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }

    /// Pull the next record, fetching a new page when the buffer runs dry.
    pub async fn next_record(&mut self) -> Result<Option<Record>, SourceError> {
        if self.buffer.is_empty() && !self.exhausted {
            self.fill_buffer().await?;
        }

        let Some(document) = self.buffer.pop_front() else {
            return Ok(None);
        };

        let key = document
            .get(&self.config.key_field)
            .cloned()
            .ok_or_else(|| SourceError::MissingKey {
                field: self.config.key_field.clone(),
            })?;

        if let Some(previous) = &self.last_key {
            if self.config.key_kind.compare(previous, &key)? != Ordering::Less {
                return Err(SourceError::OrderViolation {
                    previous: bson_to_text(previous).unwrap_or_else(|| previous.to_string()),
                    current: bson_to_text(&key).unwrap_or_else(|| key.to_string()),
                });
            }
        }
        self.last_key = Some(key.clone());

        Ok(Some(Record { key, document }))
    }

    /// Turn this stream into a `futures::Stream`.
    pub fn into_stream(self) -> impl Stream<Item = Result<Record, SourceError>> {
        futures::stream::try_unfold(self, |mut stream| async move {
            Ok(stream.next_record().await?.map(|record| (record, stream)))
        })
    }

    async fn fill_buffer(&mut self) -> Result<(), SourceError> {
        let query = PageQuery {
            key_field: self.config.key_field.clone(),
            after: self.after.clone(),
            filter: self.config.filter.clone(),
            limit: self.config.page_size,
        };

        let page = self.fetch_with_retry(&query).await?;
        self.pages_fetched += 1;
        tracing::debug!(
            "Fetched page {} of {} records from {}",
            self.pages_fetched,
            page.len(),
            self.config.collection
        );

        if page.len() < self.config.page_size {
            self.exhausted = true;
        }
        match page.last().and_then(|doc| doc.get(&self.config.key_field)) {
            Some(last) => self.after = Some(last.clone()),
            // The keyless record errors out when reached; never re-query from here.
            None => self.exhausted = true,
        }

        self.buffer.extend(page);
        Ok(())
    }

    async fn fetch_with_retry(&self, query: &PageQuery) -> Result<Vec<Document>, SourceError> {
        let attempts = self.config.fetch_retries + 1;
        let mut attempt = 1;
        loop {
            match self.source.fetch_page(query).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.config.retry_backoff * attempt;
                    tracing::warn!(
                        "Page fetch from {} failed (attempt {}/{}), retrying in {:?}: {}",
                        self.config.collection,
                        attempt,
                        attempts,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) if e.is_transient() => {
                    return Err(SourceError::RetriesExhausted {
                        attempts,
                        last: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemorySource;
    use bson::doc;
    use futures::TryStreamExt;
    use std::sync::Arc;

    fn int_docs(keys: impl IntoIterator<Item = i64>) -> Vec<Document> {
        keys.into_iter()
            .map(|k| doc! { "seq": k, "payload": format!("row-{k}") })
            .collect()
    }

    fn config(page_size: usize) -> StreamConfig {
        StreamConfig {
            key_kind: KeyKind::Int64,
            page_size,
            retry_backoff: Duration::from_millis(1),
            ..StreamConfig::new("rows", "seq")
        }
    }

    async fn collect_keys<S: PageSource>(stream: &mut OrderedRecordStream<S>) -> Vec<i64> {
        let mut keys = Vec::new();
        while let Some(record) = stream.next_record().await.unwrap() {
            keys.push(record.key.as_i64().unwrap());
        }
        keys
    }

    #[tokio::test]
    async fn test_yields_all_records_in_pages() {
        let source = Arc::new(MemorySource::new(KeyKind::Int64, "seq", int_docs(1..=25)));
        let mut stream = OrderedRecordStream::new(source.clone(), config(10), None).unwrap();

        assert_eq!(collect_keys(&mut stream).await, (1..=25).collect::<Vec<_>>());
        // 10 + 10 + 5, the short page ends the stream without another query.
        assert_eq!(stream.pages_fetched(), 3);
        assert_eq!(source.fetch_count(), 3);
        assert_eq!(source.max_limit_seen(), 10);
    }

    #[tokio::test]
    async fn test_exact_multiple_needs_one_empty_page() {
        let source = Arc::new(MemorySource::new(KeyKind::Int64, "seq", int_docs(1..=20)));
        let mut stream = OrderedRecordStream::new(source.clone(), config(10), None).unwrap();

        assert_eq!(collect_keys(&mut stream).await.len(), 20);
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_resumes_after_key() {
        let source = MemorySource::new(KeyKind::Int64, "seq", int_docs(1..=10));
        let mut stream =
            OrderedRecordStream::new(source, config(4), Some(Bson::Int64(6))).unwrap();

        assert_eq!(collect_keys(&mut stream).await, vec![7, 8, 9, 10]);
    }

    #[tokio::test]
    async fn test_does_not_fetch_before_first_pull() {
        let source = Arc::new(MemorySource::new(KeyKind::Int64, "seq", int_docs(1..=5)));
        let mut stream = OrderedRecordStream::new(source.clone(), config(2), None).unwrap();
        assert_eq!(source.fetch_count(), 0);

        stream.next_record().await.unwrap();
        assert_eq!(source.fetch_count(), 1);
        stream.next_record().await.unwrap();
        assert_eq!(source.fetch_count(), 1);
        stream.next_record().await.unwrap();
        assert_eq!(source.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_caller_filter_is_applied() {
        let docs = (1..=6)
            .map(|k: i64| doc! { "seq": k, "status": if k % 2 == 0 { "keep" } else { "drop" } })
            .collect();
        let source = MemorySource::new(KeyKind::Int64, "seq", docs);
        let config = StreamConfig {
            filter: doc! { "status": "keep" },
            ..config(2)
        };
        let mut stream = OrderedRecordStream::new(source, config, None).unwrap();

        assert_eq!(collect_keys(&mut stream).await, vec![2, 4, 6]);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let source = Arc::new(MemorySource::new(KeyKind::Int64, "seq", int_docs(1..=3)));
        source.fail_next(2);
        let mut stream = OrderedRecordStream::new(source.clone(), config(10), None).unwrap();

        assert_eq!(collect_keys(&mut stream).await, vec![1, 2, 3]);
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_reported() {
        let source = Arc::new(MemorySource::new(KeyKind::Int64, "seq", int_docs(1..=3)));
        source.fail_next(10);
        let config = StreamConfig {
            fetch_retries: 2,
            ..config(10)
        };
        let mut stream = OrderedRecordStream::new(source, config, None).unwrap();

        let err = stream.next_record().await.unwrap_err();
        assert!(matches!(err, SourceError::RetriesExhausted { attempts: 3, .. }));
    }

    #[tokio::test]
    async fn test_out_of_order_source_is_rejected() {
        let source = MemorySource::unsorted(KeyKind::Int64, "seq", int_docs([1, 3, 2]));
        let mut stream = OrderedRecordStream::new(source, config(10), None).unwrap();

        stream.next_record().await.unwrap();
        stream.next_record().await.unwrap();
        let err = stream.next_record().await.unwrap_err();
        assert!(matches!(err, SourceError::OrderViolation { .. }));
    }

    #[tokio::test]
    async fn test_missing_key_is_rejected() {
        let source = MemorySource::unsorted(
            KeyKind::Int64,
            "seq",
            vec![doc! { "payload": "no key" }],
        );
        let mut stream = OrderedRecordStream::new(source, config(10), None).unwrap();

        let err = stream.next_record().await.unwrap_err();
        assert!(matches!(err, SourceError::MissingKey { .. }));
    }

    #[tokio::test]
    async fn test_invalid_page_size_is_rejected() {
        let source = MemorySource::new(KeyKind::Int64, "seq", vec![]);
        assert!(matches!(
            OrderedRecordStream::new(source, config(0), None),
            Err(SourceError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_into_stream() {
        let source = MemorySource::new(KeyKind::Int64, "seq", int_docs(1..=7));
        let stream = OrderedRecordStream::new(source, config(3), None).unwrap();

        let records: Vec<Record> = stream.into_stream().try_collect().await.unwrap();
        assert_eq!(records.len(), 7);
        assert_eq!(records[6].document.get_str("payload").unwrap(), "row-7");
    }
}
