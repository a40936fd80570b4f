//! In-memory page source for tests.

use async_trait::async_trait;
use bson::Document;
use mongodb_types::KeyKind;
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Mutex;

use crate::source::{PageQuery, PageSource, SourceError};

/// A collection held in memory.
///
/// Supports equality filters on top-level fields and `key > after`. Built
/// with [`MemorySource::unsorted`] it returns documents in insertion order,
/// which lets tests feed an out-of-order source.
pub struct MemorySource {
    key_kind: KeyKind,
    key_field: String,
    documents: Mutex<Vec<Document>>,
    sorted: bool,
    fetches: AtomicU64,
    max_limit: AtomicUsize,
    failures: AtomicU32,
}

impl MemorySource {
    pub fn new(key_kind: KeyKind, key_field: &str, mut documents: Vec<Document>) -> Self {
        documents.sort_by(|a, b| match (a.get(key_field), b.get(key_field)) {
            (Some(a), Some(b)) => key_kind.compare(a, b).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        });
        Self::build(key_kind, key_field, documents, true)
    }

    pub fn unsorted(key_kind: KeyKind, key_field: &str, documents: Vec<Document>) -> Self {
        Self::build(key_kind, key_field, documents, false)
    }

    fn build(key_kind: KeyKind, key_field: &str, documents: Vec<Document>, sorted: bool) -> Self {
        Self {
            key_kind,
            key_field: key_field.to_string(),
            documents: Mutex::new(documents),
            sorted,
            fetches: AtomicU64::new(0),
            max_limit: AtomicUsize::new(0),
            failures: AtomicU32::new(0),
        }
    }

    /// Append documents, as a writer to the collection would between runs.
    pub fn insert(&self, documents: impl IntoIterator<Item = Document>) {
        let mut stored = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        stored.extend(documents);
        if self.sorted {
            let key_kind = self.key_kind;
            let field = self.key_field.clone();
            stored.sort_by(|a, b| match (a.get(&field), b.get(&field)) {
                (Some(a), Some(b)) => key_kind.compare(a, b).unwrap_or(Ordering::Equal),
                _ => Ordering::Equal,
            });
        }
    }

    /// Make the next `n` fetches fail with a transient error.
    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, AtomicOrdering::SeqCst);
    }

    /// Number of `fetch_page` calls, failed ones included.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(AtomicOrdering::SeqCst)
    }

    /// Largest page limit requested so far.
    pub fn max_limit_seen(&self) -> usize {
        self.max_limit.load(AtomicOrdering::SeqCst)
    }

    fn matches(&self, doc: &Document, query: &PageQuery) -> bool {
        let filter_ok = query
            .filter
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected));
        if !filter_ok {
            return false;
        }
        match (&query.after, doc.get(&query.key_field)) {
            (None, _) => true,
            // Keyless documents pass through so the stream can reject them.
            (Some(_), None) => true,
            (Some(after), Some(key)) => {
                matches!(self.key_kind.compare(key, after), Ok(Ordering::Greater))
            }
        }
    }
}

#[async_trait]
impl PageSource for MemorySource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Document>, SourceError> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        self.max_limit.fetch_max(query.limit, AtomicOrdering::SeqCst);

        let failing = self
            .failures
            .fetch_update(AtomicOrdering::SeqCst, AtomicOrdering::SeqCst, |n| {
                n.checked_sub(1)
            })
            .is_ok();
        if failing {
            return Err(SourceError::Transient("injected fetch failure".to_string()));
        }

        let stored = self.documents.lock().unwrap_or_else(|e| e.into_inner());
        if !self.sorted && query.after.is_some() {
            // Unsorted sources serve everything in their first page.
            return Ok(Vec::new());
        }
        Ok(stored
            .iter()
            .filter(|doc| self.matches(doc, query))
            .take(query.limit)
            .cloned()
            .collect())
    }
}
