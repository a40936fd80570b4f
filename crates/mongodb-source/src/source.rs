//! Page source trait and record types.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use mongodb_types::KeyError;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("Transient source error: {0}")]
    Transient(String),

    #[error("Record has no '{field}' ordering key")]
    MissingKey { field: String },

    #[error(transparent)]
    Key(#[from] KeyError),

    #[error("Source returned key {current} after {previous}; keys must be strictly ascending")]
    OrderViolation { previous: String, current: String },

    #[error("Page fetch failed after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    #[error("Invalid stream configuration: {0}")]
    InvalidConfig(String),
}

impl SourceError {
    /// Whether refetching the same page may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, SourceError::Mongo(_) | SourceError::Transient(_))
    }
}

/// One record read from the source, with its ordering key pulled out.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// Value of the ordering key field
    pub key: Bson,
    /// The full source document, key field included
    pub document: Document,
}

/// One bounded read: records matching `filter` whose key is greater than
/// `after`, ascending by key, at most `limit` of them.
#[derive(Debug, Clone)]
pub struct PageQuery {
    pub key_field: String,
    pub after: Option<Bson>,
    pub filter: Document,
    pub limit: usize,
}

impl PageQuery {
    /// Caller filter AND `key > after`.
    ///
    /// The two parts are combined with `$and` so a caller condition on the
    /// key field itself is kept rather than overwritten.
    pub fn effective_filter(&self) -> Document {
        let Some(after) = &self.after else {
            return self.filter.clone();
        };
        let mut after_clause = Document::new();
        after_clause.insert(self.key_field.clone(), doc! { "$gt": after.clone() });
        if self.filter.is_empty() {
            after_clause
        } else {
            doc! { "$and": [self.filter.clone(), after_clause] }
        }
    }

    /// Ascending sort on the key field.
    pub fn sort(&self) -> Document {
        let mut sort = Document::new();
        sort.insert(self.key_field.clone(), 1_i32);
        sort
    }
}

/// A read-only, paginated view of one source collection.
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Document>, SourceError>;
}

#[async_trait]
impl<T: PageSource + ?Sized> PageSource for Arc<T> {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Document>, SourceError> {
        (**self).fetch_page(query).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(after: Option<Bson>, filter: Document) -> PageQuery {
        PageQuery {
            key_field: "_id".to_string(),
            after,
            filter,
            limit: 10,
        }
    }

    #[test]
    fn test_effective_filter_without_resume_key() {
        let q = query(None, doc! { "status": 1 });
        assert_eq!(q.effective_filter(), doc! { "status": 1 });
        assert_eq!(query(None, doc! {}).effective_filter(), doc! {});
    }

    #[test]
    fn test_effective_filter_with_resume_key_only() {
        let q = query(Some(Bson::Int64(5)), doc! {});
        assert_eq!(q.effective_filter(), doc! { "_id": { "$gt": 5_i64 } });
    }

    #[test]
    fn test_effective_filter_keeps_caller_key_condition() {
        let q = query(Some(Bson::Int64(5)), doc! { "_id": { "$lt": 100_i64 } });
        assert_eq!(
            q.effective_filter(),
            doc! { "$and": [ { "_id": { "$lt": 100_i64 } }, { "_id": { "$gt": 5_i64 } } ] }
        );
    }

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::Transient("timeout".into()).is_transient());
        assert!(!SourceError::MissingKey {
            field: "_id".into()
        }
        .is_transient());
    }
}
