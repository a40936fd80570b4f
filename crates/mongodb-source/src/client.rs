//! MongoDB-backed page source.

use async_trait::async_trait;
use bson::Document;
use futures::TryStreamExt;
use mongodb::{options::ClientOptions, Client as MongoClient, Collection};
use std::time::Duration;

use crate::source::{PageQuery, PageSource, SourceError};

/// Source database connection options (library type without clap)
#[derive(Clone, Debug)]
pub struct SourceOpts {
    pub source_uri: String,
    pub source_database: Option<String>,
    /// Server-side time limit for one page query
    pub read_timeout: Option<Duration>,
}

/// Reads pages from one MongoDB collection.
///
/// The underlying client keeps its own connection pool; one instance is
/// created per run and dropped with it.
pub struct MongoPageSource {
    collection: Collection<Document>,
    read_timeout: Option<Duration>,
}

impl MongoPageSource {
    /// Connect to MongoDB and bind to `collection` in the configured database.
    pub async fn connect(opts: &SourceOpts, collection: &str) -> Result<Self, SourceError> {
        tracing::debug!(
            "Parsing MongoDB connection options from URI: {}",
            opts.source_uri
        );
        let mut mongo_options = match ClientOptions::parse(&opts.source_uri).await {
            Ok(options) => options,
            Err(e) => {
                tracing::error!("Failed to parse MongoDB connection options: {}", e);
                return Err(e.into());
            }
        };
        // Add connection timeout to prevent hanging
        mongo_options.connect_timeout = Some(Duration::from_secs(10));
        mongo_options.server_selection_timeout = Some(Duration::from_secs(10));

        let mongo_client = MongoClient::with_options(mongo_options)?;

        let database_name = opts.source_database.clone().ok_or_else(|| {
            SourceError::InvalidConfig("MongoDB source database name is required".to_string())
        })?;
        tracing::info!(
            "Reading MongoDB collection {}.{}",
            database_name,
            collection
        );

        Ok(Self {
            collection: mongo_client.database(&database_name).collection(collection),
            read_timeout: opts.read_timeout,
        })
    }
}

#[async_trait]
impl PageSource for MongoPageSource {
    async fn fetch_page(&self, query: &PageQuery) -> Result<Vec<Document>, SourceError> {
        let filter = query.effective_filter();
        tracing::trace!("Fetching page of {} with filter {}", query.limit, filter);

        let limit = i64::try_from(query.limit)
            .map_err(|_| SourceError::InvalidConfig(format!("page size {} too large", query.limit)))?;
        let batch_size = u32::try_from(query.limit).unwrap_or(u32::MAX);

        let mut find = self
            .collection
            .find(filter)
            .sort(query.sort())
            .limit(limit)
            .batch_size(batch_size);
        if let Some(timeout) = self.read_timeout {
            find = find.max_time(timeout);
        }

        let cursor = find.await?;
        let page: Vec<Document> = cursor.try_collect().await?;
        Ok(page)
    }
}
