//! Ordered, resumable reads from a MongoDB collection.
//!
//! [`OrderedRecordStream`] yields the records of one collection in strictly
//! ascending order of a unique key field, starting after a resume key, and
//! fetches them in bounded pages through a [`PageSource`].

mod client;
mod source;
mod stream;
pub mod testing;

pub use client::{MongoPageSource, SourceOpts};
pub use source::{PageQuery, PageSource, Record, SourceError};
pub use stream::{OrderedRecordStream, StreamConfig, MAX_PAGE_SIZE};
