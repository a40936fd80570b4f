//! Command-line value parsers.

mod duration;

pub use duration::parse_duration;

use anyhow::Context;
use bson::{Bson, Document};

/// Parse an extra source filter given as (extended) JSON.
///
/// `{"status": "published", "_id": {"$lt": {"$oid": "..."}}}` is accepted;
/// anything that is not a JSON object is rejected.
pub fn parse_filter(s: &str) -> anyhow::Result<Document> {
    let value: serde_json::Value =
        serde_json::from_str(s).with_context(|| format!("Filter is not valid JSON: {s}"))?;
    match Bson::try_from(value).context("Filter is not valid extended JSON")? {
        Bson::Document(doc) => Ok(doc),
        other => anyhow::bail!(
            "Filter must be a JSON object, got {}",
            mongodb_types::bson_type_name(&other)
        ),
    }
}
