//! Kafka message types.
//!
//! [`NormalizedMessage`] is the structured payload published for every
//! source record. Its identity fields are common to all data kinds; the
//! `data`, `metadata` and `affiliated_data` sub-payloads come from a
//! [`MessageBody`] whose shape depends on the data kind.

use serde::Serialize;
use serde_json::{Map, Value};

/// A message ready to be encoded.
///
/// Field order here is the field order on the wire.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMessage {
    /// Source record identity in canonical string form
    pub id: String,
    /// Destination topic the message is produced for
    pub destination_tag: String,
    pub display_name: String,
    /// RFC 3339 timestamp, or the source's string form when stored as text
    pub created_at: String,
    pub data_kind: String,
    pub tag_code: String,
    pub tag_values: Vec<String>,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// Per data-kind sub-payloads.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MessageBody {
    Information {
        data: InformationData,
        metadata: InformationMetadata,
        affiliated_data: AffiliatedData,
    },
    /// Generic mirror of a source document
    Raw {
        data: Map<String, Value>,
        metadata: Map<String, Value>,
        affiliated_data: Map<String, Value>,
    },
}

/// Core content of an information record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InformationData {
    pub info_date: String,
    pub info_section: Vec<String>,
    pub info_author: String,
    pub info_source: String,
    pub description: String,
}

/// Page and cataloguing details of an information record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InformationMetadata {
    pub raw_html: String,
    pub info_html: String,
    pub marc_code: String,
    pub main_site: String,
    pub details_page: String,
    pub resource_label: String,
}

/// Links and attachments of an information record.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AffiliatedData {
    pub link_data: Vec<Map<String, Value>>,
    pub files: Vec<Map<String, Value>>,
}

/// Encoded message bytes with an optional partition routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedMessage {
    pub payload: Vec<u8>,
    pub key: Option<String>,
}
