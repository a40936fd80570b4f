//! Per data-kind transform and JSON wire encoding.

use bson::Document;
use mongodb_types::{bson_to_text, document_to_json};
use serde_json::Map;
use std::fmt;
use std::str::FromStr;

use crate::error::{DataKindError, EncodeError, TransformError};
use crate::message::{
    AffiliatedData, EncodedMessage, InformationData, InformationMetadata, MessageBody,
    NormalizedMessage,
};
use crate::profile::{
    created_at, identity, object_array, optional_str, required_str, string_array,
};

const CREATE_TIME: &str = "create_time";

/// Converts source documents of one data kind into wire messages.
pub trait MessageCodec: Send + Sync {
    fn data_kind(&self) -> DataKind;

    /// Build the normalized message for one source document.
    ///
    /// Pure: the same document always yields the same message.
    fn transform(&self, document: &Document) -> Result<NormalizedMessage, TransformError>;

    /// Serialize a message to JSON bytes.
    fn encode(
        &self,
        message: &NormalizedMessage,
        key: Option<String>,
    ) -> Result<EncodedMessage, EncodeError> {
        Ok(EncodedMessage {
            payload: serde_json::to_vec(message)?,
            key,
        })
    }
}

/// Routing key taken from a field of the source document.
///
/// `None` when the field is absent or has no scalar text form.
pub fn routing_key(document: &Document, field: &str) -> Option<String> {
    document.get(field).and_then(bson_to_text)
}

/// Closed set of supported data kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    /// Information records from `raw_information_list`
    Information,
    /// Any collection, mirrored as-is
    Raw,
}

impl DataKind {
    pub const ALL: [DataKind; 2] = [DataKind::Information, DataKind::Raw];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKind::Information => "information",
            DataKind::Raw => "raw",
        }
    }

    /// Collection read when none is given on the command line.
    pub fn default_collection(&self) -> Option<&'static str> {
        match self {
            DataKind::Information => Some("raw_information_list"),
            DataKind::Raw => None,
        }
    }

    /// Build the codec for messages published to `topic`.
    pub fn codec(&self, topic: &str, key_field: &str) -> Box<dyn MessageCodec> {
        match self {
            DataKind::Information => Box::new(InformationCodec::new(topic, key_field)),
            DataKind::Raw => Box::new(RawCodec::new(topic, key_field)),
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = DataKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DataKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| DataKindError::Unknown(s.to_string()))
    }
}

/// Information profile.
///
/// `marc_code` and `main_site` are required strings; every other field
/// defaults to an empty value when absent.
pub struct InformationCodec {
    topic: String,
    key_field: String,
}

impl InformationCodec {
    pub fn new(topic: &str, key_field: &str) -> Self {
        Self {
            topic: topic.to_string(),
            key_field: key_field.to_string(),
        }
    }
}

impl MessageCodec for InformationCodec {
    fn data_kind(&self) -> DataKind {
        DataKind::Information
    }

    fn transform(&self, doc: &Document) -> Result<NormalizedMessage, TransformError> {
        Ok(NormalizedMessage {
            id: identity(doc, &self.key_field)?,
            destination_tag: self.topic.clone(),
            display_name: optional_str(doc, "info_name")?,
            created_at: created_at(doc, CREATE_TIME, None)?,
            data_kind: self.data_kind().to_string(),
            tag_code: optional_str(doc, "tag_code")?,
            tag_values: string_array(doc, "tag_values")?,
            body: MessageBody::Information {
                data: InformationData {
                    info_date: optional_str(doc, "info_date")?,
                    info_section: string_array(doc, "info_section")?,
                    info_author: optional_str(doc, "info_author")?,
                    info_source: optional_str(doc, "info_source")?,
                    description: optional_str(doc, "description")?,
                },
                metadata: InformationMetadata {
                    raw_html: optional_str(doc, "raw_html")?,
                    info_html: optional_str(doc, "info_html")?,
                    marc_code: required_str(doc, "marc_code")?,
                    main_site: required_str(doc, "main_site")?,
                    details_page: optional_str(doc, "details_page")?,
                    resource_label: optional_str(doc, "resource_label")?,
                },
                affiliated_data: AffiliatedData {
                    link_data: object_array(doc, "link_data")?,
                    files: object_array(doc, "files")?,
                },
            },
        })
    }
}

/// Generic profile: the whole document, minus its key and creation time,
/// becomes `data`.
pub struct RawCodec {
    topic: String,
    key_field: String,
}

impl RawCodec {
    pub fn new(topic: &str, key_field: &str) -> Self {
        Self {
            topic: topic.to_string(),
            key_field: key_field.to_string(),
        }
    }
}

impl MessageCodec for RawCodec {
    fn data_kind(&self) -> DataKind {
        DataKind::Raw
    }

    fn transform(&self, doc: &Document) -> Result<NormalizedMessage, TransformError> {
        let mut data = document_to_json(doc);
        data.remove(&self.key_field);
        data.remove(CREATE_TIME);

        Ok(NormalizedMessage {
            id: identity(doc, &self.key_field)?,
            destination_tag: self.topic.clone(),
            display_name: String::new(),
            created_at: created_at(doc, CREATE_TIME, doc.get(&self.key_field))?,
            data_kind: self.data_kind().to_string(),
            tag_code: String::new(),
            tag_values: Vec::new(),
            body: MessageBody::Raw {
                data,
                metadata: Map::new(),
                affiliated_data: Map::new(),
            },
        })
    }
}
