//! Field extraction helpers shared by the message profiles.
//!
//! Null is treated the same as an absent field.

use bson::{Bson, Document};
use mongodb_types::reverse::datetime_to_rfc3339;
use mongodb_types::{bson_to_text, document_to_json};
use serde_json::{Map, Value};

use crate::error::TransformError;

fn present<'a>(doc: &'a Document, field: &str) -> Option<&'a Bson> {
    match doc.get(field) {
        None | Some(Bson::Null) => None,
        Some(value) => Some(value),
    }
}

pub(crate) fn required_str(doc: &Document, field: &str) -> Result<String, TransformError> {
    match present(doc, field) {
        None => Err(TransformError::missing(field)),
        Some(Bson::String(s)) => Ok(s.clone()),
        Some(other) => Err(TransformError::wrong_type(field, "string", other)),
    }
}

pub(crate) fn optional_str(doc: &Document, field: &str) -> Result<String, TransformError> {
    match present(doc, field) {
        None => Ok(String::new()),
        Some(Bson::String(s)) => Ok(s.clone()),
        Some(other) => Err(TransformError::wrong_type(field, "string", other)),
    }
}

pub(crate) fn string_array(doc: &Document, field: &str) -> Result<Vec<String>, TransformError> {
    match present(doc, field) {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Bson::String(s) => Ok(s.clone()),
                other => Err(TransformError::wrong_type(
                    &format!("{field}[{i}]"),
                    "string",
                    other,
                )),
            })
            .collect(),
        Some(other) => Err(TransformError::wrong_type(field, "array of strings", other)),
    }
}

pub(crate) fn object_array(
    doc: &Document,
    field: &str,
) -> Result<Vec<Map<String, Value>>, TransformError> {
    match present(doc, field) {
        None => Ok(Vec::new()),
        Some(Bson::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item {
                Bson::Document(d) => Ok(document_to_json(d)),
                other => Err(TransformError::wrong_type(
                    &format!("{field}[{i}]"),
                    "document",
                    other,
                )),
            })
            .collect(),
        Some(other) => Err(TransformError::wrong_type(
            field,
            "array of documents",
            other,
        )),
    }
}

/// Canonical string form of the record identity.
pub(crate) fn identity(doc: &Document, field: &str) -> Result<String, TransformError> {
    match present(doc, field) {
        None => Err(TransformError::missing(field)),
        Some(value) => bson_to_text(value)
            .ok_or_else(|| TransformError::wrong_type(field, "scalar identifier", value)),
    }
}

/// Creation timestamp: a BSON datetime as RFC 3339, or a string as stored.
///
/// Without the field, falls back to the generation time of an ObjectId
/// identity when `fallback` is given one.
pub(crate) fn created_at(
    doc: &Document,
    field: &str,
    fallback: Option<&Bson>,
) -> Result<String, TransformError> {
    match present(doc, field) {
        Some(Bson::DateTime(dt)) => Ok(datetime_to_rfc3339(dt)),
        Some(Bson::String(s)) => Ok(s.clone()),
        Some(other) => Err(TransformError::wrong_type(field, "date or string", other)),
        None => match fallback {
            Some(Bson::ObjectId(oid)) => Ok(datetime_to_rfc3339(&oid.timestamp())),
            _ => Err(TransformError::missing(field)),
        },
    }
}
