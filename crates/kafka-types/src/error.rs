//! Error types for kafka-types crate.

use thiserror::Error;

/// A source record that does not fit the active message profile.
///
/// Scoped to the one record that produced it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Field '{field}': {reason}")]
pub struct TransformError {
    pub field: String,
    pub reason: String,
}

impl TransformError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: &str) -> Self {
        Self::new(field, "required field is missing")
    }

    pub(crate) fn wrong_type(field: &str, expected: &str, found: &bson::Bson) -> Self {
        Self::new(
            field,
            format!(
                "expected {expected}, found {}",
                mongodb_types::bson_type_name(found)
            ),
        )
    }
}

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataKindError {
    #[error("Unknown data kind '{0}' (expected one of: information, raw)")]
    Unknown(String),
}
