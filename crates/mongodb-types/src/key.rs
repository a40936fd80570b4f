//! Ordering-key codec.
//!
//! The source collection is read in ascending order of one unique key field.
//! A [`KeyKind`] knows how that field is represented natively in BSON and how
//! it is written into a resume token.

use bson::oid::ObjectId;
use bson::Bson;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::reverse::bson_type_name;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("Ordering key must be {expected}, found BSON {found}")]
    WrongType { expected: KeyKind, found: String },

    #[error("Invalid {kind} resume token '{token}': {reason}")]
    InvalidToken {
        kind: KeyKind,
        token: String,
        reason: String,
    },

    #[error("Unknown key kind '{0}' (expected one of: objectid, string, int64)")]
    UnknownKind(String),
}

/// Native representation of the ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum KeyKind {
    /// 12-byte ObjectId, token is 24 lowercase hex characters.
    #[default]
    ObjectId,
    /// UTF-8 string compared bytewise, token is the string itself.
    String,
    /// 32/64-bit integer, token is its decimal form.
    Int64,
}

impl KeyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyKind::ObjectId => "objectid",
            KeyKind::String => "string",
            KeyKind::Int64 => "int64",
        }
    }

    /// Encode a key value read from the source into token text.
    pub fn token_from_key(&self, key: &Bson) -> Result<String, KeyError> {
        match (self, key) {
            (KeyKind::ObjectId, Bson::ObjectId(oid)) => Ok(oid.to_hex()),
            (KeyKind::String, Bson::String(s)) => Ok(s.clone()),
            (KeyKind::Int64, Bson::Int64(i)) => Ok(i.to_string()),
            (KeyKind::Int64, Bson::Int32(i)) => Ok(i.to_string()),
            _ => Err(self.wrong_type(key)),
        }
    }

    /// Decode token text back into the native key value used in queries.
    pub fn key_from_token(&self, token: &str) -> Result<Bson, KeyError> {
        let invalid = |reason: String| KeyError::InvalidToken {
            kind: *self,
            token: token.to_string(),
            reason,
        };
        match self {
            KeyKind::ObjectId => ObjectId::parse_str(token)
                .map(Bson::ObjectId)
                .map_err(|e| invalid(e.to_string())),
            KeyKind::String => {
                if token.is_empty() {
                    Err(invalid("empty".to_string()))
                } else {
                    Ok(Bson::String(token.to_string()))
                }
            }
            KeyKind::Int64 => token
                .parse::<i64>()
                .map(Bson::Int64)
                .map_err(|e| invalid(e.to_string())),
        }
    }

    /// Compare two native keys of this kind.
    pub fn compare(&self, a: &Bson, b: &Bson) -> Result<Ordering, KeyError> {
        match self {
            KeyKind::ObjectId => {
                let a = self.object_id(a)?;
                let b = self.object_id(b)?;
                Ok(a.bytes().cmp(&b.bytes()))
            }
            KeyKind::String => match (a, b) {
                (Bson::String(a), Bson::String(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
                (Bson::String(_), other) | (other, _) => Err(self.wrong_type(other)),
            },
            KeyKind::Int64 => Ok(self.integer(a)?.cmp(&self.integer(b)?)),
        }
    }

    fn object_id(&self, value: &Bson) -> Result<ObjectId, KeyError> {
        match value {
            Bson::ObjectId(oid) => Ok(*oid),
            other => Err(self.wrong_type(other)),
        }
    }

    fn integer(&self, value: &Bson) -> Result<i64, KeyError> {
        match value {
            Bson::Int64(i) => Ok(*i),
            Bson::Int32(i) => Ok(i64::from(*i)),
            other => Err(self.wrong_type(other)),
        }
    }

    fn wrong_type(&self, found: &Bson) -> KeyError {
        KeyError::WrongType {
            expected: *self,
            found: bson_type_name(found).to_string(),
        }
    }
}

impl fmt::Display for KeyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyKind {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "objectid" | "oid" => Ok(KeyKind::ObjectId),
            "string" => Ok(KeyKind::String),
            "int64" | "int" | "integer" => Ok(KeyKind::Int64),
            other => Err(KeyError::UnknownKind(other.to_string())),
        }
    }
}
