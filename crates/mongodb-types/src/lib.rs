//! BSON helpers for kafka-sync.
//!
//! # Modules
//!
//! - [`key`] - ordering-key codec: native BSON key ⇄ resume token text
//! - [`reverse`] - BSON value → message-safe JSON / scalar text
//!
//! # Example
//!
//! ```ignore
//! use mongodb_types::KeyKind;
//!
//! let key = KeyKind::ObjectId.key_from_token("65a1f0c2e4b0a1b2c3d4e5f6")?;
//! let token = KeyKind::ObjectId.token_from_key(&key)?;
//! ```

pub mod key;
pub mod reverse;

pub use key::{KeyError, KeyKind};
pub use reverse::{bson_to_json, bson_to_text, bson_type_name, document_to_json};
