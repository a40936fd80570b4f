//! Message model and wire encoding for kafka-sync.
//!
//! Source documents become [`NormalizedMessage`]s through a [`MessageCodec`]
//! chosen by [`DataKind`], and leave as JSON bytes in an [`EncodedMessage`].
//!
//! ```text
//! bson::Document → MessageCodec::transform → NormalizedMessage
//!                → MessageCodec::encode    → EncodedMessage { payload, key }
//! ```
//!
//! # Modules
//!
//! - [`message`] - the typed wire message
//! - [`codec`] - per data-kind transform and JSON encoding
//! - [`error`] - transform and encode errors
//!
//! # Example
//!
//! ```ignore
//! use kafka_types::{routing_key, DataKind};
//!
//! let codec = DataKind::Information.codec("information-topic", "_id");
//! let message = codec.transform(&document)?;
//! let encoded = codec.encode(&message, routing_key(&document, "_id"))?;
//! ```

pub mod codec;
pub mod error;
pub mod message;
mod profile;

pub use codec::{routing_key, DataKind, InformationCodec, MessageCodec, RawCodec};
pub use error::{DataKindError, EncodeError, TransformError};
pub use message::{
    AffiliatedData, EncodedMessage, InformationData, InformationMetadata, MessageBody,
    NormalizedMessage,
};
