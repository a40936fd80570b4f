//! Resume store trait and checkpoint identifiers
//!
//! This module defines the ResumeStore trait for storage-agnostic
//! token persistence, plus the identifier of a stored token.

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ResumeToken;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CheckpointIdError {
    #[error("{kind} name is empty")]
    Empty { kind: &'static str },

    #[error("{kind} name '{name}' cannot be used as a storage path component")]
    InvalidComponent { kind: &'static str, name: String },
}

/// Identifies one stored token: one per (destination topic, source collection).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CheckpointID {
    /// Destination topic name
    destination: String,
    /// Source collection name
    source: String,
}

impl CheckpointID {
    pub fn new(
        destination: impl Into<String>,
        source: impl Into<String>,
    ) -> Result<Self, CheckpointIdError> {
        let destination = destination.into();
        let source = source.into();
        validate_component("destination", &destination)?;
        validate_component("source", &source)?;
        Ok(Self {
            destination,
            source,
        })
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Relative directory holding this pair's token, `<destination>/<source>`.
    pub fn relative_dir(&self) -> PathBuf {
        Path::new(&self.destination).join(&self.source)
    }
}

impl fmt::Display for CheckpointID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <- {}", self.destination, self.source)
    }
}

fn validate_component(kind: &'static str, name: &str) -> Result<(), CheckpointIdError> {
    if name.trim().is_empty() {
        return Err(CheckpointIdError::Empty { kind });
    }
    if name == "." || name == ".." || name.contains(&['/', '\\', '\0'][..]) {
        return Err(CheckpointIdError::InvalidComponent {
            kind,
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Trait for resume token storage operations.
///
/// At most one writer per [`CheckpointID`] is expected at a time; concurrent
/// writers from different processes are not coordinated at this layer.
#[async_trait]
pub trait ResumeStore: Send + Sync {
    /// Read the stored token.
    ///
    /// Returns `Ok(None)` if no token exists or the stored content is empty
    /// or corrupt. `Err` is reserved for storage that cannot be read at all.
    async fn load(&self, id: &CheckpointID) -> Result<Option<ResumeToken>>;

    /// Durably replace the stored token.
    ///
    /// A failed save must leave the previously stored token readable.
    async fn save(&self, id: &CheckpointID, token: &ResumeToken) -> Result<()>;
}
