//! Resume token type.

use std::fmt;
use thiserror::Error;

/// Errors produced when constructing a [`ResumeToken`].
#[derive(Error, Debug, PartialEq, Eq)]
pub enum TokenError {
    #[error("resume token is empty")]
    Empty,

    #[error("resume token must be a single line, got {0:?}")]
    MultiLine(String),
}

/// Opaque marker of the last fully synchronized record's key.
///
/// Tokens are compared only within their own key domain, so this type
/// deliberately does not implement `Ord`; ordering is the job of the key
/// codec that produced the token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResumeToken(String);

impl ResumeToken {
    /// Create a token, trimming surrounding whitespace.
    pub fn new(value: impl Into<String>) -> Result<Self, TokenError> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(TokenError::Empty);
        }
        if trimmed.contains(&['\n', '\r'][..]) {
            return Err(TokenError::MultiLine(trimmed.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for ResumeToken {
    type Err = TokenError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}
