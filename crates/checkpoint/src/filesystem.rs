//! Filesystem-based resume token storage.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::store::{CheckpointID, ResumeStore};
use crate::ResumeToken;

/// File name used for every stored token.
pub const TOKEN_FILE_NAME: &str = "cursor.db";

/// Filesystem implementation of the [`ResumeStore`] trait.
///
/// Each token lives in its own text file at
/// `<dir>/<destination>/<source>/cursor.db`. Saves write a temporary file in
/// the same directory, sync it, and rename it over the old file, so a crash
/// mid-write leaves either the old or the new token.
pub struct FilesystemStore {
    dir: PathBuf,
}

impl FilesystemStore {
    /// Create a new FilesystemStore rooted at the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Get the root directory path.
    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Full path of the token file for `id`.
    pub fn token_path(&self, id: &CheckpointID) -> PathBuf {
        self.dir.join(id.relative_dir()).join(TOKEN_FILE_NAME)
    }
}

/// Last non-empty line of the file content, if any.
fn parse_token_content(content: &str) -> Option<ResumeToken> {
    let line = content.lines().rev().find(|line| !line.trim().is_empty())?;
    ResumeToken::new(line).ok()
}

fn write_replace(path: &Path, token: &ResumeToken) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("Token path {} has no parent directory", path.display()))?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create checkpoint directory {}", parent.display()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".cursor-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("Failed to create temporary file in {}", parent.display()))?;
    writeln!(tmp, "{token}")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to replace {}", path.display()))?;

    // Make the rename itself durable.
    #[cfg(unix)]
    if let Err(e) = std::fs::File::open(parent).and_then(|dir| dir.sync_all()) {
        tracing::warn!(
            "Failed to sync checkpoint directory {}: {}",
            parent.display(),
            e
        );
    }

    Ok(())
}

#[async_trait]
impl ResumeStore for FilesystemStore {
    async fn load(&self, id: &CheckpointID) -> Result<Option<ResumeToken>> {
        let path = self.token_path(id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };

        let Ok(content) = String::from_utf8(bytes) else {
            tracing::warn!("Token file {} is not valid UTF-8, ignoring it", path.display());
            return Ok(None);
        };

        let token = parse_token_content(&content);
        if token.is_none() {
            tracing::warn!("Token file {} holds no usable token, ignoring it", path.display());
        }
        Ok(token)
    }

    async fn save(&self, id: &CheckpointID, token: &ResumeToken) -> Result<()> {
        let path = self.token_path(id);
        write_replace(&path, token)?;
        tracing::info!("Stored resume token {} to {}", token, path.display());
        Ok(())
    }
}
