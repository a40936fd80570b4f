//! Resume token storage for kafka-sync
//!
//! A sync run resumes from the key of the last record it fully published.
//! That key is kept as an opaque [`ResumeToken`] per (destination, source)
//! pair and persisted once at the end of every run.
//!
//! # Architecture
//!
//! - [`ResumeToken`] - validated, single-line token text
//! - [`CheckpointID`] - identifies the (destination topic, source collection) pair
//! - [`ResumeStore`] - storage-agnostic load/save trait
//! - [`FilesystemStore`] - stores each token in `<dir>/<topic>/<collection>/cursor.db`
//!
//! Unreadable or corrupt token content is never fatal: it degrades to
//! "absent", which means processing starts from the beginning.

mod filesystem;
pub mod store;
mod token;

#[cfg(test)]
mod tests;

pub use filesystem::{FilesystemStore, TOKEN_FILE_NAME};
pub use store::{CheckpointID, CheckpointIdError, ResumeStore};
pub use token::{ResumeToken, TokenError};

/// Load the token a run should resume from.
///
/// Returns `None` when `full_reprocess` is set, when no token was saved
/// yet, or when the stored content cannot be read. A read failure is only
/// logged here; it becomes fatal if the following save fails as well.
pub async fn load_resume_token<S: ResumeStore + ?Sized>(
    store: &S,
    id: &CheckpointID,
    full_reprocess: bool,
) -> Option<ResumeToken> {
    if full_reprocess {
        tracing::info!("Full reprocess requested for {id}, ignoring stored resume token");
        return None;
    }

    match store.load(id).await {
        Ok(Some(token)) => {
            tracing::info!("Resuming {id} after token {token}");
            Some(token)
        }
        Ok(None) => {
            tracing::info!("No resume token stored for {id}, starting from the beginning");
            None
        }
        Err(e) => {
            tracing::warn!("Resume token for {id} is unreadable, starting from the beginning: {e:#}");
            None
        }
    }
}
