//! Unit tests for the checkpoint crate.

use tempfile::TempDir;

use crate::{
    load_resume_token, CheckpointID, CheckpointIdError, FilesystemStore, ResumeStore,
    ResumeToken, TokenError,
};

fn test_id() -> CheckpointID {
    CheckpointID::new("information-topic", "raw_information_list").unwrap()
}

fn token(s: &str) -> ResumeToken {
    ResumeToken::new(s).unwrap()
}

// ============================================================================
// ResumeToken Tests
// ============================================================================

#[test]
fn test_token_trims_whitespace() {
    assert_eq!(token("  65a1f0c2e4b0a1b2c3d4e5f6 \n").as_str(), "65a1f0c2e4b0a1b2c3d4e5f6");
}

#[test]
fn test_token_rejects_empty_and_multiline() {
    assert_eq!(ResumeToken::new("   "), Err(TokenError::Empty));
    assert!(matches!(
        ResumeToken::new("abc\ndef"),
        Err(TokenError::MultiLine(_))
    ));
}

// ============================================================================
// CheckpointID Tests
// ============================================================================

#[test]
fn test_checkpoint_id_relative_dir() {
    let id = test_id();
    assert_eq!(
        id.relative_dir(),
        std::path::Path::new("information-topic").join("raw_information_list")
    );
    assert_eq!(id.to_string(), "information-topic <- raw_information_list");
}

#[test]
fn test_checkpoint_id_rejects_path_traversal() {
    assert_eq!(
        CheckpointID::new("", "users"),
        Err(CheckpointIdError::Empty {
            kind: "destination"
        })
    );
    assert!(matches!(
        CheckpointID::new("topic", "../etc"),
        Err(CheckpointIdError::InvalidComponent { kind: "source", .. })
    ));
    assert!(CheckpointID::new("..", "users").is_err());
}

// ============================================================================
// FilesystemStore Tests
// ============================================================================

#[tokio::test]
async fn test_load_missing_token_is_absent() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    assert_eq!(store.load(&test_id()).await.unwrap(), None);
}

#[tokio::test]
async fn test_save_creates_directories_and_roundtrips() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path().join("nested").join("cursors"));
    let id = test_id();

    store
        .save(&id, &token("65a1f0c2e4b0a1b2c3d4e5f6"))
        .await
        .unwrap();

    assert!(store.token_path(&id).exists());

    // A fresh store instance sees the same value, as a new process would.
    let reopened = FilesystemStore::new(tmp.path().join("nested").join("cursors"));
    assert_eq!(
        reopened.load(&id).await.unwrap(),
        Some(token("65a1f0c2e4b0a1b2c3d4e5f6"))
    );
}

#[tokio::test]
async fn test_save_overwrites_previous_token() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let id = test_id();

    store.save(&id, &token("100")).await.unwrap();
    store.save(&id, &token("250")).await.unwrap();

    assert_eq!(store.load(&id).await.unwrap(), Some(token("250")));
    let content = std::fs::read_to_string(store.token_path(&id)).unwrap();
    assert_eq!(content, "250\n");
}

#[tokio::test]
async fn test_save_leaves_no_temporary_files() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let id = test_id();

    for i in 0..5 {
        store.save(&id, &token(&i.to_string())).await.unwrap();
    }

    let dir = store.token_path(&id).parent().unwrap().to_path_buf();
    let names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    assert_eq!(names, vec![crate::TOKEN_FILE_NAME.to_string()]);
}

#[tokio::test]
async fn test_empty_token_file_is_absent() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let id = test_id();

    let path = store.token_path(&id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "").unwrap();
    assert_eq!(store.load(&id).await.unwrap(), None);

    std::fs::write(&path, "\n  \n").unwrap();
    assert_eq!(store.load(&id).await.unwrap(), None);
}

#[tokio::test]
async fn test_legacy_multiline_file_uses_last_line() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let id = test_id();

    let path = store.token_path(&id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "\n65a1f0c2e4b0a1b2c3d4e5f0\n65a1f0c2e4b0a1b2c3d4e5f6").unwrap();

    assert_eq!(
        store.load(&id).await.unwrap(),
        Some(token("65a1f0c2e4b0a1b2c3d4e5f6"))
    );
}

#[tokio::test]
async fn test_non_utf8_token_file_is_absent() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let id = test_id();

    let path = store.token_path(&id);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

    assert_eq!(store.load(&id).await.unwrap(), None);
}

#[tokio::test]
async fn test_pairs_are_stored_independently() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let a = CheckpointID::new("topic-a", "users").unwrap();
    let b = CheckpointID::new("topic-b", "users").unwrap();

    store.save(&a, &token("1")).await.unwrap();
    store.save(&b, &token("2")).await.unwrap();

    assert_eq!(store.load(&a).await.unwrap(), Some(token("1")));
    assert_eq!(store.load(&b).await.unwrap(), Some(token("2")));
}

// ============================================================================
// load_resume_token Tests
// ============================================================================

#[tokio::test]
async fn test_full_reprocess_ignores_stored_token() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let id = test_id();
    store.save(&id, &token("42")).await.unwrap();

    assert_eq!(load_resume_token(&store, &id, true).await, None);
    assert_eq!(load_resume_token(&store, &id, false).await, Some(token("42")));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_token_degrades_to_absent() {
    let tmp = TempDir::new().unwrap();
    let store = FilesystemStore::new(tmp.path());
    let id = test_id();

    // A directory where the token file should be makes the read fail.
    std::fs::create_dir_all(store.token_path(&id)).unwrap();

    assert!(store.load(&id).await.is_err());
    assert_eq!(load_resume_token(&store, &id, false).await, None);
}
