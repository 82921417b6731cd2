//! Test utilities for integration tests
use std::sync::Arc;

use serde_json::json;
use tempfile::TempDir;

use threadchat::core::db::async_db;
use threadchat::core::{SharedStorage, SqliteStorage};

/// Creates SQLite backed storage in a temporary directory. Keep the
/// returned `TempDir` alive for as long as the storage is used.
pub async fn test_storage() -> (SharedStorage, TempDir) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let storage = open_storage(&dir).await;
    (storage, dir)
}

/// Opens the storage of an existing test directory, e.g. to simulate
/// a restart.
pub async fn open_storage(dir: &TempDir) -> SharedStorage {
    let db_path = dir.path().join("threadchat.db");
    let db = async_db(db_path.to_str().unwrap())
        .await
        .expect("Failed to connect to async db");
    let storage = SqliteStorage::new(db)
        .await
        .expect("Failed to initialize storage");
    Arc::new(storage)
}

/// A successful completion response body.
#[allow(dead_code)]
pub fn answer(text: &str) -> String {
    json!({
        "is_success": true,
        "response": text,
        "used_words_count": 1,
        "used_tokens_count": 2
    })
    .to_string()
}
