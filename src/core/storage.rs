//! Durable key-value persistence for store snapshots.
//!
//! Stores serialize their whole state into a single JSON record per
//! key and hand it to a `PersistWriter`, which applies writes to the
//! backing `Storage` on a background task in the order they were
//! queued.
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio_rusqlite::Connection;

use super::db::initialize_db;

/// Version stamped on every persisted record. There is no migration
/// logic so a format change needs a new key.
pub const STATE_VERSION: u32 = 0;

#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error>;
    async fn set_item(&self, key: &str, value: String) -> Result<(), Error>;
    async fn remove_item(&self, key: &str) -> Result<(), Error>;
}

pub type SharedStorage = Arc<dyn Storage>;

/// Envelope every record is wrapped in.
#[derive(Debug, Serialize, Deserialize)]
pub struct Persisted<T> {
    pub state: T,
    pub version: u32,
}

/// Reads and decodes the record stored under `key`. A record that no
/// longer decodes is logged and treated as missing.
pub async fn load_state<T: DeserializeOwned>(
    storage: &SharedStorage,
    key: &str,
) -> Result<Option<T>, Error> {
    let Some(raw) = storage.get_item(key).await? else {
        return Ok(None);
    };

    match serde_json::from_str::<Persisted<T>>(&raw) {
        Ok(persisted) => Ok(Some(persisted.state)),
        Err(e) => {
            tracing::warn!("Discarding unreadable record {}: {}", key, e);
            Ok(None)
        }
    }
}

pub struct SqliteStorage {
    db: Connection,
}

impl SqliteStorage {
    /// Wraps an open connection, creating the table if needed.
    pub async fn new(db: Connection) -> Result<Self, Error> {
        db.call(|conn| {
            initialize_db(conn)?;
            Ok(())
        })
        .await?;
        Ok(Self { db })
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_owned();
        let value = self
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?")?;
                let mut rows = stmt.query_map([key], |row| row.get::<_, String>(0))?;
                let value = rows.next().transpose()?;
                Ok(value)
            })
            .await?;
        Ok(value)
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), Error> {
        let key = key.to_owned();
        self.db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO kv (key, value, updated_at) VALUES (?, ?, CURRENT_TIMESTAMP)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                     updated_at = excluded.updated_at",
                    [key, value],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), Error> {
        let key = key.to_owned();
        self.db
            .call(move |conn| {
                conn.execute("DELETE FROM kv WHERE key = ?", [key])?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// In-memory storage for testing and throwaway sessions.
#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>, Error> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: String) -> Result<(), Error> {
        self.items.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<(), Error> {
        self.items.write().await.remove(key);
        Ok(())
    }
}

enum WriteCommand {
    Write { key: String, value: String },
    Flush(oneshot::Sender<()>),
}

/// Queues snapshots for a background task that writes them to
/// storage. A crash before the queue drains loses the latest writes.
#[derive(Clone)]
pub struct PersistWriter {
    tx: mpsc::UnboundedSender<WriteCommand>,
}

impl PersistWriter {
    /// Starts the writer task. Must be called from within a tokio
    /// runtime.
    pub fn spawn(storage: SharedStorage) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<WriteCommand>();

        tokio::spawn(async move {
            while let Some(cmd) = rx.recv().await {
                match cmd {
                    WriteCommand::Write { key, value } => {
                        if let Err(e) = storage.set_item(&key, value).await {
                            tracing::error!("Failed to persist {}: {}", key, e);
                        }
                    }
                    WriteCommand::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });

        Self { tx }
    }

    /// Serializes `state` into the versioned envelope and queues it.
    pub fn write<T: Serialize>(&self, key: &str, state: &T) {
        let record = Persisted {
            state,
            version: STATE_VERSION,
        };
        let value = match serde_json::to_string(&record) {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Failed to serialize {}: {}", key, e);
                return;
            }
        };

        let cmd = WriteCommand::Write {
            key: key.to_string(),
            value,
        };
        if self.tx.send(cmd).is_err() {
            tracing::warn!("Persistence writer stopped, dropping write for {}", key);
        }
    }

    /// Resolves once every write queued before this call was applied.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteCommand::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }
}
