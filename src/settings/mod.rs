//! User settings: the API token and the developer-mode flag.
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Error, Result};
use serde::{Deserialize, Serialize};

use crate::core::{PersistWriter, SharedStorage, load_state};

pub const SETTINGS_STORAGE_KEY: &str = "app-storage";

#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub dev_mode: bool,
}

struct SettingsStoreInner {
    settings: RwLock<Settings>,
    writer: PersistWriter,
}

#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<SettingsStoreInner>,
}

impl SettingsStore {
    pub async fn load(storage: &SharedStorage) -> Result<Self, Error> {
        let settings = load_state::<Settings>(storage, SETTINGS_STORAGE_KEY)
            .await?
            .unwrap_or_default();

        Ok(Self {
            inner: Arc::new(SettingsStoreInner {
                settings: RwLock::new(settings),
                writer: PersistWriter::spawn(Arc::clone(storage)),
            }),
        })
    }

    pub fn settings(&self) -> Settings {
        self.inner
            .settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn token(&self) -> String {
        self.settings().token
    }

    pub fn dev_mode(&self) -> bool {
        self.settings().dev_mode
    }

    /// Stored verbatim, the endpoint is the one to judge it.
    pub fn set_token(&self, token: &str) {
        self.update(|s| s.token = token.to_string());
    }

    pub fn set_dev_mode(&self, enabled: bool) {
        self.update(|s| s.dev_mode = enabled);
    }

    pub async fn flush(&self) {
        self.inner.writer.flush().await
    }

    fn update(&self, f: impl FnOnce(&mut Settings)) {
        let mut guard = self
            .inner
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut next = guard.clone();
        f(&mut next);
        *guard = next;
        self.inner.writer.write(SETTINGS_STORAGE_KEY, &*guard);
    }
}

/// Hides all but the last four characters of a token.
pub fn mask_token(token: &str) -> String {
    let count = token.chars().count();
    if count <= 4 {
        return "*".repeat(count);
    }
    let visible: String = token.chars().skip(count - 4).collect();
    format!("{}{}", "*".repeat(count - 4), visible)
}
