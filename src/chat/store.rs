use std::collections::HashSet;
use std::sync::{Arc, PoisonError, RwLock};

use anyhow::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::models::{Message, MessageDraft, Thread, TitleState, seed_threads};
use crate::core::{PersistWriter, SharedStorage, load_state};

pub const CONTENT_STORAGE_KEY: &str = "content-storage";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Thread not found: {0}")]
    ThreadNotFound(String),

    #[error("Message {message_id} already exists in thread {thread_id}")]
    MessageExists {
        thread_id: String,
        message_id: String,
    },
}

#[derive(Deserialize)]
struct ContentState {
    threads: Vec<Thread>,
}

#[derive(Serialize)]
struct ContentSnapshot<'a> {
    threads: &'a [Thread],
}

struct ContentStoreInner {
    threads: RwLock<Arc<Vec<Thread>>>,
    writer: PersistWriter,
}

/// Holds every thread and its messages.
///
/// Each mutation builds a new `Arc<Vec<Thread>>` and swaps it in, so
/// a caller holding an older snapshot can detect changes with
/// `Arc::ptr_eq`. Mutations are visible as soon as the call returns
/// and are written to storage in the background.
#[derive(Clone)]
pub struct ContentStore {
    inner: Arc<ContentStoreInner>,
}

impl ContentStore {
    /// Loads persisted threads, falling back to the seed state.
    pub async fn load(storage: &SharedStorage) -> Result<Self, Error> {
        let threads = load_state::<ContentState>(storage, CONTENT_STORAGE_KEY)
            .await?
            .map(|state| state.threads)
            .unwrap_or_else(seed_threads);
        tracing::debug!("Loaded {} threads", threads.len());

        Ok(Self {
            inner: Arc::new(ContentStoreInner {
                threads: RwLock::new(Arc::new(threads)),
                writer: PersistWriter::spawn(Arc::clone(storage)),
            }),
        })
    }

    /// The current snapshot of all threads.
    pub fn threads(&self) -> Arc<Vec<Thread>> {
        let guard = self
            .inner
            .threads
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn thread(&self, thread_id: &str) -> Option<Thread> {
        self.threads().iter().find(|t| t.id == thread_id).cloned()
    }

    pub fn add_thread(&self, title: &str) -> Thread {
        let thread = Thread::new(title);
        let created = thread.clone();
        self.update(move |threads| {
            threads.push(thread);
            Some(())
        });
        created
    }

    /// Replaces the thread with the same id. Messages are restamped
    /// with the thread id and must have distinct ids.
    pub fn edit_thread(&self, mut thread: Thread) -> Result<Thread, StoreError> {
        let mut seen = HashSet::new();
        for message in thread.messages.iter_mut() {
            if !seen.insert(message.id.clone()) {
                return Err(StoreError::MessageExists {
                    thread_id: thread.id.clone(),
                    message_id: message.id.clone(),
                });
            }
            message.thread_id = thread.id.clone();
        }
        let updated = thread.clone();
        self.update(move |threads| {
            let existing = threads.iter_mut().find(|t| t.id == thread.id)?;
            *existing = thread;
            Some(())
        })
        .ok_or_else(|| StoreError::ThreadNotFound(updated.id.clone()))?;
        Ok(updated)
    }

    pub fn rename_thread(&self, thread_id: &str, title: &str) -> Result<(), StoreError> {
        self.update(|threads| {
            let thread = threads.iter_mut().find(|t| t.id == thread_id)?;
            thread.title = title.to_string();
            thread.title_state = TitleState::Named;
            Some(())
        })
        .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))
    }

    /// Sets a generated title unless the thread was named in the
    /// meantime. Returns whether the title was applied.
    pub fn apply_generated_title(&self, thread_id: &str, title: &str) -> Result<bool, StoreError> {
        let current = self
            .thread(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        if current.title_state == TitleState::Named {
            return Ok(false);
        }

        let applied = self.update(|threads| {
            let thread = threads
                .iter_mut()
                .find(|t| t.id == thread_id && t.title_state == TitleState::Default)?;
            thread.title = title.to_string();
            thread.title_state = TitleState::Named;
            Some(())
        });
        Ok(applied.is_some())
    }

    /// Removes the thread along with its messages. Returns the removed
    /// thread, or `None` when there was nothing to remove.
    pub fn remove_thread(&self, thread_id: &str) -> Option<Thread> {
        self.update(|threads| {
            let idx = threads.iter().position(|t| t.id == thread_id)?;
            Some(threads.remove(idx))
        })
    }

    /// Stores a message at the end of the thread, filling in any
    /// missing fields.
    pub fn add_message(&self, draft: MessageDraft, thread_id: &str) -> Result<Message, StoreError> {
        let message = draft.materialize(thread_id, Utc::now());

        let mut outcome = Err(StoreError::ThreadNotFound(thread_id.to_string()));
        self.update(|threads| {
            let thread = threads.iter_mut().find(|t| t.id == thread_id)?;
            if thread.message(&message.id).is_some() {
                outcome = Err(StoreError::MessageExists {
                    thread_id: thread_id.to_string(),
                    message_id: message.id.clone(),
                });
                return None;
            }
            thread.messages.push(message.clone());
            outcome = Ok(message.clone());
            Some(())
        });
        outcome
    }

    /// Replaces the message with the same id. The id and thread
    /// reference are kept; returns `Ok(None)` if no message matched.
    pub fn edit_message(
        &self,
        message: Message,
        thread_id: &str,
    ) -> Result<Option<Message>, StoreError> {
        let mut found_thread = false;
        let updated = self.update(|threads| {
            let thread = threads.iter_mut().find(|t| t.id == thread_id)?;
            found_thread = true;
            let existing = thread.messages.iter_mut().find(|m| m.id == message.id)?;
            *existing = Message {
                thread_id: thread_id.to_string(),
                ..message
            };
            Some(existing.clone())
        });

        if !found_thread {
            return Err(StoreError::ThreadNotFound(thread_id.to_string()));
        }
        Ok(updated)
    }

    /// Removing an absent message (or from an absent thread) changes
    /// nothing and returns false.
    pub fn remove_message(&self, message_id: &str, thread_id: &str) -> bool {
        self.update(|threads| {
            let thread = threads.iter_mut().find(|t| t.id == thread_id)?;
            let idx = thread.messages.iter().position(|m| m.id == message_id)?;
            thread.messages.remove(idx);
            Some(())
        })
        .is_some()
    }

    pub fn reset_state(&self) {
        self.update(|threads| {
            *threads = seed_threads();
            Some(())
        });
    }

    /// Waits until every mutation so far has been written to storage.
    pub async fn flush(&self) {
        self.inner.writer.flush().await
    }

    // Applies `f` to a copy of the threads. When `f` returns `None`
    // nothing changed and the current snapshot is kept.
    fn update<R>(&self, f: impl FnOnce(&mut Vec<Thread>) -> Option<R>) -> Option<R> {
        let mut guard = self
            .inner
            .threads
            .write()
            .unwrap_or_else(PoisonError::into_inner);

        let mut next: Vec<Thread> = (**guard).clone();
        let out = f(&mut next)?;
        *guard = Arc::new(next);

        self.inner.writer.write(
            CONTENT_STORAGE_KEY,
            &ContentSnapshot {
                threads: guard.as_slice(),
            },
        );
        Some(out)
    }
}
