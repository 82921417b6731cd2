use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::AbortHandle;

use super::models::{Message, MessageDraft, Thread};
use super::naming::{NamingTask, name_thread};
use super::store::{ContentStore, StoreError};
use crate::completion::{CompletionClient, TransportError, Usage};
use crate::settings::SettingsStore;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The endpoint answered but flagged the request as failed. Holds
    /// the response body so it can be shown as is.
    #[error("Completion was rejected: {0}")]
    Rejected(String),
}

#[derive(Debug)]
pub struct SendOutcome {
    pub user_message: Message,
    /// `None` when the endpoint returned an empty answer.
    pub reply: Option<Message>,
    pub usage: Usage,
    /// Set when this was the first message of the thread.
    pub naming: Option<NamingTask>,
}

type Gate = Arc<tokio::sync::Mutex<()>>;

/// Sends user messages to the completion endpoint and records the
/// exchange in the content store.
///
/// Sends to the same thread are handled one at a time, in the order
/// they were issued. Sends to different threads run independently.
pub struct Messenger {
    content: ContentStore,
    settings: SettingsStore,
    client: CompletionClient,
    assistant_name: String,
    gates: Mutex<HashMap<String, Gate>>,
    naming: Arc<Mutex<HashMap<String, AbortHandle>>>,
}

impl Messenger {
    pub fn new(
        content: ContentStore,
        settings: SettingsStore,
        client: CompletionClient,
        assistant_name: &str,
    ) -> Self {
        Self {
            content,
            settings,
            client,
            assistant_name: assistant_name.to_string(),
            gates: Mutex::new(HashMap::new()),
            naming: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn new_thread(&self, title: &str) -> Thread {
        self.content.add_thread(title)
    }

    /// Removes the thread and stops a naming call still pending for it.
    pub fn remove_thread(&self, thread_id: &str) -> Option<Thread> {
        let pending = self
            .naming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(thread_id);
        if let Some(handle) = pending {
            tracing::debug!("Cancelling naming call for thread {}", thread_id);
            handle.abort();
        }
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(thread_id);

        self.content.remove_thread(thread_id)
    }

    /// Replaces every thread with the seed. Pending naming calls are
    /// stopped first, since the seed reuses a thread id they may target.
    pub fn reset_state(&self) {
        let pending: Vec<(String, AbortHandle)> = self
            .naming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        for (thread_id, handle) in pending {
            tracing::debug!("Cancelling naming call for thread {}", thread_id);
            handle.abort();
        }
        self.gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();

        self.content.reset_state();
    }

    /// Appends `text` as a user message, asks the endpoint for an
    /// answer and appends it. The first exchange of a thread also
    /// starts a naming call in the background.
    pub async fn send(&self, thread_id: &str, text: &str) -> Result<SendOutcome, ChatError> {
        let gate = self
            .gate(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        let _guard = gate.lock().await;

        // The thread may have been removed while waiting for the gate
        let thread = self
            .content
            .thread(thread_id)
            .ok_or_else(|| StoreError::ThreadNotFound(thread_id.to_string()))?;
        let was_empty = thread.messages.is_empty();

        let user_message = self
            .content
            .add_message(MessageDraft::user(text), thread_id)?;

        let token = self.settings.token();
        let resp = self
            .client
            .complete(text, &token, Some(thread.messages.as_slice()))
            .await?;

        if !resp.is_success {
            return Err(ChatError::Rejected(resp.raw().to_string()));
        }
        tracing::info!(
            "used_words_count: {:?}, used_tokens_count: {:?}",
            resp.used_words_count,
            resp.used_tokens_count
        );

        let answer = resp.text();
        if answer.is_empty() {
            return Ok(SendOutcome {
                user_message,
                reply: None,
                usage: resp.usage(),
                naming: None,
            });
        }

        let reply = self.content.add_message(
            MessageDraft::assistant(answer, &self.assistant_name),
            thread_id,
        )?;

        let naming = if was_empty {
            Some(self.spawn_naming(thread_id, text, token))
        } else {
            None
        };

        Ok(SendOutcome {
            user_message,
            reply: Some(reply),
            usage: resp.usage(),
            naming,
        })
    }

    fn spawn_naming(&self, thread_id: &str, first_message: &str, token: String) -> NamingTask {
        let naming = Arc::clone(&self.naming);
        let content = self.content.clone();
        let client = self.client.clone();
        let id = thread_id.to_string();
        let first_message = first_message.to_string();

        // Hold the lock across the spawn so the task can't remove its
        // entry before it is inserted
        let mut pending = naming.lock().unwrap_or_else(PoisonError::into_inner);
        let task_naming = Arc::clone(&naming);
        let handle = tokio::spawn(async move {
            let title = name_thread(content, client, token, id.clone(), first_message).await;
            task_naming
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&id);
            title
        });
        pending.insert(thread_id.to_string(), handle.abort_handle());

        NamingTask::new(handle)
    }

    /// `None` when the thread does not exist, so unknown ids never get
    /// a gate.
    fn gate(&self, thread_id: &str) -> Option<Gate> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if !gates.contains_key(thread_id) && self.content.thread(thread_id).is_none() {
            return None;
        }
        Some(Arc::clone(gates.entry(thread_id.to_string()).or_default()))
    }
}
