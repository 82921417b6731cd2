//! Best-effort naming of a thread from its first exchange.
use tokio::task::JoinHandle;

use super::store::ContentStore;
use crate::completion::CompletionClient;

/// The meta-prompt asking the model to name a thread after the first
/// thing the user sent to it.
pub fn naming_prompt(first_message: &str) -> String {
    format!(
        "User sent this to thread:\n{}\ncreate short name for this thread. Answer with just it",
        first_message
    )
}

/// Models like to wrap titles in quotes or add a trailing newline.
pub fn clean_title(answer: &str) -> String {
    answer.trim().trim_matches('"').trim().to_string()
}

/// A naming call running in the background. Dropping it does not stop
/// the call.
#[derive(Debug)]
pub struct NamingTask {
    handle: JoinHandle<Option<String>>,
}

impl NamingTask {
    pub(super) fn new(handle: JoinHandle<Option<String>>) -> Self {
        Self { handle }
    }

    /// Waits for the call and returns the applied title, if any. An
    /// aborted task yields `None`.
    pub async fn wait(self) -> Option<String> {
        self.handle.await.ok().flatten()
    }
}

/// Asks the model for a title and applies it. Every failure is logged
/// and swallowed, leaving the thread with its current title.
pub(super) async fn name_thread(
    content: ContentStore,
    client: CompletionClient,
    token: String,
    thread_id: String,
    first_message: String,
) -> Option<String> {
    let prompt = naming_prompt(&first_message);

    let resp = match client.complete(&prompt, &token, None).await {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!("Naming call for thread {} failed: {}", thread_id, e);
            return None;
        }
    };
    if !resp.is_success {
        tracing::debug!(
            "Naming call for thread {} was rejected: {}",
            thread_id,
            resp.raw()
        );
        return None;
    }

    let title = clean_title(resp.text());
    if title.is_empty() {
        return None;
    }

    match content.apply_generated_title(&thread_id, &title) {
        Ok(true) => {
            tracing::debug!("Named thread {}: {}", thread_id, title);
            Some(title)
        }
        Ok(false) => None,
        Err(e) => {
            tracing::debug!("Dropping generated title: {}", e);
            None
        }
    }
}
