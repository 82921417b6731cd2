//! The core models for threads of messages.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Title given to new threads until a better one is generated.
pub const DEFAULT_THREAD_TITLE: &str = "New chat";

/// Id of the thread the store is seeded with.
pub const SEED_THREAD_ID: &str = "1";

/// Text used when a message is added without any.
pub const FALLBACK_MESSAGE_TEXT: &str = "Something goes wrong";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum Author {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
    #[serde(rename = "system")]
    System,
}

impl Author {
    pub fn label(&self) -> &'static str {
        match self {
            Author::User => "user",
            Author::Assistant => "assistant",
            Author::System => "System",
        }
    }
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Message {
    pub id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
    pub author: Author,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub thread_id: String,
}

impl Message {
    /// Name shown next to the message, e.g. the model that wrote it.
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .unwrap_or_else(|| self.author.label())
    }
}

/// A message before it is stored. Missing fields are filled in by
/// `materialize`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MessageDraft {
    pub id: Option<String>,
    pub text: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub author: Option<Author>,
    pub display_name: Option<String>,
}

impl MessageDraft {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(text: &str) -> Self {
        Self::new().author(Author::User).text(text)
    }

    pub fn assistant(text: &str, display_name: &str) -> Self {
        Self::new()
            .author(Author::Assistant)
            .display_name(display_name)
            .text(text)
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    pub fn author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    pub fn display_name(mut self, display_name: &str) -> Self {
        self.display_name = Some(display_name.to_string());
        self
    }

    pub fn materialize(self, thread_id: &str, now: DateTime<Utc>) -> Message {
        Message {
            id: self.id.unwrap_or_else(|| Uuid::new_v4().to_string()),
            text: self
                .text
                .unwrap_or_else(|| FALLBACK_MESSAGE_TEXT.to_string()),
            created_at: self.created_at.unwrap_or(now),
            author: self.author.unwrap_or(Author::System),
            display_name: self.display_name,
            thread_id: thread_id.to_string(),
        }
    }
}

/// Whether a thread still carries its placeholder title.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, Default, PartialEq, Eq)]
pub enum TitleState {
    #[default]
    #[serde(rename = "default")]
    Default,
    #[serde(rename = "named")]
    Named,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Thread {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub title_state: TitleState,
    #[serde(default)]
    pub messages: Vec<Message>,
}

impl Thread {
    pub fn new(title: &str) -> Self {
        Self::with_id(&Uuid::new_v4().to_string(), title)
    }

    pub fn with_id(id: &str, title: &str) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            title_state: TitleState::Default,
            messages: Vec::new(),
        }
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    /// Plain text rendering of the conversation, oldest first, used
    /// for copying or sharing a thread.
    pub fn transcript(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}:\n{}\n\n", m.display_name(), m.text))
            .collect()
    }
}

/// The state every fresh install and every reset starts from.
pub fn seed_threads() -> Vec<Thread> {
    vec![Thread::with_id(SEED_THREAD_ID, DEFAULT_THREAD_TITLE)]
}
