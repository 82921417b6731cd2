use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chat::{Author, Message};

pub const DEFAULT_COMPLETION_URL: &str = "https://ask.chadgpt.ru/api/public/gpt-4o-mini";

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq)]
pub enum HistoryRole {
    #[serde(rename = "user")]
    User,
    #[serde(rename = "assistant")]
    Assistant,
}

#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        // The endpoint only knows two roles so system notes are sent
        // as if the assistant wrote them
        let role = match message.author {
            Author::User => HistoryRole::User,
            Author::Assistant | Author::System => HistoryRole::Assistant,
        };
        HistoryEntry {
            role,
            content: message.text.clone(),
        }
    }
}

#[derive(Serialize, Debug)]
pub struct CompletionRequest<'a> {
    pub message: &'a str,
    pub api_key: &'a str,
    pub history: Vec<HistoryEntry>,
}

impl<'a> CompletionRequest<'a> {
    pub fn new(prompt: &'a str, token: &'a str, history: Option<&[Message]>) -> Self {
        let history = history
            .map(|messages| messages.iter().map(HistoryEntry::from).collect())
            .unwrap_or_default();
        Self {
            message: prompt,
            api_key: token,
            history,
        }
    }
}

// {
//     "is_success": true,
//     "response": "Hello! How can I help?",
//     "used_words_count": 12,
//     "used_tokens_count": 31
// }
#[derive(Clone, Serialize, Deserialize, Debug, Default)]
pub struct CompletionResponse {
    #[serde(default)]
    pub is_success: bool,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub used_words_count: Option<u64>,
    #[serde(default)]
    pub used_tokens_count: Option<u64>,
    /// Anything else the endpoint sent, e.g. an error description.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
    /// The body exactly as received.
    #[serde(skip)]
    body: String,
}

impl CompletionResponse {
    /// The answer text, empty when the endpoint sent none.
    pub fn text(&self) -> &str {
        self.response.as_deref().unwrap_or("")
    }

    pub fn usage(&self) -> Usage {
        Usage {
            words: self.used_words_count,
            tokens: self.used_tokens_count,
        }
    }

    /// The body as the endpoint sent it.
    pub fn raw(&self) -> &str {
        &self.body
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Usage {
    pub words: Option<u64>,
    pub tokens: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("API error: {status} - {reason}")]
    Status { status: u16, reason: String },

    #[error("Request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[source] serde_json::Error),
}

impl TransportError {
    /// HTTP status when the endpoint answered with a non-2xx code.
    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Status { status, .. } => Some(*status),
            TransportError::Network(e) => e.status().map(|s| s.as_u16()),
            TransportError::Decode(_) => None,
        }
    }
}

/// Posts prompts to the completion endpoint. Cheap to clone, clones
/// share the connection pool.
#[derive(Clone, Debug)]
pub struct CompletionClient {
    endpoint: String,
    http: reqwest::Client,
}

impl CompletionClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Sends a single prompt along with the prior messages of the
    /// thread and returns the parsed response. One round trip, no
    /// retries.
    pub async fn complete(
        &self,
        prompt: &str,
        token: &str,
        history: Option<&[Message]>,
    ) -> Result<CompletionResponse, TransportError> {
        let payload = CompletionRequest::new(prompt, token, history);

        let result = self.send(&payload).await;
        if let Err(e) = &result {
            tracing::error!("Completion request failed: {}", e);
        }
        result
    }

    async fn send(
        &self,
        payload: &CompletionRequest<'_>,
    ) -> Result<CompletionResponse, TransportError> {
        let response = self
            .http
            .post(&self.endpoint)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .json(payload)
            .send()
            .await
            .map_err(TransportError::Network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
            });
        }

        tracing::debug!("Completion response status: {}", status);
        let body = response.text().await.map_err(TransportError::Network)?;
        let parsed: CompletionResponse =
            serde_json::from_str(&body).map_err(TransportError::Decode)?;
        Ok(CompletionResponse { body, ..parsed })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::MessageDraft;
    use chrono::Utc;
    use mockito::Matcher;
    use serde_json::json;

    fn message(author: Author, text: &str) -> Message {
        let draft = match author {
            Author::User => MessageDraft::user(text),
            Author::Assistant => MessageDraft::assistant(text, "gpt-4o-mini"),
            Author::System => MessageDraft::new().text(text),
        };
        draft.materialize("t1", Utc::now())
    }

    #[test]
    fn it_maps_history_to_two_roles() {
        let history = vec![
            message(Author::User, "Hi"),
            message(Author::Assistant, "Hello!"),
            message(Author::System, "Something goes wrong"),
        ];
        let request = CompletionRequest::new("Next", "token", Some(history.as_slice()));

        let roles: Vec<HistoryRole> = request.history.iter().map(|h| h.role).collect();
        assert_eq!(
            roles,
            vec![
                HistoryRole::User,
                HistoryRole::Assistant,
                HistoryRole::Assistant
            ]
        );
        assert_eq!(
            json!(request),
            json!({
                "message": "Next",
                "api_key": "token",
                "history": [
                    {"role": "user", "content": "Hi"},
                    {"role": "assistant", "content": "Hello!"},
                    {"role": "assistant", "content": "Something goes wrong"},
                ]
            })
        );
    }

    #[test]
    fn it_sends_empty_history_when_none_given() {
        let request = CompletionRequest::new("Hi", "token", None);
        assert_eq!(json!(request)["history"], json!([]));
    }

    #[tokio::test]
    async fn it_posts_prompt_and_parses_response() {
        let mut server = mockito::Server::new_async().await;

        let mock = server
            .mock("POST", "/api/public/gpt-4o-mini")
            .match_header("content-type", "application/json")
            .match_header("accept", "application/json")
            .match_body(Matcher::Json(json!({
                "message": "Hi",
                "api_key": "test-token",
                "history": [{"role": "user", "content": "Earlier"}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{
                    "is_success": true,
                    "response": "Hello! How can I help?",
                    "used_words_count": 12,
                    "used_tokens_count": 31
                }"#,
            )
            .create_async()
            .await;

        let client = CompletionClient::new(&format!("{}/api/public/gpt-4o-mini", server.url()));
        let history = vec![message(Author::User, "Earlier")];
        let resp = client
            .complete("Hi", "test-token", Some(history.as_slice()))
            .await
            .expect("Completion should succeed");

        mock.assert_async().await;
        assert!(resp.is_success);
        assert_eq!(resp.text(), "Hello! How can I help?");
        assert_eq!(
            resp.usage(),
            Usage {
                words: Some(12),
                tokens: Some(31)
            }
        );
    }

    #[tokio::test]
    async fn it_keeps_unknown_fields_of_failed_responses() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"is_success": false, "error_message": "Invalid api key"}"#)
            .create_async()
            .await;

        let client = CompletionClient::new(&server.url());
        let resp = client.complete("Hi", "bad-token", None).await.unwrap();

        assert!(!resp.is_success);
        assert_eq!(resp.text(), "");
        assert_eq!(resp.extra["error_message"], json!("Invalid api key"));
        assert_eq!(
            resp.raw(),
            r#"{"is_success": false, "error_message": "Invalid api key"}"#
        );
    }

    #[tokio::test]
    async fn it_fails_with_status_on_server_error() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/")
            .with_status(500)
            .with_body("oops")
            .create_async()
            .await;

        let client = CompletionClient::new(&server.url());
        let err = client.complete("Hi", "token", None).await.unwrap_err();

        assert_eq!(err.status(), Some(500));
        match err {
            TransportError::Status { status, reason } => {
                assert_eq!(status, 500);
                assert_eq!(reason, "Internal Server Error");
            }
            other => panic!("Expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn it_fails_when_body_is_not_json() {
        let mut server = mockito::Server::new_async().await;

        let _mock = server
            .mock("POST", "/")
            .with_status(200)
            .with_body("<html>maintenance</html>")
            .create_async()
            .await;

        let client = CompletionClient::new(&server.url());
        let err = client.complete("Hi", "token", None).await.unwrap_err();
        assert!(matches!(err, TransportError::Decode(_)));
    }

    #[tokio::test]
    async fn it_fails_when_endpoint_is_unreachable() {
        // Nothing listens on port 1
        let client = CompletionClient::new("http://127.0.0.1:1/complete");
        let err = client.complete("Hi", "token", None).await.unwrap_err();

        assert!(matches!(err, TransportError::Network(_)));
        assert_eq!(err.status(), None);
    }
}
