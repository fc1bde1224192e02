//! Chat Backend Traits
//!
//! The conversation machine talks to its chat backend through
//! [`ChatBackend`]. A backend accepts one [`ChatRequest`] and answers with an
//! ordered stream of [`ChatEvent`]s:
//!
//! ```text
//! started ─► response* ─► finished
//!    └──────────┴───────► error
//! ```
//!
//! Events are delivered in order over a bounded channel. Whatever transport
//! the backend uses is its own business.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Event emitted by a chat backend while answering one request
///
/// Wire format is adjacently tagged JSON:
/// `{"event":"response","data":{"content":"..."}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum ChatEvent {
    /// The backend accepted the request and is about to stream
    Started,
    /// A chunk of the raw reply
    Response {
        /// Raw text, tags included
        content: String,
    },
    /// The reply is complete
    Finished,
    /// The exchange failed
    Error {
        /// Human readable cause
        message: String,
    },
}

impl ChatEvent {
    /// Create a response chunk
    pub fn response(content: impl Into<String>) -> Self {
        Self::Response {
            content: content.into(),
        }
    }

    /// Create an error event
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Whether no further events follow this one
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error { .. })
    }
}

/// One chat request with the full conversation so far
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    /// The new user prompt
    pub prompt: String,
    /// Earlier prompts, oldest first
    pub previous_prompts: Vec<String>,
    /// Earlier raw replies, oldest first
    pub previous_responses: Vec<String>,
}

impl ChatRequest {
    /// Create a request with no history
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    /// Attach the conversation history
    #[must_use]
    pub fn with_history(mut self, prompts: Vec<String>, responses: Vec<String>) -> Self {
        self.previous_prompts = prompts;
        self.previous_responses = responses;
        self
    }

    /// Earlier exchanges as `(prompt, response)` pairs
    ///
    /// Prompts without a matching response are left out.
    pub fn exchanges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.previous_prompts
            .iter()
            .zip(&self.previous_responses)
            .map(|(p, r)| (p.as_str(), r.as_str()))
    }
}

/// Chat backend trait
///
/// Implement this trait to plug a different chat provider into the
/// companion.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Get the backend name (e.g., "OpenAI", "Scripted")
    fn name(&self) -> &str;

    /// Send a request and get its event stream
    ///
    /// An `Err` means the request never got off the ground; failures after
    /// that are reported in-band as [`ChatEvent::Error`]. The channel closes
    /// after the terminal event.
    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<mpsc::Receiver<ChatEvent>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_chat_event_wire_format() {
        assert_eq!(
            serde_json::to_string(&ChatEvent::Started).unwrap(),
            r#"{"event":"started"}"#
        );
        assert_eq!(
            serde_json::to_string(&ChatEvent::response("hi")).unwrap(),
            r#"{"event":"response","data":{"content":"hi"}}"#
        );
        assert_eq!(
            serde_json::to_string(&ChatEvent::error("boom")).unwrap(),
            r#"{"event":"error","data":{"message":"boom"}}"#
        );

        let parsed: ChatEvent = serde_json::from_str(r#"{"event":"finished"}"#).unwrap();
        assert_eq!(parsed, ChatEvent::Finished);
    }

    #[test]
    fn test_terminal_events() {
        assert!(!ChatEvent::Started.is_terminal());
        assert!(!ChatEvent::response("x").is_terminal());
        assert!(ChatEvent::Finished.is_terminal());
        assert!(ChatEvent::error("x").is_terminal());
    }

    #[test]
    fn test_request_wire_format() {
        let request = ChatRequest::new("hello").with_history(vec!["a".into()], vec!["b".into()]);
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "prompt": "hello",
                "previousPrompts": ["a"],
                "previousResponses": ["b"],
            })
        );
    }

    #[test]
    fn test_exchanges_drop_unmatched_prompts() {
        let request = ChatRequest::new("now").with_history(
            vec!["p1".into(), "p2".into(), "p3".into()],
            vec!["r1".into()],
        );
        let pairs: Vec<_> = request.exchanges().collect();
        assert_eq!(pairs, vec![("p1", "r1")]);
    }
}
