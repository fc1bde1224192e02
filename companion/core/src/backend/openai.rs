//! OpenAI-compatible Backend Implementation
//!
//! Streams chat completions from any server speaking the OpenAI
//! `/chat/completions` protocol.
//!
//! # Conversation Layout
//!
//! Each request is sent as:
//!
//! 1. the system prompt,
//! 2. every earlier exchange as a user/assistant message pair,
//! 3. the new prompt wrapped in `<user_input>` tags.
//!
//! # Stream Format
//!
//! The server answers with server-sent events. Every `data:` line carries
//! one JSON chunk whose `choices[].delta.content` is the next piece of the
//! reply. The literal `data: [DONE]` ends the stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::mpsc;

use super::traits::{ChatBackend, ChatEvent, ChatRequest};

/// Default API base URL
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default chat model
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Built-in system prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a cheerful animated companion living on the \
user's desktop. The user's message is wrapped in <user_input> tags. Think about your answer \
first if you need to, then put the words you actually say to the user inside \
<response></response> tags. Only the text inside the response tags is shown, so keep it \
short, warm and conversational.";

/// OpenAI-compatible streaming backend
#[derive(Clone)]
pub struct OpenAiBackend {
    /// API base URL, without the endpoint path
    api_base: String,
    /// Bearer token
    api_key: Option<String>,
    /// Model identifier
    model: String,
    /// Prepended to every conversation
    system_prompt: String,
    /// HTTP client
    http_client: reqwest::Client,
}

impl std::fmt::Debug for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiBackend")
            .field("api_base", &self.api_base)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiBackend {
    /// Create a new backend
    pub fn new(
        api_base: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        request_timeout: Duration,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            api_base: api_base.into(),
            api_key,
            model: model.into(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            http_client,
        })
    }

    /// Replace the system prompt
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    /// Model identifier
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get chat completions endpoint URL
    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.api_base.trim_end_matches('/'))
    }

    /// Build the message list for one request
    fn build_messages(&self, request: &ChatRequest) -> Vec<Value> {
        let mut messages = vec![serde_json::json!({
            "role": "system",
            "content": self.system_prompt,
        })];

        for (prompt, response) in request.exchanges() {
            messages.push(serde_json::json!({ "role": "user", "content": prompt }));
            messages.push(serde_json::json!({ "role": "assistant", "content": response }));
        }

        messages.push(serde_json::json!({
            "role": "user",
            "content": format!("<user_input>{}</user_input>", request.prompt),
        }));

        messages
    }

    fn build_body(&self, request: &ChatRequest) -> Value {
        serde_json::json!({
            "model": self.model,
            "messages": self.build_messages(request),
            "stream": true,
        })
    }
}

/// One parsed server-sent event line
#[derive(Clone, Debug, PartialEq, Eq)]
enum SseLine {
    /// Reply text from one chunk
    Delta(String),
    /// The `[DONE]` terminator
    Done,
    /// The server reported an error inside the stream
    Failure(String),
}

/// Byte buffer cut into lines
///
/// Network chunks can end inside a multibyte character. Bytes are only
/// decoded once their whole line has arrived.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next complete line, trimmed, without its newline
    fn next_line(&mut self) -> Option<String> {
        let pos = self.pending.iter().position(|&b| b == b'\n')?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Some(String::from_utf8_lossy(&line).trim().to_string())
    }
}

/// Parse one line of the event stream
///
/// Comments, blank lines, non-data fields and chunks without content yield
/// `None`.
fn parse_sse_line(line: &str) -> Option<SseLine> {
    let payload = line.strip_prefix("data:")?.trim();

    if payload == "[DONE]" {
        return Some(SseLine::Done);
    }

    let data: Value = serde_json::from_str(payload).ok()?;

    if let Some(error) = data.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("unknown error")
            .to_string();
        return Some(SseLine::Failure(message));
    }

    let delta: String = data
        .get("choices")?
        .as_array()?
        .iter()
        .filter_map(|choice| choice.get("delta")?.get("content")?.as_str())
        .collect();

    (!delta.is_empty()).then_some(SseLine::Delta(delta))
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "OpenAI"
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<mpsc::Receiver<ChatEvent>> {
        let (tx, rx) = mpsc::channel(100);

        let mut http_request = self
            .http_client
            .post(self.completions_url())
            .json(&self.build_body(request));

        if let Some(ref key) = self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        tracing::debug!(
            model = %self.model,
            history = request.previous_responses.len(),
            "Sending chat request"
        );

        let response = http_request.send().await?;

        // Check for HTTP errors
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Chat backend returned {status}: {body}");
        }

        let mut stream = response.bytes_stream();
        tx.send(ChatEvent::Started).await?;

        // Spawn task to process stream
        tokio::spawn(async move {
            let mut lines = LineBuffer::default();

            while let Some(chunk) = stream.next().await {
                let bytes = match chunk {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!(error = %e, "Chat stream failed");
                        let _ = tx.send(ChatEvent::error(e.to_string())).await;
                        return;
                    }
                };

                lines.push(&bytes);

                while let Some(line) = lines.next_line() {
                    let event = match parse_sse_line(&line) {
                        Some(SseLine::Delta(content)) => ChatEvent::response(content),
                        Some(SseLine::Failure(message)) => {
                            let _ = tx.send(ChatEvent::error(message)).await;
                            return;
                        }
                        Some(SseLine::Done) => {
                            let _ = tx.send(ChatEvent::Finished).await;
                            return;
                        }
                        None => continue,
                    };

                    if tx.send(event).await.is_err() {
                        // Receiver dropped, stop streaming
                        return;
                    }
                }
            }

            // Stream ended without [DONE]
            let _ = tx.send(ChatEvent::Finished).await;
        });

        Ok(rx)
    }
}
