//! Scripted backend
//!
//! Replays canned event sequences instead of talking to a server. Used by
//! the daemon's offline mode and by tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::traits::{ChatBackend, ChatEvent, ChatRequest};

type Responder = dyn Fn(&ChatRequest) -> Vec<ChatEvent> + Send + Sync;

/// Backend answering every request from a script
#[derive(Clone)]
pub struct ScriptedBackend {
    responder: Arc<Responder>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
    unreachable: bool,
}

impl std::fmt::Debug for ScriptedBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedBackend")
            .field("requests", &self.requests.lock().len())
            .field("unreachable", &self.unreachable)
            .finish_non_exhaustive()
    }
}

impl ScriptedBackend {
    /// Answer every request with the same events
    #[must_use]
    pub fn new(events: Vec<ChatEvent>) -> Self {
        Self::with_responder(move |_| events.clone())
    }

    /// Answer each request with events computed from it
    pub fn with_responder<F>(responder: F) -> Self
    where
        F: Fn(&ChatRequest) -> Vec<ChatEvent> + Send + Sync + 'static,
    {
        Self {
            responder: Arc::new(responder),
            requests: Arc::new(Mutex::new(Vec::new())),
            unreachable: false,
        }
    }

    /// Reply with `text` wrapped in the given tags, one word per chunk
    #[must_use]
    pub fn reply(text: &str, start_tag: &str, end_tag: &str) -> Self {
        let events = tagged_reply(text, start_tag, end_tag);
        Self::new(events)
    }

    /// Echo every prompt back, wrapped in the given tags
    #[must_use]
    pub fn echo(start_tag: &str, end_tag: &str) -> Self {
        let start_tag = start_tag.to_string();
        let end_tag = end_tag.to_string();
        Self::with_responder(move |request| tagged_reply(&request.prompt, &start_tag, &end_tag))
    }

    /// A backend whose requests fail before any event is produced
    #[must_use]
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new(Vec::new())
        }
    }

    /// Every request received so far
    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }

    /// Number of requests received so far
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }
}

/// `started`, the tagged text split after each space, then `finished`
fn tagged_reply(text: &str, start_tag: &str, end_tag: &str) -> Vec<ChatEvent> {
    let raw = format!("{start_tag}{text}{end_tag}");

    let mut events = vec![ChatEvent::Started];
    events.extend(raw.split_inclusive(' ').map(ChatEvent::response));
    events.push(ChatEvent::Finished);
    events
}

#[async_trait]
impl ChatBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "Scripted"
    }

    async fn chat(&self, request: &ChatRequest) -> anyhow::Result<mpsc::Receiver<ChatEvent>> {
        self.requests.lock().push(request.clone());

        if self.unreachable {
            anyhow::bail!("Scripted backend is unreachable");
        }

        let events = (self.responder)(request);
        let (tx, rx) = mpsc::channel(events.len().max(1));

        for event in events {
            // Capacity covers the whole script, so this never waits.
            if tx.try_send(event).is_err() {
                break;
            }
        }

        Ok(rx)
    }
}
