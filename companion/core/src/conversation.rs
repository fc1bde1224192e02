//! Conversation State Machine
//!
//! Sequences one prompt/reply exchange at a time and makes the avatar react
//! to it.
//!
//! # State Flow
//!
//! ```text
//!          submit                started              finished
//!   Idle ──────────► Thinking ──────────► Responding ──────────► Done ─► Idle
//!    ▲                  │                     │ response (decode)
//!    │                  └────── error ────────┴────────► Error ─► Idle
//!    └── RESET (clears reply, input and responses; no backend call)
//! ```
//!
//! Each transition may await a body/face motion pair. Backend events of an
//! exchange are handled strictly in order: the next event is not received
//! until the previous handler, motions included, has completed.
//!
//! Submitting while an exchange is in flight does nothing. This is the only
//! admission control; there is no queue.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::backend::{ChatBackend, ChatEvent, ChatRequest};
use crate::messages::{CompanionMessage, ConversationState, ExchangeId};
use crate::motion::{MotionLibrary, MotionOutcome, MotionPair, MotionScheduler};
use crate::streaming::{TagStreamDecoder, DEFAULT_END_TAG, DEFAULT_START_TAG};
use crate::subscription::{IpcEvent, Subscription};

/// Default prompt that resets the conversation
pub const DEFAULT_RESET_SENTINEL: &str = "RESET";

/// Default text shown when an exchange fails
pub const DEFAULT_ERROR_MESSAGE: &str = "에러!";

/// Conversation machine settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationConfig {
    /// Tag opening the visible part of a reply
    pub start_tag: String,
    /// Tag closing the visible part of a reply
    pub end_tag: String,
    /// Prompt that resets instead of being sent
    pub reset_sentinel: String,
    /// Visible text after a failed exchange
    pub error_message: String,
    /// Reactions
    pub motions: MotionLibrary,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            start_tag: DEFAULT_START_TAG.to_string(),
            end_tag: DEFAULT_END_TAG.to_string(),
            reset_sentinel: DEFAULT_RESET_SENTINEL.to_string(),
            error_message: DEFAULT_ERROR_MESSAGE.to_string(),
            motions: MotionLibrary::default(),
        }
    }
}

/// Prompts and raw replies of every completed exchange, oldest first
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct History {
    prompts: Vec<String>,
    responses: Vec<String>,
}

impl History {
    /// Recorded prompts
    #[must_use]
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }

    /// Recorded raw replies
    #[must_use]
    pub fn responses(&self) -> &[String] {
        &self.responses
    }

    /// Append one completed exchange
    pub fn record(&mut self, prompt: String, response: String) {
        self.prompts.push(prompt);
        self.responses.push(response);
    }

    /// Forget replies but keep prompts
    pub fn clear_responses(&mut self) {
        self.responses.clear();
    }

    /// Whether every prompt has its reply
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.prompts.len() == self.responses.len()
    }
}

/// What happened to a submitted prompt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// An exchange was already in flight; nothing happened
    Busy,
    /// The prompt was empty; nothing happened
    Empty,
    /// The prompt was the reset sentinel
    Reset,
    /// The reply finished and was recorded
    Completed,
    /// The exchange failed
    Failed,
    /// The backend stream closed without a terminal event
    Unterminated,
}

#[derive(Debug, Default)]
struct ExchangeState {
    state: ConversationState,
    decoder: TagStreamDecoder,
    visible_response: String,
    input: String,
    history: History,
    pending_prompt: Option<String>,
}

enum Admission {
    Rejected(SubmitOutcome),
    Reset(Vec<CompanionMessage>),
    Start {
        exchange: ExchangeId,
        request: ChatRequest,
        messages: Vec<CompanionMessage>,
    },
}

/// The conversation state machine
///
/// Cheap to clone; clones share state.
pub struct ConversationMachine<B> {
    backend: Arc<B>,
    scheduler: MotionScheduler,
    config: Arc<ConversationConfig>,
    shared: Arc<Mutex<ExchangeState>>,
    tx: mpsc::Sender<CompanionMessage>,
}

impl<B> Clone for ConversationMachine<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            scheduler: self.scheduler.clone(),
            config: Arc::clone(&self.config),
            shared: Arc::clone(&self.shared),
            tx: self.tx.clone(),
        }
    }
}

impl<B: ChatBackend> ConversationMachine<B> {
    /// Create an idle machine
    pub fn new(
        backend: B,
        scheduler: MotionScheduler,
        config: ConversationConfig,
        tx: mpsc::Sender<CompanionMessage>,
    ) -> Self {
        let decoder = TagStreamDecoder::new(config.start_tag.clone(), config.end_tag.clone());
        Self {
            backend: Arc::new(backend),
            scheduler,
            config: Arc::new(config),
            shared: Arc::new(Mutex::new(ExchangeState {
                decoder,
                ..Default::default()
            })),
            tx,
        }
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Current state
    #[must_use]
    pub fn state(&self) -> ConversationState {
        self.shared.lock().state
    }

    /// Text currently shown as the reply
    #[must_use]
    pub fn visible_response(&self) -> String {
        self.shared.lock().visible_response.clone()
    }

    /// Everything the backend sent during the current or last exchange
    #[must_use]
    pub fn raw_response(&self) -> String {
        self.shared.lock().decoder.raw().to_string()
    }

    /// Text in the input box
    #[must_use]
    pub fn input(&self) -> String {
        self.shared.lock().input.clone()
    }

    /// Completed exchanges
    #[must_use]
    pub fn history(&self) -> History {
        self.shared.lock().history.clone()
    }

    /// The motion scheduler this machine drives
    #[must_use]
    pub fn scheduler(&self) -> &MotionScheduler {
        &self.scheduler
    }

    /// Settings
    #[must_use]
    pub fn config(&self) -> &ConversationConfig {
        &self.config
    }

    /// Record what the user is typing
    pub fn set_input(&self, text: impl Into<String>) {
        self.shared.lock().input = text.into();
    }

    // ========================================================================
    // Avatar Interaction
    // ========================================================================

    /// The avatar finished loading: play the greeting motion
    pub async fn on_avatar_ready(&self) -> MotionOutcome {
        self.scheduler.play_initial(&self.config.motions).await
    }

    /// The avatar was clicked: play a random idle pair
    ///
    /// Returns `None` without playing anything while a chat is in flight.
    pub async fn on_avatar_clicked(&self) -> Option<(MotionOutcome, MotionOutcome)> {
        if self.state().is_busy() {
            tracing::debug!("Click ignored while chatting");
            return None;
        }
        Some(self.scheduler.play_random_pair(&self.config.motions).await)
    }

    // ========================================================================
    // Exchanges
    // ========================================================================

    /// Submit a prompt and run its exchange to the end
    pub async fn submit(&self, prompt: impl Into<String>) -> SubmitOutcome {
        let (exchange, request) = match self.admit(prompt.into()) {
            Admission::Rejected(outcome) => return outcome,
            Admission::Reset(messages) => {
                self.publish(messages).await;
                return SubmitOutcome::Reset;
            }
            Admission::Start {
                exchange,
                request,
                messages,
            } => {
                self.publish(messages).await;
                (exchange, request)
            }
        };

        tracing::info!(
            %exchange,
            history = request.previous_prompts.len(),
            "Exchange started"
        );

        self.play_pair(&self.config.motions.thinking).await;

        let mut events = match self.backend.chat(&request).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(
                    %exchange,
                    backend = self.backend.name(),
                    error = %e,
                    "Chat backend unreachable"
                );
                self.handle_event(&exchange, ChatEvent::error(e.to_string()))
                    .await;
                return SubmitOutcome::Failed;
            }
        };

        while let Some(event) = events.recv().await {
            let outcome = match event {
                ChatEvent::Finished => Some(SubmitOutcome::Completed),
                ChatEvent::Error { .. } => Some(SubmitOutcome::Failed),
                _ => None,
            };

            self.handle_event(&exchange, event).await;

            if let Some(outcome) = outcome {
                return outcome;
            }
        }

        tracing::warn!(
            %exchange,
            state = ?self.state(),
            "Chat stream closed without a terminal event"
        );
        SubmitOutcome::Unterminated
    }

    /// Run every `chat` event of a subscription through [`Self::submit`]
    ///
    /// Submissions run concurrently on the current task, so a prompt that
    /// arrives mid-exchange hits the busy guard instead of waiting its turn.
    /// Returns once the subscription's registry is gone and every started
    /// submission has settled.
    pub async fn serve(&self, mut subscription: Subscription) {
        let mut in_flight = FuturesUnordered::new();

        loop {
            tokio::select! {
                event = subscription.recv() => match event {
                    Some(IpcEvent::Chat { message }) => in_flight.push(self.submit(message)),
                    Some(other) => tracing::debug!(event = ?other, "Ignoring IPC event"),
                    None => break,
                },
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    tracing::debug!(?outcome, "Submission settled");
                }
            }
        }

        while let Some(outcome) = in_flight.next().await {
            tracing::debug!(?outcome, "Submission settled");
        }
    }

    fn admit(&self, prompt: String) -> Admission {
        let mut shared = self.shared.lock();

        if shared.state.is_busy() {
            tracing::debug!(state = ?shared.state, "Submit ignored, exchange in flight");
            return Admission::Rejected(SubmitOutcome::Busy);
        }

        if prompt.is_empty() {
            return Admission::Rejected(SubmitOutcome::Empty);
        }

        if prompt == self.config.reset_sentinel {
            shared.visible_response.clear();
            shared.input.clear();
            shared.history.clear_responses();
            shared.decoder.reset();
            tracing::info!(
                prompts = shared.history.prompts().len(),
                "Conversation reset"
            );

            return Admission::Reset(vec![
                CompanionMessage::Response {
                    exchange: None,
                    text: String::new(),
                },
                CompanionMessage::InputCleared,
                history_changed(&shared.history),
            ]);
        }

        shared.decoder.reset();
        shared.visible_response.clear();
        shared.state = ConversationState::Thinking;
        shared.pending_prompt = Some(prompt.clone());

        let exchange = ExchangeId::new();
        let request = ChatRequest::new(prompt).with_history(
            shared.history.prompts().to_vec(),
            shared.history.responses().to_vec(),
        );

        Admission::Start {
            messages: vec![
                CompanionMessage::Response {
                    exchange: Some(exchange.clone()),
                    text: String::new(),
                },
                CompanionMessage::State {
                    state: ConversationState::Thinking,
                },
            ],
            exchange,
            request,
        }
    }

    async fn handle_event(&self, exchange: &ExchangeId, event: ChatEvent) {
        match event {
            ChatEvent::Started => {
                let messages = self.begin_responding();
                self.publish(messages).await;
                self.play_pair(&self.config.motions.acknowledged).await;
            }
            ChatEvent::Response { content } => {
                let messages = self.append_chunk(exchange, &content);
                self.publish(messages).await;
            }
            ChatEvent::Finished => {
                let messages = self.finish(exchange);
                self.publish(messages).await;
                self.play_pair(&self.config.motions.satisfied).await;
            }
            ChatEvent::Error { message } => {
                tracing::warn!(%exchange, error = %message, "Exchange failed");
                let messages = self.fail(exchange);
                self.publish(messages).await;
                self.play_pair(&self.config.motions.failed).await;
            }
        }
    }

    fn begin_responding(&self) -> Vec<CompanionMessage> {
        let mut shared = self.shared.lock();
        shared.state = ConversationState::Responding;
        vec![CompanionMessage::State {
            state: ConversationState::Responding,
        }]
    }

    fn append_chunk(&self, exchange: &ExchangeId, content: &str) -> Vec<CompanionMessage> {
        let mut shared = self.shared.lock();
        let mut messages = Vec::with_capacity(2);

        if shared.state == ConversationState::Thinking {
            tracing::debug!(%exchange, "Response arrived before started");
            shared.state = ConversationState::Responding;
            messages.push(CompanionMessage::State {
                state: ConversationState::Responding,
            });
        }

        let text = shared.decoder.feed(content).to_string();
        shared.visible_response.clone_from(&text);
        tracing::trace!(%exchange, chars = text.len(), "Visible response updated");

        messages.push(CompanionMessage::Response {
            exchange: Some(exchange.clone()),
            text,
        });
        messages
    }

    fn finish(&self, exchange: &ExchangeId) -> Vec<CompanionMessage> {
        let mut shared = self.shared.lock();

        let prompt = shared.pending_prompt.take().unwrap_or_default();
        let raw = shared.decoder.raw().to_string();
        shared.history.record(prompt, raw);
        shared.input.clear();
        shared.state = ConversationState::Done;

        tracing::info!(
            %exchange,
            exchanges = shared.history.prompts().len(),
            "Exchange finished"
        );

        let messages = vec![
            CompanionMessage::State {
                state: ConversationState::Done,
            },
            history_changed(&shared.history),
            CompanionMessage::InputCleared,
            CompanionMessage::State {
                state: ConversationState::Idle,
            },
        ];
        shared.state = ConversationState::Idle;
        messages
    }

    fn fail(&self, exchange: &ExchangeId) -> Vec<CompanionMessage> {
        let mut shared = self.shared.lock();

        shared.pending_prompt = None;
        shared.visible_response.clone_from(&self.config.error_message);
        shared.input.clear();
        shared.state = ConversationState::Error;

        let messages = vec![
            CompanionMessage::Response {
                exchange: Some(exchange.clone()),
                text: self.config.error_message.clone(),
            },
            CompanionMessage::InputCleared,
            CompanionMessage::State {
                state: ConversationState::Error,
            },
            CompanionMessage::State {
                state: ConversationState::Idle,
            },
        ];
        shared.state = ConversationState::Idle;
        messages
    }

    async fn play_pair(&self, pair: &MotionPair) -> (MotionOutcome, MotionOutcome) {
        self.send(CompanionMessage::MotionStarted { pair: pair.clone() })
            .await;
        self.scheduler.do_motion_pair(pair).await
    }

    async fn publish(&self, messages: Vec<CompanionMessage>) {
        for msg in messages {
            self.send(msg).await;
        }
    }

    /// Send a message to the presentation layer
    async fn send(&self, msg: CompanionMessage) {
        if let Err(e) = self.tx.send(msg).await {
            tracing::warn!("Failed to send message to presentation layer: {}", e);
        }
    }
}

fn history_changed(history: &History) -> CompanionMessage {
    CompanionMessage::HistoryChanged {
        prompts: history.prompts().len(),
        responses: history.responses().len(),
    }
}
