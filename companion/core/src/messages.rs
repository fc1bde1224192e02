//! Companion Messages
//!
//! Notifications sent from the conversation machine to whatever presents
//! the avatar (a window, a terminal, a test). The presentation layer holds
//! no conversation logic; it renders what these messages tell it.

use serde::{Deserialize, Serialize};

use crate::motion::MotionPair;

/// Messages from the conversation machine to the presentation layer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CompanionMessage {
    // ============================================
    // Conversation Messages
    // ============================================
    /// The conversation state changed
    State {
        /// New state
        state: ConversationState,
    },

    /// The visible reply changed
    Response {
        /// Exchange the text belongs to (absent for resets)
        exchange: Option<ExchangeId>,
        /// Full visible text, not a delta
        text: String,
    },

    /// The input box should be emptied
    InputCleared,

    /// History lengths changed
    HistoryChanged {
        /// Number of recorded prompts
        prompts: usize,
        /// Number of recorded responses
        responses: usize,
    },

    // ============================================
    // Avatar Directives
    // ============================================
    /// A body/face reaction started playing
    MotionStarted {
        /// The pair being played
        pair: MotionPair,
    },
}

/// Exchange identifier
///
/// One exchange is one prompt and everything the backend sent for it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub String);

impl ExchangeId {
    /// Generate a new unique exchange ID
    pub fn new() -> Self {
        use std::sync::atomic::{AtomicU64, Ordering};
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        let id = COUNTER.fetch_add(1, Ordering::SeqCst);
        Self(format!("exchange_{id}"))
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Conversation states
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConversationState {
    /// Ready for input
    #[default]
    Idle,
    /// Prompt submitted, waiting for the backend
    Thinking,
    /// Streaming a reply
    Responding,
    /// Reply finished
    Done,
    /// The exchange failed
    Error,
}

impl ConversationState {
    /// Human-readable description
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Thinking => "Thinking...",
            Self::Responding => "Responding...",
            Self::Done => "Done",
            Self::Error => "Error",
        }
    }

    /// Whether an exchange is in flight
    #[must_use]
    pub fn is_busy(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}
