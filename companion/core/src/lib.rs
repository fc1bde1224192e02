//! Companion Core - Headless Conversation and Motion Engine for an Animated Avatar
//!
//! This crate drives an animated chat companion: it streams a reply from a
//! chat backend, decodes the part of it meant to be shown, and makes the
//! avatar react with motions while it does. It knows nothing about
//! rendering; a window, a terminal or a test can sit on top of it.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Presentation Layer                             │
//! │        (avatar window, input box, terminal, headless test)         │
//! └───────────┬───────────────────────────────────────▲───────────────┘
//!             │ IpcEvent (up)                          │ CompanionMessage (down)
//! ┌───────────▼───────────────────────────────────────┴───────────────┐
//! │                       COMPANION CORE                               │
//! │  ┌──────────────────────────────────────────────────────────────┐ │
//! │  │                   ConversationMachine                         │ │
//! │  │  ┌──────────────┐  ┌─────────────────┐  ┌─────────────────┐  │ │
//! │  │  │ ChatBackend  │  │ TagStreamDecoder│  │ MotionScheduler │  │ │
//! │  │  │ (OpenAI/...) │  │  <response>…    │  │  lane 0 │ lane 1│  │ │
//! │  │  └──────────────┘  └─────────────────┘  └────────┬────────┘  │ │
//! │  └──────────────────────────────────────────────────┼───────────┘ │
//! └─────────────────────────────────────────────────────┼─────────────┘
//!                                                       │ start_motion / poll
//!                                             ┌─────────▼─────────┐
//!                                             │ AnimationRuntime  │
//!                                             └───────────────────┘
//! ```
//!
//! # Key Types
//!
//! - [`ConversationMachine`]: runs prompt/reply exchanges and drives motions
//! - [`MotionScheduler`]: plays motions on lanes, completion as futures
//! - [`TagStreamDecoder`]: extracts the visible reply from a chunked stream
//! - [`ChatBackend`]: trait for chat providers
//! - [`ListenerRegistry`]: exclusive subscription to forwarded IPC events
//! - [`CompanionConfigFile`]: configuration from file, environment and CLI
//!
//! # Quick Start
//!
//! ```ignore
//! use companion_core::{
//!     ConversationConfig, ConversationMachine, MotionScheduler, ScriptedBackend,
//!     SimulatedRuntime,
//! };
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel(100);
//! let scheduler = MotionScheduler::with_runtime(SimulatedRuntime::default());
//! let machine = ConversationMachine::new(
//!     ScriptedBackend::echo("<response>", "</response>"),
//!     scheduler.clone(),
//!     ConversationConfig::default(),
//!     tx,
//! );
//!
//! // Somewhere, once per frame:
//! scheduler.tick();
//!
//! machine.submit("hello").await;
//! ```
//!
//! # Module Overview
//!
//! - [`motion`]: lanes, the scheduler, the motion library, a simulated runtime
//! - [`streaming`]: the tag-delimited stream decoder
//! - [`conversation`]: the conversation state machine
//! - [`backend`]: chat backend abstraction (OpenAI-compatible, scripted)
//! - [`messages`]: messages from the core to the presentation layer
//! - [`subscription`]: IPC event listener registration
//! - [`config`]: TOML/environment/CLI configuration

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod config;
pub mod conversation;
pub mod messages;
pub mod motion;
pub mod streaming;
pub mod subscription;

// Re-exports for convenience
pub use backend::{ChatBackend, ChatEvent, ChatRequest, OpenAiBackend, ScriptedBackend};
pub use config::{
    load_config, load_config_from_path, CompanionConfigFile, ConfigError, ConfigOverrides,
    ConfigSource,
};
pub use conversation::{ConversationConfig, ConversationMachine, History, SubmitOutcome};
pub use messages::{CompanionMessage, ConversationState, ExchangeId};
pub use motion::{
    AnimationRuntime, MotionCompletion, MotionHandle, MotionLibrary, MotionOutcome, MotionPair,
    MotionPriority, MotionRequest, MotionScheduler, SimulatedRuntime,
};
pub use streaming::TagStreamDecoder;
pub use subscription::{IpcEvent, ListenerRegistry, Subscription, SubscriptionError};
