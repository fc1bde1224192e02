//! Chat Backend Integration
//!
//! This module provides abstracted access to chat backends through a common
//! trait interface.
//!
//! # Available Backends
//!
//! - **OpenAI**: any OpenAI-compatible `/chat/completions` server (default)
//! - **Scripted**: canned replies for offline runs and tests
//!
//! # Usage
//!
//! ```ignore
//! use companion_core::backend::{ChatBackend, ChatRequest, OpenAiBackend};
//!
//! let backend = OpenAiBackend::new(api_base, api_key, "gpt-4o", timeout)?;
//! let mut rx = backend.chat(&ChatRequest::new("Hello!")).await?;
//! while let Some(event) = rx.recv().await { /* ... */ }
//! ```

mod openai;
mod scripted;
mod traits;

pub use openai::{OpenAiBackend, DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_SYSTEM_PROMPT};
pub use scripted::ScriptedBackend;
pub use traits::{ChatBackend, ChatEvent, ChatRequest};
