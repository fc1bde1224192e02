//! Streaming response handling
//!
//! Turns the backend's chunked reply into the text shown to the user.

pub mod tag_decoder;

pub use tag_decoder::{TagStreamDecoder, DEFAULT_END_TAG, DEFAULT_START_TAG};
