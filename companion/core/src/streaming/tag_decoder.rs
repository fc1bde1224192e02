//! Tag-delimited stream decoder
//!
//! The model is asked to wrap its visible reply in a pair of tags. Replies
//! arrive as arbitrary chunks, so a tag can be split anywhere. The decoder
//! keeps the full raw text and recomputes the visible view from scratch on
//! every chunk:
//!
//! 1. Nothing is visible until the start tag has fully arrived.
//! 2. The view is everything after the first start tag.
//! 3. Once the end tag has fully arrived, the view stops right before it.
//! 4. Otherwise, a tail that could be the beginning of the end tag is held
//!    back until the next chunk decides.
//!
//! Because nothing is carried over between calls except the raw text, a
//! held-back tail that turns out not to be a tag reappears on the next feed.

/// Default opening tag
pub const DEFAULT_START_TAG: &str = "<response>";

/// Default closing tag
pub const DEFAULT_END_TAG: &str = "</response>";

/// Incremental extractor for the text between a start and an end tag
#[derive(Clone, Debug)]
pub struct TagStreamDecoder {
    start_tag: String,
    end_tag: String,
    raw: String,
    filtered: String,
}

impl Default for TagStreamDecoder {
    fn default() -> Self {
        Self::new(DEFAULT_START_TAG, DEFAULT_END_TAG)
    }
}

impl TagStreamDecoder {
    /// Create a decoder for a custom tag pair
    pub fn new(start_tag: impl Into<String>, end_tag: impl Into<String>) -> Self {
        Self {
            start_tag: start_tag.into(),
            end_tag: end_tag.into(),
            raw: String::new(),
            filtered: String::new(),
        }
    }

    /// Append a chunk and return the current visible text
    pub fn feed(&mut self, chunk: &str) -> &str {
        self.raw.push_str(chunk);
        self.filtered = self.view().to_string();
        &self.filtered
    }

    /// Forget everything received so far
    pub fn reset(&mut self) {
        self.raw.clear();
        self.filtered.clear();
    }

    /// Everything received since the last reset
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Visible text as of the last feed
    #[must_use]
    pub fn filtered(&self) -> &str {
        &self.filtered
    }

    /// Whether the start tag has arrived
    #[must_use]
    pub fn has_started(&self) -> bool {
        self.body().is_some()
    }

    /// Whether the end tag has arrived after the start tag
    #[must_use]
    pub fn is_closed(&self) -> bool {
        !self.end_tag.is_empty() && self.body().is_some_and(|body| body.contains(&self.end_tag))
    }

    /// The opening tag
    #[must_use]
    pub fn start_tag(&self) -> &str {
        &self.start_tag
    }

    /// The closing tag
    #[must_use]
    pub fn end_tag(&self) -> &str {
        &self.end_tag
    }

    fn body(&self) -> Option<&str> {
        self.raw
            .find(&self.start_tag)
            .map(|start| &self.raw[start + self.start_tag.len()..])
    }

    fn view(&self) -> &str {
        let Some(body) = self.body() else {
            return "";
        };

        if self.end_tag.is_empty() {
            return body;
        }

        if let Some(end) = body.find(&self.end_tag) {
            return &body[..end];
        }

        &body[..body.len() - partial_suffix_len(body, &self.end_tag)]
    }
}

/// Length of the longest proper prefix of `tag` that `text` ends with
///
/// Candidates are tried from the longest down, and only on char
/// boundaries of the tag.
fn partial_suffix_len(text: &str, tag: &str) -> usize {
    (1..tag.len())
        .rev()
        .filter(|&len| tag.is_char_boundary(len))
        .find(|&len| text.ends_with(&tag[..len]))
        .unwrap_or(0)
}
