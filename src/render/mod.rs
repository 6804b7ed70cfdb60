//! Render surfaces receive everything the user should see during a turn.
//!
//! The controller calls `on_fragment` with the cursor-suffixed partial reply
//! after every fragment, `on_commit` once with the final text, `on_error`
//! instead of `on_commit` when the turn fails, and `on_transcript` after
//! every append so the surface can redraw the full conversation.

use crate::transcript::{Speaker, Transcript};

/// Glyph appended to the partial reply while it is still streaming.
pub const CURSOR_GLYPH: char = '▌';

/// Partial reply as shown while streaming.
pub fn with_cursor(partial: &str) -> String {
    let mut view = String::with_capacity(partial.len() + CURSOR_GLYPH.len_utf8());
    view.push_str(partial);
    view.push(CURSOR_GLYPH);
    view
}

/// Output side of a chat session.
pub trait RenderSurface: Send {
    /// Provisional view of the in-flight reply, cursor included.
    fn on_fragment(&mut self, partial_with_cursor: &str);

    /// Final reply text, without cursor. Called right before the commit.
    fn on_commit(&mut self, final_text: &str);

    /// User-visible failure message, shown in place of the reply.
    fn on_error(&mut self, message: &str);

    /// Full ordered transcript after an append.
    fn on_transcript(&mut self, _transcript: &Transcript) {}
}

/// One call received by a [`RecordingSurface`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Fragment(String),
    Commit(String),
    Error(String),
    /// Speakers and texts of the transcript at redraw time
    Transcript(Vec<(Speaker, String)>),
}

/// Records every render call in order.
#[derive(Debug, Default, Clone)]
pub struct RecordingSurface {
    pub events: Vec<RenderEvent>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// All provisional views, in the order they were rendered.
    pub fn fragments(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Fragment(view) => Some(view.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn commits(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Commit(text) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                RenderEvent::Error(message) => Some(message.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }
}

impl RenderSurface for RecordingSurface {
    fn on_fragment(&mut self, partial_with_cursor: &str) {
        self.events
            .push(RenderEvent::Fragment(partial_with_cursor.to_string()));
    }

    fn on_commit(&mut self, final_text: &str) {
        self.events.push(RenderEvent::Commit(final_text.to_string()));
    }

    fn on_error(&mut self, message: &str) {
        self.events.push(RenderEvent::Error(message.to_string()));
    }

    fn on_transcript(&mut self, transcript: &Transcript) {
        self.events.push(RenderEvent::Transcript(
            transcript
                .iter()
                .map(|entry| (entry.speaker(), entry.text().to_string()))
                .collect(),
        ));
    }
}
