//! Append-only transcript of one chat session.
//!
//! The transcript is a presentation log: entries are only ever appended, in
//! conversation order, and never edited or removed. It is seeded with a
//! single greeting from the assistant. Text that is still streaming never
//! lives here; it is committed as a whole once the stream ends.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Greeting used when no persona-specific greeting is configured.
pub const DEFAULT_GREETING: &str = "Hi! I'm Friendly. I'm here to help you navigate tricky situations with friends or school. What's on your mind?";

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The student typing into the chat
    User,
    /// The persona replying
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::User => write!(f, "user"),
            Speaker::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single committed entry of the transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnEntry {
    speaker: Speaker,
    text: String,
}

impl TurnEntry {
    /// Create an entry spoken by the user
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
        }
    }

    /// Create an entry spoken by the assistant
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Assistant,
            text: text.into(),
        }
    }

    pub fn speaker(&self) -> Speaker {
        self.speaker
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// Ordered record of the conversation for one session.
///
/// There is deliberately no way to remove or rewrite an entry once it has
/// been appended.
///
/// # Examples
///
/// ```
/// use kindly::transcript::{Speaker, Transcript, TurnEntry};
///
/// let mut transcript = Transcript::initialize("Hey there!");
/// transcript.append(TurnEntry::user("hi"));
///
/// assert_eq!(transcript.len(), 2);
/// assert_eq!(transcript.entries()[0].speaker(), Speaker::Assistant);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transcript {
    entries: Vec<TurnEntry>,
}

impl Transcript {
    /// Start a new transcript holding exactly one assistant greeting.
    pub fn initialize(greeting: impl Into<String>) -> Self {
        Self {
            entries: vec![TurnEntry::assistant(greeting)],
        }
    }

    /// Add an entry at the end of the transcript.
    pub fn append(&mut self, entry: TurnEntry) {
        log::trace!(
            "transcript append: speaker={} len={}",
            entry.speaker,
            entry.text.len()
        );
        self.entries.push(entry);
    }

    /// All entries, oldest first.
    pub fn entries(&self) -> &[TurnEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TurnEntry> {
        self.entries.iter()
    }

    pub fn last(&self) -> Option<&TurnEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false for an initialized transcript; present for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::initialize(DEFAULT_GREETING)
    }
}

impl<'a> IntoIterator for &'a Transcript {
    type Item = &'a TurnEntry;
    type IntoIter = std::slice::Iter<'a, TurnEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_single_greeting() {
        let transcript = Transcript::default();
        assert_eq!(transcript.len(), 1);
        let seed = &transcript.entries()[0];
        assert_eq!(seed.speaker(), Speaker::Assistant);
        assert_eq!(seed.text(), DEFAULT_GREETING);
    }

    #[test]
    fn append_keeps_insertion_order() {
        let mut transcript = Transcript::initialize("hello");
        transcript.append(TurnEntry::user("first"));
        transcript.append(TurnEntry::assistant("second"));
        transcript.append(TurnEntry::user(""));

        let texts: Vec<&str> = transcript.iter().map(TurnEntry::text).collect();
        assert_eq!(texts, vec!["hello", "first", "second", ""]);
        assert_eq!(transcript.last().map(TurnEntry::speaker), Some(Speaker::User));
    }

    #[test]
    fn entries_serialize_with_lowercase_speaker() {
        let json = serde_json::to_string(&TurnEntry::user("hi")).unwrap();
        assert_eq!(json, r#"{"speaker":"user","text":"hi"}"#);
    }
}
