use std::collections::VecDeque;
use std::pin::Pin;

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};

use crate::{error::KindlyError, persona::PersonaConfig};

/// Ordered, finite stream of reply fragments.
///
/// The stream ends after the last fragment, or right after yielding an
/// error. It cannot be restarted.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, KindlyError>> + Send>>;

/// Role of a participant in a chat conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    /// The user/human participant in the conversation
    User,
    /// The AI assistant participant in the conversation
    Assistant,
}

/// A single message sent to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// The role of who sent this message (user or assistant)
    pub role: ChatRole,
    /// The text content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new builder for a user message
    pub fn user() -> ChatMessageBuilder {
        ChatMessageBuilder::new(ChatRole::User)
    }
}

/// Builder for ChatMessage
#[derive(Debug)]
pub struct ChatMessageBuilder {
    role: ChatRole,
    content: String,
}

impl ChatMessageBuilder {
    /// Create a new ChatMessageBuilder with specified role
    pub fn new(role: ChatRole) -> Self {
        Self {
            role,
            content: String::new(),
        }
    }

    /// Set the message content
    pub fn content<S: Into<String>>(mut self, content: S) -> Self {
        self.content = content.into();
        self
    }

    /// Build the ChatMessage
    pub fn build(self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content,
        }
    }
}

/// Everything a provider needs for one streaming call.
///
/// The persona travels as request-level configuration (system prompt,
/// generation parameters, safety thresholds, model); `messages` holds the
/// conversation turns actually sent.
#[derive(Debug, Clone)]
pub struct ChatRequest<'a> {
    pub persona: &'a PersonaConfig,
    pub messages: Vec<ChatMessage>,
}

impl<'a> ChatRequest<'a> {
    /// A request carrying exactly one user message. Earlier turns of the
    /// transcript are never replayed; each call stands on the persona prompt.
    pub fn single_turn(persona: &'a PersonaConfig, user_text: impl Into<String>) -> Self {
        Self {
            persona,
            messages: vec![ChatMessage::user().content(user_text).build()],
        }
    }
}

/// Trait for providers that can stream a chat reply.
#[async_trait]
pub trait ChatProvider: Sync + Send {
    /// Short provider name used in logs
    fn name(&self) -> &str;

    /// Opens a streaming call and returns the ordered fragments of the reply.
    ///
    /// Errors raised before the first byte (auth, HTTP status) are returned
    /// directly; errors raised mid-stream are yielded by the stream.
    async fn chat_stream(&self, request: &ChatRequest<'_>) -> Result<FragmentStream, KindlyError>;
}

/// One decoded Server-Sent Event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field, if any
    pub event: Option<String>,
    /// All `data:` lines of the event joined with `\n`
    pub data: String,
}

/// What a backend makes of one SSE event.
#[derive(Debug, PartialEq, Eq)]
pub enum SseStep {
    /// A piece of reply text
    Fragment(String),
    /// Event carries nothing to render (metadata, keep-alive, empty text)
    Skip,
    /// The provider signalled the end of the reply
    Done,
}

/// Incremental SSE decoder.
///
/// Network chunks may split lines, events and even UTF-8 sequences; bytes
/// are buffered until a full line is available.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buf: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds raw bytes and returns every event completed by them.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buf.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.feed_line(line.trim_end_matches(|c| c == '\n' || c == '\r')) {
                events.push(event);
            }
        }
        events
    }

    /// Flushes a trailing event that was not terminated by a blank line.
    pub fn finish(&mut self) -> Option<SseEvent> {
        if !self.buf.is_empty() {
            let raw = std::mem::take(&mut self.buf);
            let line = String::from_utf8_lossy(&raw);
            if let Some(event) = self.feed_line(line.trim_end_matches('\r')) {
                return Some(event);
            }
        }
        self.dispatch()
    }

    fn feed_line(&mut self, line: &str) -> Option<SseEvent> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        if self.data.is_empty() {
            self.event = None;
            return None;
        }
        Some(SseEvent {
            event: self.event.take(),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

struct SseState<S, F> {
    bytes: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<SseEvent>,
    parser: F,
    finished: bool,
}

/// Creates a fragment stream from a body of Server-Sent Events.
///
/// # Arguments
///
/// * `bytes` - The raw response body
/// * `parser` - Turns each decoded event into a fragment, a skip, or the end
///
/// # Returns
///
/// A pinned stream of text fragments. It stops after the first error.
pub(crate) fn create_sse_stream<S, B, F>(bytes: S, parser: F) -> FragmentStream
where
    S: Stream<Item = Result<B, KindlyError>> + Send + 'static,
    B: AsRef<[u8]> + Send,
    F: FnMut(SseEvent) -> Result<SseStep, KindlyError> + Send + 'static,
{
    let state = SseState {
        bytes: Box::pin(bytes),
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        parser,
        finished: false,
    };

    let stream = stream::unfold(state, |mut st| async move {
        loop {
            if let Some(event) = st.pending.pop_front() {
                match (st.parser)(event) {
                    Ok(SseStep::Fragment(text)) => return Some((Ok(text), st)),
                    Ok(SseStep::Skip) => continue,
                    Ok(SseStep::Done) => return None,
                    Err(e) => {
                        st.finished = true;
                        st.pending.clear();
                        return Some((Err(e), st));
                    }
                }
            }
            if st.finished {
                return None;
            }
            match st.bytes.next().await {
                Some(Ok(chunk)) => {
                    let events = st.decoder.push(chunk.as_ref());
                    st.pending.extend(events);
                }
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(e), st));
                }
                None => {
                    st.finished = true;
                    st.pending.extend(st.decoder.finish());
                }
            }
        }
    });

    Box::pin(stream)
}

/// Same as [`create_sse_stream`] for a streaming HTTP response body.
pub(crate) fn create_response_sse_stream<F>(response: reqwest::Response, parser: F) -> FragmentStream
where
    F: FnMut(SseEvent) -> Result<SseStep, KindlyError> + Send + 'static,
{
    let bytes = response
        .bytes_stream()
        .map(|chunk| chunk.map_err(KindlyError::from));
    create_sse_stream(bytes, parser)
}
