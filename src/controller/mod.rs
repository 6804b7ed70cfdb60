//! Streaming turn controller.
//!
//! Runs one user turn against a session: appends the user entry, sends a
//! single-message request with the persona attached, renders the reply as it
//! streams in and commits it to the transcript only once the stream has
//! ended cleanly.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio::time::{timeout_at, Instant};

use crate::{
    builder::DEFAULT_TIMEOUT_SECONDS,
    chat::{ChatProvider, ChatRequest},
    error::KindlyError,
    persona::PersonaConfig,
    render::{with_cursor, RenderSurface},
    session::{Session, TurnState},
    transcript::TurnEntry,
};

/// Result of a committed turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnOutcome {
    /// Committed assistant text, exactly the concatenated fragments
    pub text: String,
    /// Number of fragments received
    pub fragments: usize,
}

/// Drives turns for any number of sessions with one provider and persona.
pub struct StreamingTurnController {
    provider: Arc<dyn ChatProvider>,
    persona: PersonaConfig,
    timeout: Duration,
}

impl StreamingTurnController {
    pub fn new(provider: Arc<dyn ChatProvider>, persona: PersonaConfig) -> Self {
        Self {
            provider,
            persona,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECONDS),
        }
    }

    /// Deadline for a whole turn, from opening the call to the last fragment.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    /// Submits one user turn and streams the reply onto `surface`.
    ///
    /// Boundary rejections (`EmptyInput`, `SessionClosed`,
    /// `ConcurrentSubmission`) leave the transcript untouched and make no
    /// provider call. Once the user entry is appended, any failure is shown
    /// through `on_error` and returned; the user entry stays and no
    /// assistant entry is added.
    pub async fn submit_turn(
        &self,
        session: &Session,
        user_text: &str,
        surface: &mut dyn RenderSurface,
    ) -> Result<TurnOutcome, KindlyError> {
        if user_text.trim().is_empty() {
            return Err(KindlyError::EmptyInput);
        }
        let turn = session.begin_turn()?;

        {
            let mut transcript = session.transcript_lock().write().await;
            transcript.append(TurnEntry::user(user_text));
            surface.on_transcript(&transcript);
        }

        let deadline = Instant::now() + self.timeout;
        let request = ChatRequest::single_turn(&self.persona, user_text);
        log::debug!(
            "session {} turn sent to {} (model={})",
            session.id(),
            self.provider.name(),
            self.persona.model
        );

        let streamed = async {
            let mut stream = timeout_at(deadline, self.provider.chat_stream(&request))
                .await
                .map_err(|_| self.timed_out())??;
            turn.advance(TurnState::Streaming);

            let mut buffer = String::new();
            let mut fragments = 0;
            while let Some(fragment) = timeout_at(deadline, stream.next())
                .await
                .map_err(|_| self.timed_out())?
            {
                buffer.push_str(&fragment?);
                fragments += 1;
                surface.on_fragment(&with_cursor(&buffer));
            }
            Ok::<_, KindlyError>(TurnOutcome {
                text: buffer,
                fragments,
            })
        }
        .await;

        match streamed {
            Ok(outcome) => {
                let mut transcript = session.transcript_lock().write().await;
                surface.on_commit(&outcome.text);
                transcript.append(TurnEntry::assistant(outcome.text.clone()));
                turn.advance(TurnState::Committed);
                surface.on_transcript(&transcript);
                log::info!(
                    "session {} committed reply ({} fragments, {} bytes)",
                    session.id(),
                    outcome.fragments,
                    outcome.text.len()
                );
                Ok(outcome)
            }
            Err(e) => {
                turn.advance(TurnState::Failed);
                log::warn!("session {} turn failed: {e}", session.id());
                surface.on_error(&format!("An error occurred: {e}"));
                Err(e)
            }
        }
    }

    fn timed_out(&self) -> KindlyError {
        KindlyError::Timeout(self.timeout)
    }
}
