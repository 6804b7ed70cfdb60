//! Explicit chat sessions.
//!
//! A session owns one transcript and the single-flight state of its turns.
//! Callers create it with [`create_session`], pass the handle into the turn
//! controller and [`dispose`] it when the conversation ends. Nothing is
//! stored globally.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::{RwLock, RwLockReadGuard};

use crate::{error::KindlyError, transcript::Transcript};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Shared handle to a session.
pub type SessionHandle = Arc<Session>;

/// Progress of the turn currently owning a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TurnState {
    /// Ready for a submission
    Idle = 0,
    /// User entry appended, provider call being opened
    Sent = 1,
    /// Fragments are accumulating in the controller buffer
    Streaming = 2,
    /// Assistant entry appended
    Committed = 3,
    /// Turn ended without an assistant entry
    Failed = 4,
}

impl TurnState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => TurnState::Sent,
            2 => TurnState::Streaming,
            3 => TurnState::Committed,
            4 => TurnState::Failed,
            _ => TurnState::Idle,
        }
    }
}

impl fmt::Display for TurnState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnState::Idle => write!(f, "idle"),
            TurnState::Sent => write!(f, "sent"),
            TurnState::Streaming => write!(f, "streaming"),
            TurnState::Committed => write!(f, "committed"),
            TurnState::Failed => write!(f, "failed"),
        }
    }
}

/// One conversation: a transcript plus its turn state.
#[derive(Debug)]
pub struct Session {
    id: u64,
    transcript: RwLock<Transcript>,
    state: AtomicU8,
    closed: AtomicBool,
}

/// Starts a session whose transcript is seeded with `greeting`.
pub fn create_session(greeting: impl Into<String>) -> SessionHandle {
    let session = Session {
        id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
        transcript: RwLock::new(Transcript::initialize(greeting)),
        state: AtomicU8::new(TurnState::Idle as u8),
        closed: AtomicBool::new(false),
    };
    log::debug!("session {} created", session.id);
    Arc::new(session)
}

/// Ends a session. Later submissions fail with `SessionClosed`; a turn
/// already streaming runs to its end.
pub fn dispose(session: &SessionHandle) {
    if !session.closed.swap(true, Ordering::AcqRel) {
        log::debug!("session {} disposed", session.id);
    }
}

impl Session {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> TurnState {
        TurnState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Read access to the committed transcript.
    pub async fn transcript(&self) -> RwLockReadGuard<'_, Transcript> {
        self.transcript.read().await
    }

    /// Copy of the committed transcript.
    pub async fn snapshot(&self) -> Transcript {
        self.transcript.read().await.clone()
    }

    pub(crate) fn transcript_lock(&self) -> &RwLock<Transcript> {
        &self.transcript
    }

    /// Claims the session for one turn (`Idle -> Sent`).
    ///
    /// # Errors
    ///
    /// `SessionClosed` after [`dispose`], `ConcurrentSubmission` while
    /// another turn holds the session.
    pub(crate) fn begin_turn(&self) -> Result<TurnGuard<'_>, KindlyError> {
        if self.is_closed() {
            return Err(KindlyError::SessionClosed);
        }
        self.state
            .compare_exchange(
                TurnState::Idle as u8,
                TurnState::Sent as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|current| {
                log::debug!(
                    "session {} rejected submission while {}",
                    self.id,
                    TurnState::from_u8(current)
                );
                KindlyError::ConcurrentSubmission
            })?;
        Ok(TurnGuard { session: self })
    }
}

/// Exclusive claim on a session for one turn. Dropping it returns the
/// session to `Idle`, whether the turn finished or was abandoned.
pub(crate) struct TurnGuard<'a> {
    session: &'a Session,
}

impl TurnGuard<'_> {
    pub(crate) fn advance(&self, state: TurnState) {
        log::trace!("session {} turn -> {state}", self.session.id);
        self.session.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for TurnGuard<'_> {
    fn drop(&mut self) {
        self.session
            .state
            .store(TurnState::Idle as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_flight_until_guard_drops() {
        let session = create_session("hi");
        let guard = session.begin_turn().unwrap();
        assert_eq!(session.state(), TurnState::Sent);
        assert!(matches!(
            session.begin_turn(),
            Err(KindlyError::ConcurrentSubmission)
        ));

        guard.advance(TurnState::Streaming);
        assert_eq!(session.state(), TurnState::Streaming);
        drop(guard);

        assert_eq!(session.state(), TurnState::Idle);
        assert!(session.begin_turn().is_ok());
    }

    #[test]
    fn disposed_sessions_refuse_turns() {
        let session = create_session("hi");
        dispose(&session);
        dispose(&session);
        assert!(session.is_closed());
        assert!(matches!(session.begin_turn(), Err(KindlyError::SessionClosed)));
    }

    #[tokio::test]
    async fn sessions_are_independent() {
        let a = create_session("hello a");
        let b = create_session("hello b");
        assert_ne!(a.id(), b.id());

        let _guard = a.begin_turn().unwrap();
        assert!(b.begin_turn().is_ok());
        assert_eq!(b.transcript().await.entries()[0].text(), "hello b");
    }
}
