use std::fmt;
use std::time::Duration;

/// Error types that can occur while running a chat session.
#[derive(Debug)]
pub enum KindlyError {
    /// No API key could be resolved for the selected provider
    CredentialMissing(String),
    /// The submitted text was empty after trimming
    EmptyInput,
    /// A turn is already streaming for this session
    ConcurrentSubmission,
    /// The session was disposed before the submission
    SessionClosed,
    /// HTTP transport errors (connect, read, body stream)
    HttpError(String),
    /// A provider was handed an empty API key
    AuthError(String),
    /// Invalid request parameters or format
    InvalidRequest(String),
    /// Errors returned by the provider, including safety blocks
    ProviderError(String),
    /// A streamed event that could not be decoded
    ResponseFormatError {
        /// What went wrong
        message: String,
        /// The raw event payload
        raw_response: String,
    },
    /// JSON serialization/deserialization errors
    JsonError(String),
    /// The turn did not finish within its deadline
    Timeout(Duration),
}

impl KindlyError {
    /// Returns true for failures that happen inside a turn after the user
    /// entry was appended. These are shown to the user in place of a reply.
    pub fn is_turn_failure(&self) -> bool {
        !matches!(
            self,
            KindlyError::CredentialMissing(_)
                | KindlyError::EmptyInput
                | KindlyError::ConcurrentSubmission
                | KindlyError::SessionClosed
        )
    }
}

impl fmt::Display for KindlyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindlyError::CredentialMissing(e) => write!(f, "Missing credential: {e}"),
            KindlyError::EmptyInput => write!(f, "Message is empty"),
            KindlyError::ConcurrentSubmission => {
                write!(f, "A reply is still streaming, wait for it to finish")
            }
            KindlyError::SessionClosed => write!(f, "Session has been disposed"),
            KindlyError::HttpError(e) => write!(f, "HTTP Error: {e}"),
            KindlyError::AuthError(e) => write!(f, "Auth Error: {e}"),
            KindlyError::InvalidRequest(e) => write!(f, "Invalid Request: {e}"),
            KindlyError::ProviderError(e) => write!(f, "Provider Error: {e}"),
            KindlyError::ResponseFormatError {
                message,
                raw_response,
            } => write!(f, "Response Format Error: {message}. Raw response: {raw_response}"),
            KindlyError::JsonError(e) => write!(f, "JSON Parse Error: {e}"),
            KindlyError::Timeout(deadline) => write!(f, "No reply within {deadline:?}"),
        }
    }
}

impl std::error::Error for KindlyError {}

/// Converts reqwest HTTP errors into KindlyErrors
impl From<reqwest::Error> for KindlyError {
    fn from(err: reqwest::Error) -> Self {
        KindlyError::HttpError(err.to_string())
    }
}

impl From<serde_json::Error> for KindlyError {
    fn from(err: serde_json::Error) -> Self {
        KindlyError::JsonError(format!(
            "{} at line {} column {}",
            err, err.line(), err.column()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_errors_are_not_turn_failures() {
        assert!(!KindlyError::EmptyInput.is_turn_failure());
        assert!(!KindlyError::ConcurrentSubmission.is_turn_failure());
        assert!(!KindlyError::CredentialMissing("GOOGLE_API_KEY".into()).is_turn_failure());
        assert!(KindlyError::ProviderError("blocked".into()).is_turn_failure());
        assert!(KindlyError::Timeout(Duration::from_secs(5)).is_turn_failure());
    }

    #[test]
    fn timeout_keeps_sub_second_deadlines() {
        let err = KindlyError::Timeout(Duration::from_millis(500));
        assert_eq!(err.to_string(), "No reply within 500ms");
        let err = KindlyError::Timeout(Duration::from_secs(120));
        assert_eq!(err.to_string(), "No reply within 120s");
    }

    #[test]
    fn json_errors_carry_position() {
        let err: KindlyError = serde_json::from_str::<serde_json::Value>("{\"a\":")
            .unwrap_err()
            .into();
        assert!(err.to_string().starts_with("JSON Parse Error:"));
        assert!(err.to_string().contains("line 1"));
    }
}
