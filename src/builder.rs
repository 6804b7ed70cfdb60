//! Builder module for configuring and instantiating chat providers.
//!
//! The provider is chosen by configuration only; the turn controller sees a
//! `dyn ChatProvider` and never knows which vendor sits behind it.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{chat::ChatProvider, error::KindlyError};

/// Default request timeout applied by HTTP clients, in seconds.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 120;

/// Supported hosted providers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Google Gemini API
    #[default]
    Google,
    /// OpenAI Responses API
    #[serde(rename = "openai")]
    OpenAI,
}

impl Backend {
    /// Name of the environment variable (and secret key) holding the API key.
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Backend::Google => "GOOGLE_API_KEY",
            Backend::OpenAI => "OPENAI_API_KEY",
        }
    }
}

/// Implements string parsing for Backend enum.
///
/// # Examples
///
/// ```
/// use std::str::FromStr;
/// use kindly::builder::Backend;
///
/// let backend = Backend::from_str("Gemini").unwrap();
/// assert_eq!(backend, Backend::Google);
///
/// let err = Backend::from_str("invalid").unwrap_err();
/// assert!(err.to_string().contains("Unknown backend"));
/// ```
impl std::str::FromStr for Backend {
    type Err = KindlyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "google" | "gemini" => Ok(Backend::Google),
            "openai" => Ok(Backend::OpenAI),
            _ => Err(KindlyError::InvalidRequest(format!("Unknown backend: {s}"))),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Backend::Google => write!(f, "google"),
            Backend::OpenAI => write!(f, "openai"),
        }
    }
}

/// Builder for configuring and instantiating a streaming chat provider.
#[derive(Debug, Default)]
pub struct ProviderBuilder {
    /// Selected backend provider
    backend: Option<Backend>,
    /// API key for authentication with the provider
    api_key: Option<String>,
    /// Base URL for API requests (proxies, regional endpoints)
    base_url: Option<String>,
    /// Request timeout duration in seconds
    timeout_seconds: Option<u64>,
}

impl ProviderBuilder {
    /// Creates a new empty builder instance with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the backend provider to use.
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Sets the API key for authentication.
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL for API requests.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the request timeout in seconds.
    pub fn timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = Some(timeout_seconds);
        self
    }

    /// Builds the configured provider.
    ///
    /// # Errors
    ///
    /// Returns `CredentialMissing` when no non-empty API key was supplied and
    /// `InvalidRequest` when the backend was compiled out.
    pub fn build(self) -> Result<Arc<dyn ChatProvider>, KindlyError> {
        let backend = self.backend.unwrap_or_default();
        let api_key = self
            .api_key
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| KindlyError::CredentialMissing(backend.api_key_env().to_string()))?;
        let timeout = self.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

        log::debug!("building {backend} provider (timeout={timeout}s)");

        let provider: Arc<dyn ChatProvider> = match backend {
            Backend::Google => {
                #[cfg(not(feature = "google"))]
                return Err(KindlyError::InvalidRequest(
                    "Google feature not enabled".to_string(),
                ));

                #[cfg(feature = "google")]
                Arc::new(crate::backends::google::Google::new(
                    api_key,
                    self.base_url,
                    Some(timeout),
                )?)
            }
            Backend::OpenAI => {
                #[cfg(not(feature = "openai"))]
                return Err(KindlyError::InvalidRequest(
                    "OpenAI feature not enabled".to_string(),
                ));

                #[cfg(feature = "openai")]
                Arc::new(crate::backends::openai::OpenAI::new(
                    api_key,
                    self.base_url,
                    Some(timeout),
                )?)
            }
        };

        Ok(provider)
    }
}
