//! Kindly is a streaming chat front-end for a friendship-coach persona.
//!
//! # Overview
//! A session holds an append-only transcript seeded with a greeting. Each
//! user turn is sent to a hosted model as a single message with the persona
//! prompt attached, the reply is rendered fragment by fragment with a
//! trailing cursor, and it is committed to the transcript only when the
//! stream ends cleanly. It supports:
//!
//! - Google Gemini and OpenAI Responses backends, selected by configuration
//! - Persona presets and persona JSON files
//! - API key lookup through a secrets file, the environment and a build-time fallback
//!
//! # Example
//!
//! ```no_run
//! use kindly::{
//!     builder::{Backend, ProviderBuilder},
//!     controller::StreamingTurnController,
//!     persona::PersonaConfig,
//!     render::RecordingSurface,
//!     session,
//! };
//!
//! # async fn run() -> Result<(), kindly::error::KindlyError> {
//! let provider = ProviderBuilder::new()
//!     .backend(Backend::Google)
//!     .api_key(std::env::var("GOOGLE_API_KEY").unwrap_or_default())
//!     .build()?;
//! let persona = PersonaConfig::friendly();
//! let session = session::create_session(persona.greeting.clone());
//! let controller = StreamingTurnController::new(provider, persona);
//!
//! let mut surface = RecordingSurface::new();
//! let outcome = controller
//!     .submit_turn(&session, "I am mad at Sam", &mut surface)
//!     .await?;
//! println!("{}", outcome.text);
//! session::dispose(&session);
//! # Ok(())
//! # }
//! ```

// Re-export for convenience
pub use async_trait::async_trait;

/// Backend implementations for the supported hosted providers
pub mod backends;

/// Builder pattern for configuring and instantiating providers
pub mod builder;

/// Provider trait, request types and SSE decoding
pub mod chat;

/// Streaming turn controller
pub mod controller;

/// API key resolution chain
pub mod credentials;

/// Error types and handling
pub mod error;

/// Persona prompts, generation parameters and safety thresholds
pub mod persona;

/// Render surfaces for streamed replies
pub mod render;

/// Secret store for storing API keys
pub mod secret_store;

/// Explicit chat sessions and their turn state
pub mod session;

/// Append-only conversation log
pub mod transcript;

#[inline]
/// Initialize logging using env_logger if the "logging" feature is enabled.
/// This is a no-op if the feature is not enabled.
pub fn init_logging() {
    #[cfg(feature = "logging")]
    {
        let _ = env_logger::try_init();
    }
}
