//! API key resolution.
//!
//! Keys are looked up, in order, in an explicit override, the secret store,
//! the process environment and finally a fallback constant baked in at build
//! time through the `KINDLY_FALLBACK_API_KEY` environment variable. Blank
//! values are ignored at every step. When nothing is found the caller must
//! halt before starting a session.

use std::fmt;

use crate::{builder::Backend, error::KindlyError, secret_store::SecretStore};

/// Key compiled into the binary, if the build environment provided one.
pub const FALLBACK_API_KEY: Option<&str> = option_env!("KINDLY_FALLBACK_API_KEY");

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

/// Where a resolved key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    Explicit,
    SecretStore,
    Environment,
    Fallback,
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Explicit => write!(f, "command line"),
            CredentialSource::SecretStore => write!(f, "secret store"),
            CredentialSource::Environment => write!(f, "environment"),
            CredentialSource::Fallback => write!(f, "built-in fallback"),
        }
    }
}

/// A resolved API key. Its value never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    value: String,
    source: CredentialSource,
}

impl Credential {
    pub fn expose(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }

    pub fn source(&self) -> CredentialSource {
        self.source
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("value", &"***")
            .field("source", &self.source)
            .finish()
    }
}

/// Resolves one named API key through the lookup chain.
pub struct CredentialResolver {
    key_name: String,
    explicit: Option<String>,
    store: Option<SecretStore>,
    env: EnvLookup,
    fallback: Option<String>,
}

impl CredentialResolver {
    /// A resolver that only consults the process environment.
    pub fn new(key_name: impl Into<String>) -> Self {
        Self {
            key_name: key_name.into(),
            explicit: None,
            store: None,
            env: Box::new(|name| std::env::var(name).ok()),
            fallback: None,
        }
    }

    /// The full chain for a backend: default secret store, environment and
    /// the compiled-in fallback.
    pub fn for_backend(backend: Backend) -> Self {
        let store = match SecretStore::new() {
            Ok(store) => Some(store),
            Err(e) => {
                log::debug!("secret store unavailable: {e}");
                None
            }
        };
        Self {
            store,
            fallback: FALLBACK_API_KEY.map(str::to_string),
            ..Self::new(backend.api_key_env())
        }
    }

    /// A value that wins over every other source, e.g. `--api-key`.
    pub fn with_explicit(mut self, key: Option<String>) -> Self {
        self.explicit = key;
        self
    }

    pub fn with_store(mut self, store: SecretStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Replaces the environment lookup.
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        self.env = Box::new(lookup);
        self
    }

    pub fn with_fallback(mut self, fallback: Option<String>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Walks the chain and returns the first non-blank key.
    ///
    /// # Errors
    ///
    /// `CredentialMissing` naming the key when every source is empty.
    pub fn resolve(&self) -> Result<Credential, KindlyError> {
        let candidates = [
            (CredentialSource::Explicit, self.explicit.clone()),
            (
                CredentialSource::SecretStore,
                self.store
                    .as_ref()
                    .and_then(|store| store.get(&self.key_name).cloned()),
            ),
            (CredentialSource::Environment, (self.env)(&self.key_name)),
            (CredentialSource::Fallback, self.fallback.clone()),
        ];

        candidates
            .into_iter()
            .find_map(|(source, value)| {
                value
                    .map(|v| v.trim().to_string())
                    .filter(|v| !v.is_empty())
                    .map(|value| Credential { value, source })
            })
            .map(|credential| {
                log::debug!("{} resolved from {}", self.key_name, credential.source);
                credential
            })
            .ok_or_else(|| {
                KindlyError::CredentialMissing(format!(
                    "Please set the {} environment variable or store it with `kindly-cli set {} <key>`",
                    self.key_name, self.key_name
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(key: &str, value: &str) -> (tempfile::TempDir, SecretStore) {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SecretStore::with_path(dir.path().join("secrets.json")).unwrap();
        store.set(key, value).unwrap();
        (dir, store)
    }

    #[test]
    fn secret_store_wins_over_environment() {
        let (_dir, store) = store_with("GOOGLE_API_KEY", "from-store");
        let credential = CredentialResolver::new("GOOGLE_API_KEY")
            .with_store(store)
            .with_env(|_| Some("from-env".to_string()))
            .with_fallback(Some("from-fallback".to_string()))
            .resolve()
            .unwrap();
        assert_eq!(credential.expose(), "from-store");
        assert_eq!(credential.source(), CredentialSource::SecretStore);
    }

    #[test]
    fn blank_values_fall_through() {
        let (_dir, store) = store_with("GOOGLE_API_KEY", "   ");
        let credential = CredentialResolver::new("GOOGLE_API_KEY")
            .with_store(store)
            .with_env(|_| Some(String::new()))
            .with_fallback(Some("from-fallback".to_string()))
            .resolve()
            .unwrap();
        assert_eq!(credential.expose(), "from-fallback");
        assert_eq!(credential.source(), CredentialSource::Fallback);
    }

    #[test]
    fn environment_is_used_without_store() {
        let credential = CredentialResolver::new("OPENAI_API_KEY")
            .with_env(|name| (name == "OPENAI_API_KEY").then(|| "sk-test".to_string()))
            .resolve()
            .unwrap();
        assert_eq!(credential.source(), CredentialSource::Environment);
    }

    #[test]
    fn explicit_key_wins() {
        let credential = CredentialResolver::new("OPENAI_API_KEY")
            .with_explicit(Some("cli".to_string()))
            .with_env(|_| Some("env".to_string()))
            .resolve()
            .unwrap();
        assert_eq!(credential.into_inner(), "cli");
    }

    #[test]
    fn nothing_found_is_credential_missing() {
        let err = CredentialResolver::new("GOOGLE_API_KEY")
            .with_env(|_| None)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, KindlyError::CredentialMissing(ref m) if m.contains("GOOGLE_API_KEY")));
    }

    #[test]
    fn debug_output_hides_the_key() {
        let credential = CredentialResolver::new("K")
            .with_explicit(Some("secret-value".to_string()))
            .resolve()
            .unwrap();
        assert!(!format!("{credential:?}").contains("secret-value"));
    }
}
