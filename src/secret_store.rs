use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::PathBuf;

/// File storage for API keys.
///
/// Secrets live in a flat JSON object, by default at
/// `~/.kindly/secrets.json`. The file is created on the first write.
#[derive(Debug)]
pub struct SecretStore {
    /// Map of secret keys to their values
    secrets: HashMap<String, String>,
    /// Path to the secrets file
    file_path: PathBuf,
}

impl SecretStore {
    /// Opens the store at the default location (`~/.kindly/secrets.json`).
    ///
    /// # Errors
    ///
    /// Fails when the home directory cannot be determined or the file exists
    /// but cannot be read.
    pub fn new() -> io::Result<Self> {
        let home_dir = dirs::home_dir().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, "Could not find home directory")
        })?;
        Self::with_path(home_dir.join(".kindly").join("secrets.json"))
    }

    /// Opens the store backed by an explicit file.
    pub fn with_path(file_path: impl Into<PathBuf>) -> io::Result<Self> {
        let mut store = SecretStore {
            secrets: HashMap::new(),
            file_path: file_path.into(),
        };
        store.load()?;
        Ok(store)
    }

    /// Loads secrets from the file system
    fn load(&mut self) -> io::Result<()> {
        match File::open(&self.file_path) {
            Ok(mut file) => {
                let mut contents = String::new();
                file.read_to_string(&mut contents)?;
                self.secrets = serde_json::from_str(&contents).unwrap_or_else(|e| {
                    log::warn!(
                        "ignoring unreadable secrets file {}: {e}",
                        self.file_path.display()
                    );
                    HashMap::new()
                });
                Ok(())
            }
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Saves the current secrets to the file system
    fn save(&self) -> io::Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.secrets)?;
        let mut file = File::create(&self.file_path)?;
        file.write_all(contents.as_bytes())?;
        Ok(())
    }

    /// Sets a secret value for the given key and persists the store.
    pub fn set(&mut self, key: &str, value: &str) -> io::Result<()> {
        self.secrets.insert(key.to_string(), value.to_string());
        self.save()
    }

    /// Retrieves a secret value for the given key
    pub fn get(&self, key: &str) -> Option<&String> {
        self.secrets.get(key)
    }

    /// Deletes a secret with the given key and persists the store.
    pub fn delete(&mut self, key: &str) -> io::Result<()> {
        self.secrets.remove(key);
        self.save()
    }
}
