//! Durable credential storage

use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use crate::error::Result;

use super::credentials::Credentials;

/// Where credentials survive between runs
pub trait CredentialStore: Send + Sync {
    /// Load stored credentials, if any
    ///
    /// Unreadable or corrupt storage is treated as empty.
    fn load(&self) -> Option<Credentials>;

    /// Replace the stored credentials
    ///
    /// # Errors
    /// Returns error if the credentials could not be written
    fn save(&self, credentials: &Credentials) -> Result<()>;

    /// Remove stored credentials
    ///
    /// # Errors
    /// Returns error if the credentials could not be removed
    fn clear(&self) -> Result<()>;
}

/// JSON file store, readable only by the owner on unix
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    /// Store credentials at `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File backing this store
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credentials> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Failed to read credentials file: {e}");
                return None;
            }
        };

        match serde_json::from_str(&data) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                log::warn!("Failed to parse credentials file: {e}");
                None
            }
        }
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(credentials)?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600))?;
        }

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory store, for tests and ephemeral sessions
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<Option<Credentials>>,
}

impl MemoryCredentialStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `credentials`
    #[must_use]
    pub fn with_credentials(credentials: Credentials) -> Self {
        Self {
            credentials: Mutex::new(Some(credentials)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<Credentials> {
        self.credentials.lock().clone()
    }

    fn save(&self, credentials: &Credentials) -> Result<()> {
        *self.credentials.lock() = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.credentials.lock().take();
        Ok(())
    }
}
