//! Backends for the persisted session snapshot.
//!
//! Each backend stores exactly one serialized record under one storage key.

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use keyring::Entry;

/// Storage key the session snapshot is written under.
pub const SESSION_STORAGE_KEY: &str = "linkcard-session";

/// Keychain service name for [`KeyringStorage`].
const KEYRING_SERVICE: &str = "linkcard";

/// Durable home of the raw session snapshot.
pub trait SnapshotStorage: Send + Sync {
    /// Read the stored record, `None` if nothing has been written.
    fn load(&self) -> Result<Option<String>>;

    /// Replace the stored record.
    fn save(&self, raw: &str) -> Result<()>;

    /// Remove the stored record. Removing a missing record is not an error.
    fn clear(&self) -> Result<()>;
}

/// One JSON file per storage key inside a directory.
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf, key: &str) -> Self {
        Self {
            path: dir.join(format!("{}.json", key)),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl SnapshotStorage for FileStorage {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session file {}", self.path.display()))?;
        Ok(Some(contents))
    }

    fn save(&self, raw: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create session directory")?;
        }
        std::fs::write(&self.path, raw).context("Failed to write session file")?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove session file")?;
        }
        Ok(())
    }
}

/// Snapshot kept in the OS keychain.
pub struct KeyringStorage {
    entry: Entry,
}

impl KeyringStorage {
    pub fn new(key: &str) -> Result<Self> {
        let entry = Entry::new(KEYRING_SERVICE, key).context("Failed to create keyring entry")?;
        Ok(Self { entry })
    }
}

impl SnapshotStorage for KeyringStorage {
    fn load(&self) -> Result<Option<String>> {
        match self.entry.get_password() {
            Ok(raw) => Ok(Some(raw)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session from keychain"),
        }
    }

    fn save(&self, raw: &str) -> Result<()> {
        self.entry
            .set_password(raw)
            .context("Failed to store session in keychain")
    }

    fn clear(&self) -> Result<()> {
        match self.entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}

/// Process-local snapshot, lost on exit.
#[derive(Default)]
pub struct MemoryStorage {
    raw: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(raw: impl Into<String>) -> Self {
        Self {
            raw: Mutex::new(Some(raw.into())),
        }
    }
}

impl SnapshotStorage for MemoryStorage {
    fn load(&self) -> Result<Option<String>> {
        let raw = self
            .raw
            .lock()
            .map_err(|_| anyhow::anyhow!("Session memory storage poisoned"))?;
        Ok(raw.clone())
    }

    fn save(&self, raw: &str) -> Result<()> {
        let mut slot = self
            .raw
            .lock()
            .map_err(|_| anyhow::anyhow!("Session memory storage poisoned"))?;
        *slot = Some(raw.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .raw
            .lock()
            .map_err(|_| anyhow::anyhow!("Session memory storage poisoned"))?;
        *slot = None;
        Ok(())
    }
}
