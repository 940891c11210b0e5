//! The per-vault salt file: exactly 16 raw bytes, no header.

use std::path::{Path, PathBuf};

use crate::crypto::{self, Salt};
use crate::error::VaultError;
use crate::storage::Storage;

/// Owns the salt file of one vault. Salts are created once and never changed.
#[derive(Debug, Clone)]
pub struct SaltStore {
    storage: Storage,
}

impl SaltStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            storage: Storage::new(path),
        }
    }

    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    pub fn exists(&self) -> bool {
        self.storage.exists()
    }

    /// Generates a fresh salt and writes it, replacing any existing file.
    ///
    /// Replacing the salt of a vault that already holds data orphans every
    /// stored field; callers go through [`SaltStore::ensure`] instead.
    pub fn create(&self) -> Result<Salt, VaultError> {
        let salt = crypto::generate_salt()?;
        self.storage.save(salt.as_bytes())?;
        tracing::info!(path = %self.path().display(), "created vault salt");
        Ok(salt)
    }

    /// Reads the salt file.
    ///
    /// # Errors
    ///
    /// [`VaultError::SaltNotFound`] when the file is absent (first run),
    /// [`VaultError::CorruptSalt`] when it is not 16 bytes long.
    pub fn load(&self) -> Result<Salt, VaultError> {
        let data = self.storage.load()?.ok_or(VaultError::SaltNotFound)?;
        let salt = Salt::try_from(data.as_slice())?;
        tracing::debug!(path = %self.path().display(), "loaded vault salt");
        Ok(salt)
    }

    /// Loads the salt, creating it on first run.
    pub fn ensure(&self) -> Result<Salt, VaultError> {
        match self.load() {
            Err(VaultError::SaltNotFound) => self.create(),
            other => other,
        }
    }
}

/// Load-or-create entry point for callers.
pub fn ensure_salt(store: &SaltStore) -> Result<Salt, VaultError> {
    store.ensure()
}
