//! Error taxonomy for vault operations.

use std::io;

/// Errors produced by the key-management core and the record store.
///
/// None of the variants carry plaintext, passwords or key material.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The salt file is absent; call `SaltStore::create` on first run.
    #[error("salt file not found")]
    SaltNotFound,

    /// The salt file exists but does not hold exactly 16 bytes.
    #[error("salt file is corrupt (expected 16 bytes, found {0})")]
    CorruptSalt(usize),

    /// AEAD tag mismatch: wrong master password or tampered data.
    #[error("wrong master password or corrupted data")]
    AuthenticationFailure,

    /// Stored ciphertext cannot be parsed (bad encoding, missing nonce or tag).
    #[error("malformed encrypted field: {0}")]
    MalformedField(String),

    /// Salt or data file could not be read or written.
    #[error("vault file I/O failed: {0}")]
    Io(#[from] io::Error),

    /// The data file envelope or body cannot be parsed.
    #[error("vault file is corrupt: {0}")]
    CorruptVault(String),

    /// The operating system random generator is unavailable.
    #[error("OS random generator unavailable")]
    Rng,

    #[error("account with id={0} not found")]
    AccountNotFound(u64),

    #[error("custom field with id={0} not found")]
    CustomFieldNotFound(u64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("vault already exists")]
    VaultExists,

    #[error("vault does not exist")]
    VaultMissing,
}

impl VaultError {
    /// Returns `true` for the recoverable "wrong master password" condition.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, VaultError::AuthenticationFailure)
    }
}

impl From<serde_json::Error> for VaultError {
    fn from(err: serde_json::Error) -> Self {
        VaultError::CorruptVault(err.to_string())
    }
}
