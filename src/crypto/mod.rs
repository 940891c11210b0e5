//! Cryptographic primitives for the vault.
//!
//! Provides password-based key derivation and field-level authenticated
//! encryption.

pub mod cipher;
pub mod kdf;

pub use cipher::{EncryptedField, FieldCipher, decrypt_field, encrypt_field};
pub use kdf::{DerivedKey, Salt, derive_key};

use crate::error::VaultError;
use getrandom::fill;

/// Length of the salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the AES-GCM nonce (96 bits).
pub const NONCE_LEN: usize = 12;
/// Length of the AES-GCM authentication tag.
pub const TAG_LEN: usize = 16;
/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// PBKDF2-HMAC-SHA256 rounds. Fixed so that unlock and encryption always agree.
pub const PBKDF2_ITERATIONS: u32 = 600_000;
const _: () = assert!(PBKDF2_ITERATIONS >= 600_000);

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<(), VaultError> {
    fill(buf).map_err(|_| VaultError::Rng)
}

/// Generate salt
pub fn generate_salt() -> Result<Salt, VaultError> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(Salt::from(salt))
}
