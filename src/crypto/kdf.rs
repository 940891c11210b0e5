use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use super::{KEY_LEN, PBKDF2_ITERATIONS, SALT_LEN};
use crate::error::VaultError;

/// Random, non-secret value persisted next to the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

impl From<[u8; SALT_LEN]> for Salt {
    fn from(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for Salt {
    type Error = VaultError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let bytes: [u8; SALT_LEN] = bytes
            .try_into()
            .map_err(|_| VaultError::CorruptSalt(bytes.len()))?;
        Ok(Self(bytes))
    }
}

/// Symmetric key held in memory for the lifetime of an unlocked session.
///
/// Wiped on drop. `Debug` never prints the bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    /// Wraps raw key bytes, e.g. a key obtained outside PBKDF2.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub(crate) fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        // no early exit on the first differing byte
        self.0
            .iter()
            .zip(other.0.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
    }
}

impl Eq for DerivedKey {}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

/// Derive a 256-bit key from the master password with PBKDF2-HMAC-SHA256.
///
/// Always runs [`PBKDF2_ITERATIONS`] rounds, so the cost does not depend on
/// the password.
pub fn derive_key(password: &str, salt: &Salt) -> DerivedKey {
    let mut key = [0u8; KEY_LEN];
    pbkdf2_hmac::<Sha256>(
        password.as_bytes(),
        salt.as_bytes(),
        PBKDF2_ITERATIONS,
        &mut key,
    );

    let derived = DerivedKey(key);
    key.zeroize();

    tracing::debug!(iterations = PBKDF2_ITERATIONS, "derived vault key");
    derived
}

#[cfg(test)]
mod tests {
    use super::*;

    // hashlib.pbkdf2_hmac("sha256", b"CorrectHorse1!", bytes(range(16)), 600000, dklen=32)
    #[test]
    fn derive_key_matches_known_answer() {
        let salt = Salt::from(std::array::from_fn::<u8, SALT_LEN, _>(|i| i as u8));
        let key = derive_key("CorrectHorse1!", &salt);

        let expected: [u8; KEY_LEN] = [
            0x89, 0x29, 0x1a, 0x8b, 0x16, 0xdd, 0x39, 0xbe,
            0xa9, 0xbb, 0xff, 0x01, 0x18, 0xb7, 0x26, 0x3b,
            0x51, 0xd0, 0x4c, 0x94, 0x71, 0x35, 0x72, 0xae,
            0xfb, 0x35, 0x59, 0x11, 0x79, 0x02, 0xdb, 0xfe,
        ];
        assert_eq!(key.as_bytes(), &expected);
    }

    #[test]
    fn kdf_is_deterministic() {
        let salt = Salt::from([42u8; 16]);

        let k1 = derive_key("password", &salt);
        let k2 = derive_key("password", &salt);

        assert_eq!(k1, k2);
    }

    #[test]
    fn different_passwords_give_different_keys() {
        let salt = Salt::from([7u8; 16]);

        let k1 = derive_key("pw-one", &salt);
        let k2 = derive_key("pw-two", &salt);

        assert_ne!(k1, k2);
    }

    #[test]
    fn different_salts_give_different_keys() {
        let k1 = derive_key("pw", &Salt::from([1u8; 16]));
        let k2 = derive_key("pw", &Salt::from([2u8; 16]));

        assert_ne!(k1, k2);
    }

    #[test]
    fn salt_from_wrong_length_fails() {
        match Salt::try_from(&[0u8; 15][..]) {
            Err(VaultError::CorruptSalt(15)) => {}
            other => panic!("expected CorruptSalt(15), got: {other:?}"),
        }
    }

    #[test]
    fn debug_does_not_leak_key_bytes() {
        let key = DerivedKey::from_bytes([0xAB; KEY_LEN]);
        let printed = format!("{key:?}");

        assert!(!printed.contains("171"));
        assert!(printed.contains("redacted"));
    }
}
