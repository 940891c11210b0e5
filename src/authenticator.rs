//! Checks a candidate key against data already in the vault.
//!
//! There is no stored password hash: a key is correct exactly when it can
//! authenticate-decrypt a field the vault already holds.

use zeroize::Zeroize;

use crate::crypto::{DerivedKey, EncryptedField, decrypt_field};

/// Something that can hand out one encrypted field to probe with.
pub trait ProbeSource {
    /// Any stored field encrypted under the vault key, or `None` if the vault
    /// holds no records yet.
    fn probe_field(&self) -> Option<&EncryptedField>;
}

/// Returns `true` if `candidate` decrypts `probe`.
///
/// An absent probe (empty vault) is accepted: the first write then fixes the
/// vault key. Any decrypt failure, including a malformed probe, rejects.
pub fn is_valid(candidate: &DerivedKey, probe: Option<&EncryptedField>) -> bool {
    let Some(field) = probe else {
        tracing::debug!("vault has no records; accepting key");
        return true;
    };

    match decrypt_field(field, candidate) {
        Ok(mut plaintext) => {
            plaintext.zeroize();
            true
        }
        Err(e) => {
            tracing::debug!(error = %e, "probe decrypt failed");
            false
        }
    }
}

/// Verifies `key` against whatever record `store` offers as a probe.
pub fn verify_key(key: &DerivedKey, store: &impl ProbeSource) -> bool {
    is_valid(key, store.probe_field())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{KEY_LEN, encrypt_field};

    struct OneField(Option<EncryptedField>);

    impl ProbeSource for OneField {
        fn probe_field(&self) -> Option<&EncryptedField> {
            self.0.as_ref()
        }
    }

    #[test]
    fn empty_vault_accepts_any_key() {
        let key = DerivedKey::from_bytes([9u8; KEY_LEN]);

        assert!(is_valid(&key, None));
        assert!(verify_key(&key, &OneField(None)));
    }

    #[test]
    fn populated_vault_accepts_only_its_key() {
        let k1 = DerivedKey::from_bytes([1u8; KEY_LEN]);
        let k2 = DerivedKey::from_bytes([2u8; KEY_LEN]);
        let store = OneField(Some(encrypt_field("GitHub", &k1).unwrap()));

        assert!(verify_key(&k1, &store));
        assert!(!verify_key(&k2, &store));
    }

    #[test]
    fn tampered_probe_rejects_correct_key() {
        let key = DerivedKey::from_bytes([1u8; KEY_LEN]);
        let field = encrypt_field("GitHub", &key).unwrap();
        let mut bytes = field.decode().unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;

        let tampered = EncryptedField::from_bytes(bytes).unwrap();
        assert!(!is_valid(&key, Some(&tampered)));
    }

    #[test]
    fn undecodable_field_rejects_any_key() {
        let key = DerivedKey::from_bytes([1u8; KEY_LEN]);
        let damaged: EncryptedField = serde_json::from_value(serde_json::json!("AAAA")).unwrap();

        assert!(!is_valid(&key, Some(&damaged)));
    }
}
