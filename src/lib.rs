//! Local credential vault with field-level encryption.
//!
//! Accounts and their custom fields live in one data file; every sensitive
//! column is sealed with AES-256-GCM under a key derived from the master
//! password (PBKDF2-HMAC-SHA256) and a per-vault random salt.

pub mod authenticator;
pub mod crypto;
mod error;
mod format;
pub mod passgen;
pub mod salt;
mod storage;
pub mod store;
pub mod vault;

pub use crate::authenticator::{ProbeSource, is_valid, verify_key};
pub use crate::crypto::{
    DerivedKey, EncryptedField, FieldCipher, PBKDF2_ITERATIONS, Salt, decrypt_field, derive_key,
    encrypt_field,
};
pub use crate::error::VaultError;
pub use crate::passgen::{PasswordPolicy, Strength, check_password_strength, generate_password};
pub use crate::salt::{SaltStore, ensure_salt};
pub use crate::storage::Storage;
pub use crate::store::{
    Account, AccountUpdate, CustomField, CustomFieldUpdate, EncryptedRecordStore, ExpiryStatus,
    NewAccount, NewCustomField, RecordTable,
};
pub use crate::vault::{Unlocker, Vault, VaultPaths};

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn salt_key_encrypt_reload_decrypt_end_to_end() {
        let dir = tempdir().unwrap();
        let salts = SaltStore::new(dir.path().join("salt.bin"));

        let salt = salts.create().unwrap();
        let key = derive_key("CorrectHorse1!", &salt);
        let stored = encrypt_field("my-secret-password", &key).unwrap().to_encoded();
        drop(key);

        let reloaded = ensure_salt(&salts).unwrap();
        assert_eq!(reloaded, salt);

        let field = EncryptedField::from_encoded(&stored).unwrap();
        let key = derive_key("CorrectHorse1!", &reloaded);
        assert_eq!(decrypt_field(&field, &key).unwrap(), "my-secret-password");

        let wrong = derive_key("wrong-password", &reloaded);
        assert!(matches!(
            decrypt_field(&field, &wrong),
            Err(VaultError::AuthenticationFailure)
        ));
    }

    #[test]
    fn verify_key_against_store() {
        let dir = tempdir().unwrap();
        let salt = SaltStore::new(dir.path().join("salt.bin")).create().unwrap();
        let k1 = derive_key("first", &salt);
        let k2 = derive_key("second", &salt);

        let storage = Storage::new(dir.path().join("passwords.db"));
        let mut store = EncryptedRecordStore::open(storage, FieldCipher::new(k1.clone())).unwrap();
        assert!(verify_key(&k2, store.table()));

        store
            .create_account(NewAccount::new("GitHub", "octocat", "hunter2"))
            .unwrap();
        assert!(verify_key(&k1, store.table()));
        assert!(!verify_key(&k2, store.table()));
    }
}
