//! Unlock flow and the per-session vault context.
//!
//! ```text
//! NoSalt --ensure--> SaltReady --derive--> KeyDerived --probe--> Verified | Rejected
//! ```
//! [`Unlocker::new`] covers the first step; every [`Unlocker::attempt`]
//! re-enters `KeyDerived` with a new candidate password.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;

use crate::authenticator::verify_key;
use crate::crypto::{FieldCipher, Salt, derive_key};
use crate::error::VaultError;
use crate::salt::SaltStore;
use crate::storage::Storage;
use crate::store::{EncryptedRecordStore, RecordTable};

/// File name of the encrypted record table.
pub const DATA_FILE_NAME: &str = "passwords.db";
/// File name of the raw 16-byte salt.
pub const SALT_FILE_NAME: &str = "salt.bin";

/// Where a vault lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    pub data_file: PathBuf,
    pub salt_file: PathBuf,
}

impl VaultPaths {
    /// Both files inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            data_file: dir.join(DATA_FILE_NAME),
            salt_file: dir.join(SALT_FILE_NAME),
        }
    }

    /// The platform data directory, e.g. `~/.local/share/passvault` on Linux.
    pub fn default_location() -> Option<Self> {
        ProjectDirs::from("", "", "passvault").map(|dirs| Self::in_dir(dirs.data_dir()))
    }

    /// Returns `true` once the data file has been written.
    pub fn vault_exists(&self) -> bool {
        self.data_file.exists()
    }
}

/// A vault with its salt ready, waiting for a correct master password.
pub struct Unlocker {
    paths: VaultPaths,
    salt: Salt,
    table: RecordTable,
}

impl Unlocker {
    /// Loads (or on first run creates) the salt and reads the data file.
    ///
    /// A corrupt salt or data file is reported here, before any password is
    /// asked for.
    pub fn new(paths: VaultPaths) -> Result<Self, VaultError> {
        let data = Storage::new(&paths.data_file);
        let salts = SaltStore::new(&paths.salt_file);

        if data.exists() && !salts.exists() {
            // a fresh salt could never decrypt existing records
            return Err(VaultError::SaltNotFound);
        }

        let salt = salts.ensure()?;
        let table = RecordTable::load(&data)?;

        Ok(Self { paths, salt, table })
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn salt(&self) -> &Salt {
        &self.salt
    }

    /// Returns `true` if there is nothing to check a password against yet.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Derives a key from `password` and checks it against the stored records.
    ///
    /// Blocks for the duration of the key derivation.
    ///
    /// # Errors
    ///
    /// [`VaultError::AuthenticationFailure`] if the password is wrong; the
    /// caller may simply try again.
    pub fn attempt(&self, password: &str) -> Result<Vault, VaultError> {
        let key = derive_key(password, &self.salt);

        if !verify_key(&key, &self.table) {
            tracing::warn!("unlock rejected");
            return Err(VaultError::AuthenticationFailure);
        }

        tracing::info!(accounts = self.table.account_count(), "vault unlocked");
        let store = EncryptedRecordStore::from_parts(
            self.table.clone(),
            Storage::new(&self.paths.data_file),
            FieldCipher::new(key),
        );
        Ok(Vault {
            paths: self.paths.clone(),
            store,
        })
    }

    /// Consumes the unlocker once a password has been accepted.
    pub fn unlock(self, password: &str) -> Result<Vault, VaultError> {
        self.attempt(password)
    }
}

/// An unlocked vault. Holds the session key until dropped.
pub struct Vault {
    paths: VaultPaths,
    store: EncryptedRecordStore,
}

impl Vault {
    /// Creates a new, empty vault: salt file plus empty data file.
    ///
    /// # Errors
    ///
    /// [`VaultError::VaultExists`] if the data file is already there.
    pub fn create(paths: VaultPaths, password: &str) -> Result<Self, VaultError> {
        if paths.vault_exists() {
            return Err(VaultError::VaultExists);
        }

        let vault = Unlocker::new(paths)?.unlock(password)?;
        vault.store.flush()?;
        tracing::info!(path = %vault.paths.data_file.display(), "vault created");
        Ok(vault)
    }

    /// Opens an existing vault in one shot.
    ///
    /// # Errors
    ///
    /// [`VaultError::VaultMissing`] if there is no data file.
    pub fn open(paths: VaultPaths, password: &str) -> Result<Self, VaultError> {
        if !paths.vault_exists() {
            return Err(VaultError::VaultMissing);
        }
        Unlocker::new(paths)?.unlock(password)
    }

    pub fn paths(&self) -> &VaultPaths {
        &self.paths
    }

    pub fn store(&self) -> &EncryptedRecordStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut EncryptedRecordStore {
        &mut self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format;
    use crate::store::NewAccount;
    use std::fs;
    use tempfile::tempdir;

    fn vault_with_two_accounts(paths: &VaultPaths) {
        let mut vault = Vault::create(paths.clone(), "CorrectHorse1!").unwrap();
        let store = vault.store_mut();
        store
            .create_account(NewAccount::new("GitHub", "octocat", "hunter2"))
            .unwrap();
        store
            .create_account(NewAccount::new("Bank", "jane", "s3cret"))
            .unwrap();
    }

    /// Rewrites the JSON body of the data file in place.
    fn edit_body(paths: &VaultPaths, edit: impl FnOnce(&mut serde_json::Value)) {
        let raw = fs::read(&paths.data_file).unwrap();
        let header = format::MAGIC_LEN + format::VER_LEN;
        let mut body: serde_json::Value = serde_json::from_slice(&raw[header..]).unwrap();
        edit(&mut body);

        let mut out = raw[..header].to_vec();
        out.extend(serde_json::to_vec(&body).unwrap());
        fs::write(&paths.data_file, out).unwrap();
    }

    #[test]
    fn paths_in_dir_use_fixed_names() {
        let paths = VaultPaths::in_dir("/tmp/v");

        assert_eq!(paths.data_file, PathBuf::from("/tmp/v/passwords.db"));
        assert_eq!(paths.salt_file, PathBuf::from("/tmp/v/salt.bin"));
    }

    #[test]
    fn first_unlock_creates_salt_and_accepts_any_password() {
        let dir = tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());

        let unlocker = Unlocker::new(paths.clone()).unwrap();
        assert!(paths.salt_file.exists());
        assert!(unlocker.is_empty());
        assert!(unlocker.attempt("anything").is_ok());
    }

    #[test]
    fn first_write_fixes_the_key() {
        let dir = tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());

        let mut vault = Vault::create(paths.clone(), "CorrectHorse1!").unwrap();
        vault
            .store_mut()
            .create_account(NewAccount::new("GitHub", "octocat", "my-secret-password"))
            .unwrap();
        drop(vault);

        let unlocker = Unlocker::new(paths).unwrap();
        assert!(matches!(
            unlocker.attempt("wrong-password"),
            Err(VaultError::AuthenticationFailure)
        ));

        let vault = unlocker.attempt("CorrectHorse1!").unwrap();
        assert_eq!(
            vault.store().get_account(1).unwrap().password(),
            "my-secret-password"
        );
    }

    #[test]
    fn create_twice_fails() {
        let dir = tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());

        Vault::create(paths.clone(), "pw").unwrap();
        assert!(matches!(
            Vault::create(paths, "pw"),
            Err(VaultError::VaultExists)
        ));
    }

    #[test]
    fn open_missing_vault_fails() {
        let dir = tempdir().unwrap();

        assert!(matches!(
            Vault::open(VaultPaths::in_dir(dir.path()), "pw"),
            Err(VaultError::VaultMissing)
        ));
    }

    #[test]
    fn data_without_salt_is_refused() {
        let dir = tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());
        Vault::create(paths.clone(), "pw").unwrap();
        fs::remove_file(&paths.salt_file).unwrap();

        assert!(matches!(
            Unlocker::new(paths.clone()),
            Err(VaultError::SaltNotFound)
        ));
        assert!(!paths.salt_file.exists());
    }

    #[test]
    fn corrupt_data_file_is_reported_before_unlock() {
        let dir = tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());
        Vault::create(paths.clone(), "pw").unwrap();
        fs::write(&paths.data_file, b"garbage").unwrap();

        assert!(matches!(
            Unlocker::new(paths),
            Err(VaultError::CorruptVault(_))
        ));
    }

    #[test]
    fn malformed_field_only_affects_its_record() {
        let dir = tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());
        vault_with_two_accounts(&paths);
        edit_body(&paths, |body| body["accounts"][1]["notes"] = "AAAA".into());

        let vault = Unlocker::new(paths).unwrap().attempt("CorrectHorse1!").unwrap();

        assert_eq!(vault.store().get_account(1).unwrap().password(), "hunter2");
        assert!(matches!(
            vault.store().get_account(2),
            Err(VaultError::MalformedField(_))
        ));
    }

    #[test]
    fn damaged_first_title_still_checks_the_password() {
        let dir = tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());
        vault_with_two_accounts(&paths);
        edit_body(&paths, |body| body["accounts"][0]["title"] = "not base64!".into());

        let unlocker = Unlocker::new(paths).unwrap();
        assert!(matches!(
            unlocker.attempt("wrong-password"),
            Err(VaultError::AuthenticationFailure)
        ));

        let vault = unlocker.attempt("CorrectHorse1!").unwrap();
        assert_eq!(vault.store().get_account(2).unwrap().title(), "Bank");
    }

    #[test]
    fn all_fields_damaged_rejects_every_password() {
        let dir = tempdir().unwrap();
        let paths = VaultPaths::in_dir(dir.path());
        vault_with_two_accounts(&paths);
        edit_body(&paths, |body| {
            body["accounts"][0]["title"] = "AAAA".into();
            body["accounts"][1]["title"] = "AAAA".into();
        });

        let unlocker = Unlocker::new(paths).unwrap();
        assert!(unlocker.attempt("CorrectHorse1!").is_err());
        assert!(unlocker.attempt("anything").is_err());
    }
}
