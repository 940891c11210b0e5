//! Accounts and custom fields, persisted with every sensitive column encrypted.
//!
//! The schema is fixed; only the [`FieldCipher`] handed to
//! [`EncryptedRecordStore`] decides which key the columns are sealed with.

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::authenticator::ProbeSource;
use crate::crypto::{EncryptedField, FieldCipher};
use crate::error::VaultError;
use crate::format;
use crate::storage::Storage;

/// Accounts expiring within this many days are flagged.
pub const EXPIRY_WARNING_DAYS: i64 = 10;

/// Decrypted view of an account. `Debug` shows only the clear columns.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Account {
    id: u64,
    title: String,
    user_name: String,
    password: String,
    url: Option<String>,
    notes: Option<String>,
    #[zeroize(skip)]
    expiration_date: Option<NaiveDate>,
    #[zeroize(skip)]
    creation_date: DateTime<Local>,
    #[zeroize(skip)]
    last_modification_date: DateTime<Local>,
}

impl Account {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn user_name(&self) -> &str {
        &self.user_name
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn expiration_date(&self) -> Option<NaiveDate> {
        self.expiration_date
    }

    pub fn creation_date(&self) -> DateTime<Local> {
        self.creation_date
    }

    pub fn last_modification_date(&self) -> DateTime<Local> {
        self.last_modification_date
    }

    pub fn expiry_status(&self, today: NaiveDate) -> ExpiryStatus {
        match self.expiration_date {
            None => ExpiryStatus::NoExpiry,
            Some(date) if date < today => ExpiryStatus::Expired,
            Some(date) if (date - today).num_days() <= EXPIRY_WARNING_DAYS => {
                ExpiryStatus::ExpiringSoon
            }
            Some(_) => ExpiryStatus::Valid,
        }
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("creation_date", &self.creation_date)
            .field("last_modification_date", &self.last_modification_date)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    NoExpiry,
    Expired,
    ExpiringSoon,
    Valid,
}

/// Decrypted view of a custom key/value field attached to an account.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct CustomField {
    id: u64,
    account_id: u64,
    name: String,
    value: String,
    #[zeroize(skip)]
    creation_date: DateTime<Local>,
    #[zeroize(skip)]
    last_modification_date: DateTime<Local>,
}

impl CustomField {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn account_id(&self) -> u64 {
        self.account_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn creation_date(&self) -> DateTime<Local> {
        self.creation_date
    }

    pub fn last_modification_date(&self) -> DateTime<Local> {
        self.last_modification_date
    }
}

impl fmt::Debug for CustomField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomField")
            .field("id", &self.id)
            .field("account_id", &self.account_id)
            .field("creation_date", &self.creation_date)
            .field("last_modification_date", &self.last_modification_date)
            .finish_non_exhaustive()
    }
}

/// Input for [`EncryptedRecordStore::create_account`].
#[derive(Debug, Clone, Default)]
pub struct NewAccount {
    pub title: String,
    pub user_name: String,
    pub password: String,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

impl NewAccount {
    pub fn new(
        title: impl Into<String>,
        user_name: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            user_name: user_name.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), VaultError> {
        require("title", &self.title)?;
        require("user name", &self.user_name)?;
        require("password", &self.password)
    }
}

/// Changes for [`EncryptedRecordStore::update_account`]. `None` and empty
/// strings leave the column untouched.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub title: Option<String>,
    pub user_name: Option<String>,
    pub password: Option<String>,
    pub url: Option<String>,
    pub notes: Option<String>,
    pub expiration_date: Option<NaiveDate>,
}

#[derive(Debug, Clone)]
pub struct NewCustomField {
    pub account_id: u64,
    pub name: String,
    pub value: String,
}

impl NewCustomField {
    pub fn new(account_id: u64, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            account_id,
            name: name.into(),
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CustomFieldUpdate {
    pub name: Option<String>,
    pub value: Option<String>,
}

fn require(what: &str, value: &str) -> Result<(), VaultError> {
    if value.is_empty() {
        return Err(VaultError::InvalidInput(format!("{what} cannot be empty")));
    }
    Ok(())
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct AccountRow {
    id: u64,
    title: EncryptedField,
    user_name: EncryptedField,
    password: EncryptedField,
    url: Option<EncryptedField>,
    notes: Option<EncryptedField>,
    expiration_date: Option<EncryptedField>,
    creation_date: DateTime<Local>,
    last_modification_date: DateTime<Local>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct CustomFieldRow {
    id: u64,
    account_id: u64,
    name: EncryptedField,
    value: EncryptedField,
    creation_date: DateTime<Local>,
    last_modification_date: DateTime<Local>,
}

/// The persisted content of the data file, sensitive columns still sealed.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RecordTable {
    next_account_id: u64,
    next_custom_field_id: u64,
    creation_date: DateTime<Local>,
    accounts: Vec<AccountRow>,
    custom_fields: Vec<CustomFieldRow>,
}

impl Default for RecordTable {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordTable {
    pub fn new() -> Self {
        Self {
            next_account_id: 1,
            next_custom_field_id: 1,
            creation_date: Local::now(),
            accounts: Vec::new(),
            custom_fields: Vec::new(),
        }
    }

    /// Reads the table from `storage`, or starts an empty one if the file is absent.
    pub fn load(storage: &Storage) -> Result<Self, VaultError> {
        match storage.load()? {
            Some(data) => format::parse(&data),
            None => Ok(Self::new()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    pub fn account_count(&self) -> usize {
        self.accounts.len()
    }

    pub fn custom_field_count(&self) -> usize {
        self.custom_fields.len()
    }

    pub fn creation_date(&self) -> DateTime<Local> {
        self.creation_date
    }

    fn account_row(&self, id: u64) -> Result<&AccountRow, VaultError> {
        self.accounts
            .iter()
            .find(|row| row.id == id)
            .ok_or(VaultError::AccountNotFound(id))
    }

    fn account_row_mut(&mut self, id: u64) -> Result<&mut AccountRow, VaultError> {
        self.accounts
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(VaultError::AccountNotFound(id))
    }

    fn custom_field_row(&self, id: u64) -> Result<&CustomFieldRow, VaultError> {
        self.custom_fields
            .iter()
            .find(|row| row.id == id)
            .ok_or(VaultError::CustomFieldNotFound(id))
    }

    fn custom_field_row_mut(&mut self, id: u64) -> Result<&mut CustomFieldRow, VaultError> {
        self.custom_fields
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(VaultError::CustomFieldNotFound(id))
    }
}

impl ProbeSource for RecordTable {
    /// The first decodable account title (then custom field name). A table
    /// whose fields are all damaged still offers one, so no key passes.
    fn probe_field(&self) -> Option<&EncryptedField> {
        let mut candidates = self
            .accounts
            .iter()
            .map(|row| &row.title)
            .chain(self.custom_fields.iter().map(|row| &row.name));
        let first = candidates.next()?;

        if first.is_well_formed() {
            return Some(first);
        }
        candidates.find(|f| f.is_well_formed()).or(Some(first))
    }
}

/// Record storage bound to one session key.
///
/// Every mutation is written to disk before it becomes visible in memory.
pub struct EncryptedRecordStore {
    table: RecordTable,
    storage: Storage,
    cipher: FieldCipher,
}

impl EncryptedRecordStore {
    /// Opens the data file at `storage`, treating a missing file as an empty vault.
    pub fn open(storage: Storage, cipher: FieldCipher) -> Result<Self, VaultError> {
        let table = RecordTable::load(&storage)?;
        Ok(Self::from_parts(table, storage, cipher))
    }

    pub(crate) fn from_parts(table: RecordTable, storage: Storage, cipher: FieldCipher) -> Self {
        Self {
            table,
            storage,
            cipher,
        }
    }

    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Writes the current table, e.g. to create the data file of a new vault.
    pub fn flush(&self) -> Result<(), VaultError> {
        self.storage.save(&format::serialize(&self.table)?)
    }

    fn commit(&mut self, table: RecordTable) -> Result<(), VaultError> {
        self.storage.save(&format::serialize(&table)?)?;
        self.table = table;
        Ok(())
    }

    // --------------------------------------------------
    // ACCOUNTS
    // --------------------------------------------------

    pub fn create_account(&mut self, new: NewAccount) -> Result<Account, VaultError> {
        new.validate()?;

        let now = Local::now();
        let mut table = self.table.clone();
        let id = table.next_account_id;
        table.next_account_id += 1;
        table.accounts.push(AccountRow {
            id,
            title: self.cipher.encrypt(&new.title)?,
            user_name: self.cipher.encrypt(&new.user_name)?,
            password: self.cipher.encrypt(&new.password)?,
            url: self.cipher.encrypt_optional(new.url.as_deref())?,
            notes: self.cipher.encrypt_optional(new.notes.as_deref())?,
            expiration_date: self.cipher.encrypt_optional_date(new.expiration_date)?,
            creation_date: now,
            last_modification_date: now,
        });
        self.commit(table)?;

        tracing::info!(account_id = id, "account created");
        self.get_account(id)
    }

    pub fn get_account(&self, id: u64) -> Result<Account, VaultError> {
        self.decrypt_account(self.table.account_row(id)?)
    }

    pub fn list_accounts(&self) -> Result<Vec<Account>, VaultError> {
        self.table
            .accounts
            .iter()
            .map(|row| self.decrypt_account(row))
            .collect()
    }

    /// Case-insensitive substring search over title, user name and URL.
    pub fn find_accounts(&self, query: &str) -> Result<Vec<Account>, VaultError> {
        let needle = query.to_lowercase();
        let matches = |text: &str| text.to_lowercase().contains(&needle);

        Ok(self
            .list_accounts()?
            .into_iter()
            .filter(|a| {
                matches(a.title()) || matches(a.user_name()) || a.url().is_some_and(|u| matches(u))
            })
            .collect())
    }

    /// Applies the provided changes. The modification date moves only if a
    /// value actually changed.
    pub fn update_account(
        &mut self,
        id: u64,
        update: AccountUpdate,
    ) -> Result<Account, VaultError> {
        let mut table = self.table.clone();
        let row = table.account_row_mut(id)?;
        let cipher = &self.cipher;

        let mut changed = false;
        changed |= apply_text(cipher, &mut row.title, update.title.as_deref())?;
        changed |= apply_text(cipher, &mut row.user_name, update.user_name.as_deref())?;
        changed |= apply_text(cipher, &mut row.password, update.password.as_deref())?;
        changed |= apply_optional_text(cipher, &mut row.url, update.url.as_deref())?;
        changed |= apply_optional_text(cipher, &mut row.notes, update.notes.as_deref())?;
        changed |= apply_optional_date(cipher, &mut row.expiration_date, update.expiration_date)?;

        if changed {
            row.last_modification_date = Local::now();
            self.commit(table)?;
            tracing::info!(account_id = id, "account updated");
        }

        self.get_account(id)
    }

    /// Deletes an account together with all of its custom fields.
    pub fn delete_account(&mut self, id: u64) -> Result<(), VaultError> {
        self.table.account_row(id)?;

        let mut table = self.table.clone();
        table.accounts.retain(|row| row.id != id);
        let before = table.custom_fields.len();
        table.custom_fields.retain(|row| row.account_id != id);
        let cascaded = before - table.custom_fields.len();
        self.commit(table)?;

        tracing::info!(account_id = id, custom_fields = cascaded, "account deleted");
        Ok(())
    }

    // --------------------------------------------------
    // CUSTOM FIELDS
    // --------------------------------------------------

    pub fn create_custom_field(&mut self, new: NewCustomField) -> Result<CustomField, VaultError> {
        require("field name", &new.name)?;
        require("field value", &new.value)?;
        self.table.account_row(new.account_id)?;

        let now = Local::now();
        let mut table = self.table.clone();
        let id = table.next_custom_field_id;
        table.next_custom_field_id += 1;
        table.custom_fields.push(CustomFieldRow {
            id,
            account_id: new.account_id,
            name: self.cipher.encrypt(&new.name)?,
            value: self.cipher.encrypt(&new.value)?,
            creation_date: now,
            last_modification_date: now,
        });
        self.commit(table)?;

        tracing::info!(
            custom_field_id = id,
            account_id = new.account_id,
            "custom field created"
        );
        self.get_custom_field(id)
    }

    pub fn get_custom_field(&self, id: u64) -> Result<CustomField, VaultError> {
        self.decrypt_custom_field(self.table.custom_field_row(id)?)
    }

    pub fn list_custom_fields(&self) -> Result<Vec<CustomField>, VaultError> {
        self.table
            .custom_fields
            .iter()
            .map(|row| self.decrypt_custom_field(row))
            .collect()
    }

    pub fn custom_fields_for(&self, account_id: u64) -> Result<Vec<CustomField>, VaultError> {
        self.table.account_row(account_id)?;
        self.table
            .custom_fields
            .iter()
            .filter(|row| row.account_id == account_id)
            .map(|row| self.decrypt_custom_field(row))
            .collect()
    }

    pub fn update_custom_field(
        &mut self,
        id: u64,
        update: CustomFieldUpdate,
    ) -> Result<CustomField, VaultError> {
        let mut table = self.table.clone();
        let row = table.custom_field_row_mut(id)?;
        let cipher = &self.cipher;

        let mut changed = false;
        changed |= apply_text(cipher, &mut row.name, update.name.as_deref())?;
        changed |= apply_text(cipher, &mut row.value, update.value.as_deref())?;

        if changed {
            row.last_modification_date = Local::now();
            self.commit(table)?;
            tracing::info!(custom_field_id = id, "custom field updated");
        }

        self.get_custom_field(id)
    }

    pub fn delete_custom_field(&mut self, id: u64) -> Result<(), VaultError> {
        self.table.custom_field_row(id)?;

        let mut table = self.table.clone();
        table.custom_fields.retain(|row| row.id != id);
        self.commit(table)?;

        tracing::info!(custom_field_id = id, "custom field deleted");
        Ok(())
    }

    fn decrypt_account(&self, row: &AccountRow) -> Result<Account, VaultError> {
        Ok(Account {
            id: row.id,
            title: self.cipher.decrypt(&row.title)?,
            user_name: self.cipher.decrypt(&row.user_name)?,
            password: self.cipher.decrypt(&row.password)?,
            url: self.cipher.decrypt_optional(row.url.as_ref())?,
            notes: self.cipher.decrypt_optional(row.notes.as_ref())?,
            expiration_date: self
                .cipher
                .decrypt_optional_date(row.expiration_date.as_ref())?,
            creation_date: row.creation_date,
            last_modification_date: row.last_modification_date,
        })
    }

    fn decrypt_custom_field(&self, row: &CustomFieldRow) -> Result<CustomField, VaultError> {
        Ok(CustomField {
            id: row.id,
            account_id: row.account_id,
            name: self.cipher.decrypt(&row.name)?,
            value: self.cipher.decrypt(&row.value)?,
            creation_date: row.creation_date,
            last_modification_date: row.last_modification_date,
        })
    }
}

/// Re-encrypts `column` if `new` is non-empty and differs from the stored value.
fn apply_text(
    cipher: &FieldCipher,
    column: &mut EncryptedField,
    new: Option<&str>,
) -> Result<bool, VaultError> {
    let Some(value) = new.filter(|v| !v.is_empty()) else {
        return Ok(false);
    };

    let mut current = cipher.decrypt(column)?;
    let changed = current != value;
    current.zeroize();

    if changed {
        *column = cipher.encrypt(value)?;
    }
    Ok(changed)
}

fn apply_optional_text(
    cipher: &FieldCipher,
    column: &mut Option<EncryptedField>,
    new: Option<&str>,
) -> Result<bool, VaultError> {
    let Some(value) = new.filter(|v| !v.is_empty()) else {
        return Ok(false);
    };

    match column {
        Some(existing) => apply_text(cipher, existing, Some(value)),
        None => {
            *column = Some(cipher.encrypt(value)?);
            Ok(true)
        }
    }
}

fn apply_optional_date(
    cipher: &FieldCipher,
    column: &mut Option<EncryptedField>,
    new: Option<NaiveDate>,
) -> Result<bool, VaultError> {
    let Some(date) = new else {
        return Ok(false);
    };

    if let Some(existing) = column {
        if cipher.decrypt_date(existing)? == date {
            return Ok(false);
        }
    }
    *column = Some(cipher.encrypt_date(date)?);
    Ok(true)
}
