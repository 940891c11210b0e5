//! Field-level authenticated encryption.
//!
//! Stored field layout (base64 in the data file):
//! ```text
//! NONCE (12) | CIPHERTEXT (n) | TAG (16)
//! ```

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use super::{DerivedKey, NONCE_LEN, TAG_LEN, secure_random};
use crate::error::VaultError;

/// Canonical on-disk form of encrypted dates.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// The stored representation of one sensitive column value.
///
/// Holds the base64 text exactly as stored. Reading a data file never
/// inspects it; a field too damaged to decode fails on its own when it is
/// decrypted, leaving every other record readable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EncryptedField(String);

impl EncryptedField {
    /// Minimum size of a well-formed field: nonce and tag around an empty ciphertext.
    pub const MIN_LEN: usize = NONCE_LEN + TAG_LEN;

    /// Wraps raw stored bytes, checking that nonce and tag are present.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, VaultError> {
        check_len(bytes.len())?;
        Ok(Self(BASE64.encode(bytes)))
    }

    /// Parses the base64 text form used in the data file.
    pub fn from_encoded(encoded: &str) -> Result<Self, VaultError> {
        let field = Self(encoded.to_owned());
        field.decode()?;
        Ok(field)
    }

    pub fn to_encoded(&self) -> String {
        self.0.clone()
    }

    /// Decodes the stored text into `nonce | ciphertext | tag`.
    ///
    /// # Errors
    ///
    /// [`VaultError::MalformedField`] on invalid base64 or a missing nonce or tag.
    pub fn decode(&self) -> Result<Vec<u8>, VaultError> {
        let bytes = BASE64
            .decode(&self.0)
            .map_err(|e| VaultError::MalformedField(format!("invalid base64: {e}")))?;
        check_len(bytes.len())?;
        Ok(bytes)
    }

    /// Returns `true` if [`EncryptedField::decode`] would succeed.
    pub fn is_well_formed(&self) -> bool {
        self.decode().is_ok()
    }
}

fn check_len(len: usize) -> Result<(), VaultError> {
    if len < EncryptedField::MIN_LEN {
        return Err(VaultError::MalformedField(format!(
            "expected at least {} bytes, found {len}",
            EncryptedField::MIN_LEN
        )));
    }
    Ok(())
}

/// Encrypt a string value under `key` with a fresh random nonce.
pub fn encrypt_field(plaintext: &str, key: &DerivedKey) -> Result<EncryptedField, VaultError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;

    let sealed = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
        .map_err(|_| VaultError::InvalidInput("value too large to encrypt".into()))?;

    let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&sealed);
    Ok(EncryptedField(BASE64.encode(out)))
}

/// Decrypt a stored field.
///
/// A tag mismatch yields [`VaultError::AuthenticationFailure`]; no plaintext
/// is returned unless the tag verifies. A field that cannot be decoded is
/// [`VaultError::MalformedField`].
pub fn decrypt_field(field: &EncryptedField, key: &DerivedKey) -> Result<String, VaultError> {
    let stored = field.decode()?;
    let (nonce, sealed) = stored.split_at(NONCE_LEN);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce), sealed)
        .map_err(|_| VaultError::AuthenticationFailure)?;

    String::from_utf8(plaintext).map_err(|e| {
        e.into_bytes().zeroize();
        VaultError::MalformedField("plaintext is not valid UTF-8".into())
    })
}

/// Encrypts and decrypts record columns with the session key.
#[derive(Clone)]
pub struct FieldCipher {
    key: DerivedKey,
}

impl FieldCipher {
    pub fn new(key: DerivedKey) -> Self {
        Self { key }
    }

    pub fn key(&self) -> &DerivedKey {
        &self.key
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<EncryptedField, VaultError> {
        encrypt_field(plaintext, &self.key)
    }

    pub fn decrypt(&self, field: &EncryptedField) -> Result<String, VaultError> {
        decrypt_field(field, &self.key)
    }

    /// Encrypts an optional column. `None` and the empty string both map to
    /// `None`, so "not provided" is never stored as ciphertext.
    pub fn encrypt_optional(
        &self,
        plaintext: Option<&str>,
    ) -> Result<Option<EncryptedField>, VaultError> {
        match plaintext {
            Some(value) if !value.is_empty() => self.encrypt(value).map(Some),
            _ => Ok(None),
        }
    }

    pub fn decrypt_optional(
        &self,
        field: Option<&EncryptedField>,
    ) -> Result<Option<String>, VaultError> {
        field.map(|f| self.decrypt(f)).transpose()
    }

    pub fn encrypt_date(&self, date: NaiveDate) -> Result<EncryptedField, VaultError> {
        self.encrypt(&date.format(DATE_FORMAT).to_string())
    }

    pub fn decrypt_date(&self, field: &EncryptedField) -> Result<NaiveDate, VaultError> {
        let text = self.decrypt(field)?;
        NaiveDate::parse_from_str(&text, DATE_FORMAT)
            .map_err(|_| VaultError::MalformedField("stored value is not an ISO-8601 date".into()))
    }

    pub fn encrypt_optional_date(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<Option<EncryptedField>, VaultError> {
        date.map(|d| self.encrypt_date(d)).transpose()
    }

    pub fn decrypt_optional_date(
        &self,
        field: Option<&EncryptedField>,
    ) -> Result<Option<NaiveDate>, VaultError> {
        field.map(|f| self.decrypt_date(f)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KEY_LEN;

    fn key(byte: u8) -> DerivedKey {
        DerivedKey::from_bytes([byte; KEY_LEN])
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let k = key(1);
        for s in ["my-secret-password", "", "zażółć gęślą jaźń", "🔐 emoji"] {
            let field = encrypt_field(s, &k).unwrap();
            assert_eq!(decrypt_field(&field, &k).unwrap(), s);
        }
    }

    #[test]
    fn field_layout_is_nonce_ciphertext_tag() {
        let field = encrypt_field("abc", &key(1)).unwrap();
        assert_eq!(field.decode().unwrap().len(), NONCE_LEN + 3 + TAG_LEN);

        let empty = encrypt_field("", &key(1)).unwrap();
        assert_eq!(empty.decode().unwrap().len(), EncryptedField::MIN_LEN);
    }

    #[test]
    fn wrong_key_is_rejected() {
        let field = encrypt_field("secret", &key(1)).unwrap();

        match decrypt_field(&field, &key(2)) {
            Err(VaultError::AuthenticationFailure) => {}
            other => panic!("expected AuthenticationFailure, got: {other:?}"),
        }
    }

    #[test]
    fn any_flipped_bit_is_detected() {
        let k = key(3);
        let stored = encrypt_field("tamper me", &k).unwrap().decode().unwrap();

        for i in 0..stored.len() {
            for bit in [0x01u8, 0x80] {
                let mut bytes = stored.clone();
                bytes[i] ^= bit;
                let tampered = EncryptedField::from_bytes(bytes).unwrap();
                assert!(
                    matches!(
                        decrypt_field(&tampered, &k),
                        Err(VaultError::AuthenticationFailure)
                    ),
                    "flip at byte {i} was not detected"
                );
            }
        }
    }

    #[test]
    fn same_plaintext_encrypts_differently() {
        let k = key(4);
        let a = encrypt_field("same", &k).unwrap();
        let b = encrypt_field("same", &k).unwrap();

        assert_ne!(a, b);
        assert_ne!(
            a.decode().unwrap()[..NONCE_LEN],
            b.decode().unwrap()[..NONCE_LEN]
        );
        assert_eq!(decrypt_field(&a, &k).unwrap(), "same");
        assert_eq!(decrypt_field(&b, &k).unwrap(), "same");
    }

    #[test]
    fn too_short_field_is_malformed() {
        assert!(matches!(
            EncryptedField::from_bytes(vec![0u8; EncryptedField::MIN_LEN - 1]),
            Err(VaultError::MalformedField(_))
        ));
    }

    #[test]
    fn invalid_base64_is_malformed() {
        assert!(matches!(
            EncryptedField::from_encoded("not base64 at all!"),
            Err(VaultError::MalformedField(_))
        ));
    }

    #[test]
    fn serializes_as_base64_string() {
        let field = encrypt_field("x", &key(5)).unwrap();
        let json = serde_json::to_value(&field).unwrap();

        assert_eq!(json.as_str().unwrap(), field.to_encoded());

        let back: EncryptedField = serde_json::from_value(json).unwrap();
        assert_eq!(back, field);
    }

    #[test]
    fn damaged_stored_text_fails_only_on_decrypt() {
        let k = key(5);
        for stored in [BASE64.encode([0u8; 4]), "AAAA".to_owned(), "not base64!".to_owned()] {
            let field: EncryptedField = serde_json::from_value(serde_json::json!(stored)).unwrap();

            assert!(!field.is_well_formed());
            assert!(matches!(
                decrypt_field(&field, &k),
                Err(VaultError::MalformedField(_))
            ));
        }
    }

    #[test]
    fn dates_use_iso_format() {
        let cipher = FieldCipher::new(key(6));
        let date = NaiveDate::from_ymd_opt(2027, 3, 9).unwrap();

        let field = cipher.encrypt_date(date).unwrap();
        assert_eq!(cipher.decrypt(&field).unwrap(), "2027-03-09");
        assert_eq!(cipher.decrypt_date(&field).unwrap(), date);
    }

    #[test]
    fn non_date_plaintext_is_malformed_date() {
        let cipher = FieldCipher::new(key(6));
        let field = cipher.encrypt("yesterday").unwrap();

        assert!(matches!(
            cipher.decrypt_date(&field),
            Err(VaultError::MalformedField(_))
        ));
    }

    #[test]
    fn absent_and_empty_optionals_are_not_encrypted() {
        let cipher = FieldCipher::new(key(7));

        assert!(cipher.encrypt_optional(None).unwrap().is_none());
        assert!(cipher.encrypt_optional(Some("")).unwrap().is_none());
        assert!(cipher.encrypt_optional_date(None).unwrap().is_none());

        let url = cipher.encrypt_optional(Some("https://example.com")).unwrap();
        assert_eq!(
            cipher.decrypt_optional(url.as_ref()).unwrap().as_deref(),
            Some("https://example.com")
        );
        assert_eq!(cipher.decrypt_optional(None).unwrap(), None);
    }
}
