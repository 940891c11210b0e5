//! File format v1 for the vault data file.
//!
//! V1 File Format:
//! ```text
//! MAGIC (4) | VERSION (1) | JSON RECORD TABLE
//! ```
//!
//! Sensitive columns inside the JSON are base64 `EncryptedField` strings.

use super::{MAGIC, MAGIC_LEN, VER_LEN};
use crate::error::VaultError;
use crate::store::RecordTable;

/// Current file format version.
pub const VERSION_V1: u8 = 1;

const HEADER_LEN: usize = MAGIC_LEN + VER_LEN;

pub fn parse(data: &[u8]) -> Result<RecordTable, VaultError> {
    if data.len() < HEADER_LEN {
        return Err(VaultError::CorruptVault("file too short for v1".into()));
    }

    Ok(serde_json::from_slice(&data[HEADER_LEN..])?)
}

pub fn serialize(table: &RecordTable) -> Result<Vec<u8>, VaultError> {
    let body = serde_json::to_vec(table)?;

    let mut buf = Vec::with_capacity(HEADER_LEN + body.len());
    buf.extend_from_slice(MAGIC);
    buf.push(VERSION_V1);
    buf.extend_from_slice(&body);

    Ok(buf)
}
