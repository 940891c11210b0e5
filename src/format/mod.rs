//! File format handling for the vault data file.
//!
//! Provides version-aware parsing and serialization of the record table.

use crate::error::VaultError;
use crate::store::RecordTable;

pub mod v1;

/// Magic bytes identifying a passvault data file ("PVLT").
pub const MAGIC: &[u8; 4] = b"PVLT";
/// Length of magic bytes.
pub const MAGIC_LEN: usize = 4;
/// Length of version field.
pub const VER_LEN: usize = 1;
/// Latest format version
pub const CURRENT_VERSION: u8 = v1::VERSION_V1;

/// Parses a data file into its record table.
///
/// Automatically dispatches to the appropriate version parser.
///
/// # Errors
///
/// Returns [`VaultError::CorruptVault`] if:
/// - The file is too short
/// - The magic bytes are invalid
/// - The version is unsupported
/// - The body does not parse
pub fn parse(data: &[u8]) -> Result<RecordTable, VaultError> {
    if data.len() < MAGIC_LEN + VER_LEN {
        return Err(VaultError::CorruptVault("file too short".into()));
    }

    if &data[..MAGIC_LEN] != MAGIC {
        return Err(VaultError::CorruptVault("invalid magic".into()));
    }

    match data[MAGIC_LEN] {
        v1::VERSION_V1 => v1::parse(data),
        version => Err(VaultError::CorruptVault(format!(
            "unsupported version {version}"
        ))),
    }
}

/// Serializes a record table in the current format version.
pub fn serialize(table: &RecordTable) -> Result<Vec<u8>, VaultError> {
    v1::serialize(table)
}
