//! Format Module
//!
//! Versioned binary layouts of the per-table metadata (`_meta`) and
//! transaction (`_txn`) files.
//!
//! ## Version Chain
//! ```text
//! 416 ──► 417 ──► 418 ──► 419 (current)
//!      │       │       └─ meta gains max uncommitted rows + commit hysteresis
//!      │       └───────── tx symbol stride 4 → 8, partition table replaces
//!      │                  removed-partition list and _archive files
//!      └───────────────── meta gains table id
//! ```
//!
//! The leading `i32` of both files is the version tag. Readers fetch it with
//! [`read_meta_version`] / [`read_tx_version`] and dispatch every other
//! field offset on it; encoders always emit the current layout.

pub mod meta;
pub mod tx;

use bytes::Buf;

use crate::error::{Result, StrataError};

pub use meta::{decode_meta, encode_meta, ColumnDescriptor, TableMetadata};
pub use tx::{decode_tx, encode_tx, PartitionEntry, SymbolCount, TxRecord};

// =============================================================================
// Versions
// =============================================================================

/// Oldest layout a migration step still understands
pub const VERSION_OLDEST_SUPPORTED: i32 = 416;

/// Metadata carries a table id from this version on
pub const VERSION_THAT_ADDED_TABLE_ID: i32 = 417;

/// Transaction file uses the 8-byte symbol stride and the partition table
pub const VERSION_TX_STRUCT_UPDATE_1: i32 = 418;

/// Metadata carries max uncommitted rows and commit hysteresis
pub const VERSION_TBL_META_HYSTERESIS: i32 = 419;

/// Layout written by this build
pub const CURRENT_VERSION: i32 = VERSION_TBL_META_HYSTERESIS;

// =============================================================================
// File Names
// =============================================================================

pub const META_FILE_NAME: &str = "_meta";
pub const TXN_FILE_NAME: &str = "_txn";
pub const UPGRADE_FILE_NAME: &str = "_upgrade.d";
pub const TABLE_INDEX_FILE_NAME: &str = "_tab_index.d";
/// Legacy per-partition row count, superseded by the tx partition table
pub const ARCHIVE_FILE_NAME: &str = "_archive";
pub const DEFAULT_PARTITION_NAME: &str = "default";

// =============================================================================
// Version Tags
// =============================================================================

/// Version tag of a metadata image; nothing else is interpreted
pub fn read_meta_version(bytes: &[u8]) -> Result<i32> {
    get_i32(bytes, meta::META_OFFSET_VERSION as usize, meta::KIND)
}

/// Version tag of a transaction image; nothing else is interpreted
pub fn read_tx_version(bytes: &[u8]) -> Result<i32> {
    get_i32(bytes, tx::TX_OFFSET_VERSION as usize, tx::KIND)
}

pub fn is_supported(version: i32) -> bool {
    (VERSION_OLDEST_SUPPORTED..=CURRENT_VERSION).contains(&version)
}

pub(crate) fn check_version(kind: &'static str, bytes: &[u8], version: i32) -> Result<()> {
    if !is_supported(version) {
        return Err(StrataError::UnsupportedFormatVersion { kind, version });
    }
    let stored = get_i32(bytes, 0, kind)?;
    if stored != version {
        return Err(StrataError::InvalidArgument(format!(
            "{} image is tagged {}, asked to decode as {}",
            kind, stored, version
        )));
    }
    Ok(())
}

// =============================================================================
// Checked Field Access
// =============================================================================

fn field<'a>(bytes: &'a [u8], offset: usize, len: usize, kind: &'static str) -> Result<&'a [u8]> {
    bytes.get(offset..offset + len).ok_or_else(|| {
        StrataError::corrupt(
            kind,
            format!(
                "field [{}, {}) past end of image [length={}]",
                offset,
                offset + len,
                bytes.len()
            ),
        )
    })
}

pub(crate) fn get_i32(bytes: &[u8], offset: usize, kind: &'static str) -> Result<i32> {
    Ok(field(bytes, offset, 4, kind)?.get_i32_le())
}

pub(crate) fn get_u32(bytes: &[u8], offset: usize, kind: &'static str) -> Result<u32> {
    Ok(field(bytes, offset, 4, kind)?.get_u32_le())
}

pub(crate) fn get_i64(bytes: &[u8], offset: usize, kind: &'static str) -> Result<i64> {
    Ok(field(bytes, offset, 8, kind)?.get_i64_le())
}

pub(crate) fn get_bytes<'a>(bytes: &'a [u8], offset: usize, len: usize, kind: &'static str) -> Result<&'a [u8]> {
    field(bytes, offset, len, kind)
}

/// A non-negative count field that must fit in the image
pub(crate) fn get_count(bytes: &[u8], offset: usize, stride: usize, kind: &'static str) -> Result<usize> {
    let count = get_i32(bytes, offset, kind)?;
    if count < 0 || (count as usize).saturating_mul(stride) > bytes.len() {
        return Err(StrataError::corrupt(
            kind,
            format!("implausible count {} at offset {}", count, offset),
        ));
    }
    Ok(count as usize)
}
