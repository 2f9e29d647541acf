//! Transaction File
//!
//! ## Layout (little-endian)
//! ```text
//! ┌────────┬───────────────────────────────────────────────┐
//! │ Offset │ Field                                         │
//! ├────────┼───────────────────────────────────────────────┤
//! │   0    │ i32 version, i32 reserved                     │
//! │   8    │ i64 txn                                       │
//! │  16    │ i64 transient row count (open partition)      │
//! │  24    │ i64 fixed row count (closed partitions)       │
//! │  32    │ i64 min timestamp                             │
//! │  40    │ i64 max timestamp                             │
//! │  48    │ i64 struct version                            │
//! │  56    │ i64 data version                              │
//! │  64    │ i64 partition table version                   │
//! │  72    │ i32 symbol column count (S)                   │
//! ├────────┴───────────────────────────────────────────────┤
//! │ legacy (< 418)                                         │
//! │  76    S × i32 distinct count                          │
//! │        i32 removed count (R), R × i64 timestamp        │
//! ├────────────────────────────────────────────────────────┤
//! │ current (>= 418)                                       │
//! │  76    S × (i32 count, i32 transient count)            │
//! │        i32 partition table size in bytes (P × 16)      │
//! │        P × (i64 timestamp, i64 row count)              │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Legacy files keep closed partition sizes outside the transaction file, in
//! one `_archive` file per partition directory.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, StrataError};

use super::{check_version, get_count, get_i32, get_i64, CURRENT_VERSION, VERSION_TX_STRUCT_UPDATE_1};

pub(crate) const KIND: &str = "transaction file";

pub const TX_OFFSET_VERSION: u64 = 0;
pub const TX_OFFSET_TXN: u64 = 8;
pub const TX_OFFSET_TRANSIENT_ROW_COUNT: u64 = 16;
pub const TX_OFFSET_FIXED_ROW_COUNT: u64 = 24;
pub const TX_OFFSET_MIN_TIMESTAMP: u64 = 32;
pub const TX_OFFSET_MAX_TIMESTAMP: u64 = 40;
pub const TX_OFFSET_STRUCT_VERSION: u64 = 48;
pub const TX_OFFSET_DATA_VERSION: u64 = 56;
pub const TX_OFFSET_PARTITION_TABLE_VERSION: u64 = 64;
pub const TX_OFFSET_MAP_WRITER_COUNT: u64 = 72;
pub const TX_OFFSET_SYMBOLS: u64 = 76;

/// Bytes per symbol column before the 418 layout
pub const LEGACY_SYMBOL_STRIDE: u64 = 4;
pub const SYMBOL_STRIDE: u64 = 8;
pub const PARTITION_ENTRY_SIZE: u64 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SymbolCount {
    pub count: i32,
    pub transient_count: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    pub timestamp: i64,
    pub row_count: i64,
}

/// Parsed transaction file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub version: i32,
    pub txn: i64,
    pub transient_row_count: i64,
    pub fixed_row_count: i64,
    pub min_timestamp: i64,
    pub max_timestamp: i64,
    pub struct_version: i64,
    pub data_version: i64,
    pub partition_table_version: i64,
    pub symbol_counts: Vec<SymbolCount>,
    /// Chronological; the last entry is the open partition. Empty in legacy files.
    pub partitions: Vec<PartitionEntry>,
    /// Legacy only: timestamps of partitions removed from the table
    pub removed_partitions: Vec<i64>,
}

impl TxRecord {
    /// State of a table that has never committed
    pub fn empty(symbol_columns: usize) -> Self {
        Self {
            version: CURRENT_VERSION,
            txn: 0,
            transient_row_count: 0,
            fixed_row_count: 0,
            min_timestamp: i64::MAX,
            max_timestamp: i64::MIN,
            struct_version: 0,
            data_version: 0,
            partition_table_version: 0,
            symbol_counts: vec![SymbolCount::default(); symbol_columns],
            partitions: Vec::new(),
            removed_partitions: Vec::new(),
        }
    }

    pub fn row_count(&self) -> i64 {
        self.fixed_row_count + self.transient_row_count
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }

    /// Every partition except the open one
    pub fn closed_partitions(&self) -> &[PartitionEntry] {
        let n = self.partitions.len().saturating_sub(1);
        &self.partitions[..n]
    }

    pub fn is_legacy_layout(&self) -> bool {
        self.version < VERSION_TX_STRUCT_UPDATE_1
    }
}

/// Image size of a legacy transaction file
pub fn legacy_tx_size(symbol_columns: usize, removed_partitions: usize) -> usize {
    TX_OFFSET_SYMBOLS as usize
        + symbol_columns * LEGACY_SYMBOL_STRIDE as usize
        + 4
        + removed_partitions * 8
}

/// Image size of a current transaction file
pub fn tx_size(symbol_columns: usize, partitions: usize) -> usize {
    TX_OFFSET_SYMBOLS as usize
        + symbol_columns * SYMBOL_STRIDE as usize
        + 4
        + partitions * PARTITION_ENTRY_SIZE as usize
}

/// Decode a transaction image whose version tag the caller already read
pub fn decode_tx(bytes: &[u8], version: i32) -> Result<TxRecord> {
    check_version(KIND, bytes, version)?;

    let mut tx = TxRecord {
        version,
        txn: get_i64(bytes, TX_OFFSET_TXN as usize, KIND)?,
        transient_row_count: get_i64(bytes, TX_OFFSET_TRANSIENT_ROW_COUNT as usize, KIND)?,
        fixed_row_count: get_i64(bytes, TX_OFFSET_FIXED_ROW_COUNT as usize, KIND)?,
        min_timestamp: get_i64(bytes, TX_OFFSET_MIN_TIMESTAMP as usize, KIND)?,
        max_timestamp: get_i64(bytes, TX_OFFSET_MAX_TIMESTAMP as usize, KIND)?,
        struct_version: get_i64(bytes, TX_OFFSET_STRUCT_VERSION as usize, KIND)?,
        data_version: get_i64(bytes, TX_OFFSET_DATA_VERSION as usize, KIND)?,
        partition_table_version: get_i64(bytes, TX_OFFSET_PARTITION_TABLE_VERSION as usize, KIND)?,
        symbol_counts: Vec::new(),
        partitions: Vec::new(),
        removed_partitions: Vec::new(),
    };

    let legacy = version < VERSION_TX_STRUCT_UPDATE_1;
    let stride = if legacy { LEGACY_SYMBOL_STRIDE } else { SYMBOL_STRIDE } as usize;
    let symbols = get_count(bytes, TX_OFFSET_MAP_WRITER_COUNT as usize, stride, KIND)?;

    let mut offset = TX_OFFSET_SYMBOLS as usize;
    for _ in 0..symbols {
        let count = get_i32(bytes, offset, KIND)?;
        let transient_count = if legacy {
            count
        } else {
            get_i32(bytes, offset + 4, KIND)?
        };
        tx.symbol_counts.push(SymbolCount {
            count,
            transient_count,
        });
        offset += stride;
    }

    if legacy {
        let removed = get_count(bytes, offset, 8, KIND)?;
        offset += 4;
        for _ in 0..removed {
            tx.removed_partitions.push(get_i64(bytes, offset, KIND)?);
            offset += 8;
        }
    } else {
        let table_size = get_i32(bytes, offset, KIND)?;
        if table_size < 0 || table_size as u64 % PARTITION_ENTRY_SIZE != 0 {
            return Err(StrataError::corrupt(
                KIND,
                format!("partition table size {} is not a multiple of {}", table_size, PARTITION_ENTRY_SIZE),
            ));
        }
        offset += 4;
        for _ in 0..(table_size as u64 / PARTITION_ENTRY_SIZE) {
            tx.partitions.push(PartitionEntry {
                timestamp: get_i64(bytes, offset, KIND)?,
                row_count: get_i64(bytes, offset + 8, KIND)?,
            });
            offset += PARTITION_ENTRY_SIZE as usize;
        }
    }

    Ok(tx)
}

/// Encode in the current layout, tagged with [`CURRENT_VERSION`].
///
/// The legacy removed-partition list has no place in this layout; migration
/// folds it into `partitions` before encoding, and a record still holding
/// one is rejected.
pub fn encode_tx(tx: &TxRecord) -> Result<Vec<u8>> {
    if !tx.removed_partitions.is_empty() {
        return Err(StrataError::InvalidArgument(format!(
            "transaction record still lists {} removed partitions",
            tx.removed_partitions.len()
        )));
    }

    let mut buf = BytesMut::with_capacity(tx_size(tx.symbol_counts.len(), tx.partitions.len()));
    buf.put_i32_le(CURRENT_VERSION);
    buf.put_i32_le(0);
    buf.put_i64_le(tx.txn);
    buf.put_i64_le(tx.transient_row_count);
    buf.put_i64_le(tx.fixed_row_count);
    buf.put_i64_le(tx.min_timestamp);
    buf.put_i64_le(tx.max_timestamp);
    buf.put_i64_le(tx.struct_version);
    buf.put_i64_le(tx.data_version);
    buf.put_i64_le(tx.partition_table_version);

    buf.put_i32_le(tx.symbol_counts.len() as i32);
    for symbol in &tx.symbol_counts {
        buf.put_i32_le(symbol.count);
        buf.put_i32_le(symbol.transient_count);
    }

    buf.put_i32_le((tx.partitions.len() as u64 * PARTITION_ENTRY_SIZE) as i32);
    for partition in &tx.partitions {
        buf.put_i64_le(partition.timestamp);
        buf.put_i64_le(partition.row_count);
    }

    Ok(buf.to_vec())
}
