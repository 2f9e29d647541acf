//! Table Metadata File
//!
//! ## Layout (little-endian)
//! ```text
//! ┌────────┬──────────────────────────────────────────────┬─────────┐
//! │ Offset │ Field                                        │ Since   │
//! ├────────┼──────────────────────────────────────────────┼─────────┤
//! │   0    │ i32 version                                  │  all    │
//! │   4    │ i32 column count                             │  all    │
//! │   8    │ i32 partition by                             │  all    │
//! │  12    │ i32 designated timestamp index (-1 = none)   │  all    │
//! │  16    │ i32 table id                                 │  417    │
//! │  20    │ i32 max uncommitted rows                     │  419    │
//! │  24    │ i64 commit hysteresis (micros)               │  419    │
//! │ 32-127 │ reserved                                     │         │
//! │  128   │ column descriptors, 16 bytes each            │  all    │
//! │        │   +0 i32 type, +4 u32 flags, +8 i32 capacity │         │
//! │  ...   │ column names: u32 length + UTF-8             │  all    │
//! └────────┴──────────────────────────────────────────────┴─────────┘
//! ```
//!
//! The byte shape is the same across versions; a field introduced by a later
//! version is zero in older files and decodes as zero.

use bytes::{BufMut, BytesMut};

use crate::column_type::{ColumnType, TypeRegistry};
use crate::error::{Result, StrataError};
use crate::table::PartitionBy;

use super::{
    check_version, get_bytes, get_count, get_i32, get_i64, get_u32, CURRENT_VERSION,
    VERSION_TBL_META_HYSTERESIS, VERSION_THAT_ADDED_TABLE_ID,
};

pub(crate) const KIND: &str = "metadata file";

pub const META_OFFSET_VERSION: u64 = 0;
pub const META_OFFSET_COUNT: u64 = 4;
pub const META_OFFSET_PARTITION_BY: u64 = 8;
pub const META_OFFSET_TIMESTAMP_INDEX: u64 = 12;
pub const META_OFFSET_TABLE_ID: u64 = 16;
pub const META_OFFSET_MAX_UNCOMMITTED_ROWS: u64 = 20;
pub const META_OFFSET_COMMIT_HYSTERESIS_MICROS: u64 = 24;
pub const META_OFFSET_COLUMN_TYPES: u64 = 128;
pub const META_COLUMN_DATA_SIZE: u64 = 16;

const FLAG_INDEXED: u32 = 1;
const FLAG_DESIGNATED_TIMESTAMP: u32 = 1 << 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub column_type: ColumnType,
    pub indexed: bool,
    /// Value block capacity of the symbol index, when indexed
    pub index_value_block_capacity: i32,
    pub designated_timestamp: bool,
}

/// Parsed metadata file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableMetadata {
    pub version: i32,
    /// Zero when the file predates table ids
    pub table_id: i32,
    pub partition_by: PartitionBy,
    pub timestamp_index: Option<usize>,
    pub columns: Vec<ColumnDescriptor>,
    /// Zero when the file predates the field
    pub max_uncommitted_rows: i32,
    /// Zero when the file predates the field
    pub commit_hysteresis_micros: i64,
}

impl TableMetadata {
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Indexes of symbol columns, in column order
    pub fn symbol_columns(&self) -> Vec<usize> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.column_type == ColumnType::Symbol)
            .map(|(i, _)| i)
            .collect()
    }
}

/// Decode a metadata image whose version tag the caller already read
pub fn decode_meta(bytes: &[u8], version: i32, registry: &TypeRegistry) -> Result<TableMetadata> {
    check_version(KIND, bytes, version)?;

    let count = get_count(
        bytes,
        META_OFFSET_COUNT as usize,
        META_COLUMN_DATA_SIZE as usize,
        KIND,
    )?;
    let partition_by = PartitionBy::from_code(get_i32(bytes, META_OFFSET_PARTITION_BY as usize, KIND)?)?;

    let timestamp_index = match get_i32(bytes, META_OFFSET_TIMESTAMP_INDEX as usize, KIND)? {
        -1 => None,
        i if i >= 0 && (i as usize) < count => Some(i as usize),
        i => {
            return Err(StrataError::corrupt(
                KIND,
                format!("timestamp index {} outside {} columns", i, count),
            ))
        }
    };

    let table_id = if version >= VERSION_THAT_ADDED_TABLE_ID {
        get_i32(bytes, META_OFFSET_TABLE_ID as usize, KIND)?
    } else {
        0
    };

    let (max_uncommitted_rows, commit_hysteresis_micros) = if version >= VERSION_TBL_META_HYSTERESIS {
        (
            get_i32(bytes, META_OFFSET_MAX_UNCOMMITTED_ROWS as usize, KIND)?,
            get_i64(bytes, META_OFFSET_COMMIT_HYSTERESIS_MICROS as usize, KIND)?,
        )
    } else {
        (0, 0)
    };

    let mut columns = Vec::with_capacity(count);
    let mut name_offset = META_OFFSET_COLUMN_TYPES as usize + count * META_COLUMN_DATA_SIZE as usize;
    for i in 0..count {
        let base = META_OFFSET_COLUMN_TYPES as usize + i * META_COLUMN_DATA_SIZE as usize;
        let column_type = registry.lookup(get_i32(bytes, base, KIND)?)?.column_type;
        let flags = get_u32(bytes, base + 4, KIND)?;
        let capacity = get_i32(bytes, base + 8, KIND)?;

        let name_len = get_u32(bytes, name_offset, KIND)? as usize;
        let raw = get_bytes(bytes, name_offset + 4, name_len, KIND)?;
        let name = String::from_utf8(raw.to_vec())
            .map_err(|_| StrataError::corrupt(KIND, format!("column {} name is not UTF-8", i)))?;
        name_offset += 4 + name_len;

        columns.push(ColumnDescriptor {
            name,
            column_type,
            indexed: flags & FLAG_INDEXED != 0,
            index_value_block_capacity: capacity,
            designated_timestamp: timestamp_index == Some(i),
        });
    }

    if let Some(i) = timestamp_index {
        if columns[i].column_type != ColumnType::Timestamp {
            return Err(StrataError::corrupt(
                KIND,
                format!("designated timestamp column '{}' is {}", columns[i].name, columns[i].column_type),
            ));
        }
    }

    Ok(TableMetadata {
        version,
        table_id,
        partition_by,
        timestamp_index,
        columns,
        max_uncommitted_rows,
        commit_hysteresis_micros,
    })
}

/// Encode in the current layout, tagged with [`CURRENT_VERSION`]
pub fn encode_meta(meta: &TableMetadata) -> Vec<u8> {
    let names_len: usize = meta.columns.iter().map(|c| 4 + c.name.len()).sum();
    let mut buf = BytesMut::with_capacity(
        META_OFFSET_COLUMN_TYPES as usize + meta.columns.len() * META_COLUMN_DATA_SIZE as usize + names_len,
    );

    buf.put_i32_le(CURRENT_VERSION);
    buf.put_i32_le(meta.columns.len() as i32);
    buf.put_i32_le(meta.partition_by.code());
    buf.put_i32_le(meta.timestamp_index.map_or(-1, |i| i as i32));
    buf.put_i32_le(meta.table_id);
    buf.put_i32_le(meta.max_uncommitted_rows);
    buf.put_i64_le(meta.commit_hysteresis_micros);
    buf.resize(META_OFFSET_COLUMN_TYPES as usize, 0);

    for (i, column) in meta.columns.iter().enumerate() {
        let mut flags = 0;
        if column.indexed {
            flags |= FLAG_INDEXED;
        }
        if meta.timestamp_index == Some(i) {
            flags |= FLAG_DESIGNATED_TIMESTAMP;
        }
        buf.put_i32_le(column.column_type.id());
        buf.put_u32_le(flags);
        buf.put_i32_le(column.index_value_block_capacity);
        buf.put_i32_le(0);
    }

    for column in &meta.columns {
        buf.put_u32_le(column.name.len() as u32);
        buf.put_slice(column.name.as_bytes());
    }

    buf.to_vec()
}
