//! Table model and table creation.
//!
//! `create_table` writes a table at any supported format version so that
//! older layouts can be produced for migration.

use std::path::{Path, PathBuf};

use bytes::BufMut;
use tracing::info;

use crate::column_type::{ColumnType, TypeRegistry};
use crate::error::{Result, StrataError};
use crate::files::{self, FilesFacade};
use crate::format::meta::{
    META_OFFSET_COMMIT_HYSTERESIS_MICROS, META_OFFSET_MAX_UNCOMMITTED_ROWS, META_OFFSET_TABLE_ID,
};
use crate::format::tx::{legacy_tx_size, TX_OFFSET_SYMBOLS};
use crate::format::{
    self, encode_meta, encode_tx, ColumnDescriptor, TableMetadata, TxRecord, META_FILE_NAME,
    TXN_FILE_NAME, VERSION_TBL_META_HYSTERESIS, VERSION_THAT_ADDED_TABLE_ID,
    VERSION_TX_STRUCT_UPDATE_1,
};

use super::PartitionBy;

/// Column layout of a table to be created
#[derive(Debug, Clone)]
pub struct TableModel {
    name: String,
    partition_by: PartitionBy,
    columns: Vec<ColumnDescriptor>,
    timestamp_index: Option<usize>,
    max_uncommitted_rows: i32,
    commit_hysteresis_micros: i64,
}

impl TableModel {
    pub fn new(name: impl Into<String>, partition_by: PartitionBy) -> Self {
        Self {
            name: name.into(),
            partition_by,
            columns: Vec::new(),
            timestamp_index: None,
            max_uncommitted_rows: 0,
            commit_hysteresis_micros: 0,
        }
    }

    /// Add a column
    pub fn col(mut self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.columns.push(ColumnDescriptor {
            name: name.into(),
            column_type,
            indexed: false,
            index_value_block_capacity: 0,
            designated_timestamp: false,
        });
        self
    }

    /// Index the column added last
    pub fn indexed(mut self, value_block_capacity: i32) -> Self {
        if let Some(c) = self.columns.last_mut() {
            c.indexed = true;
            c.index_value_block_capacity = value_block_capacity;
        }
        self
    }

    /// Designate the column added last as the table timestamp
    pub fn timestamp(mut self) -> Self {
        if let Some(i) = self.columns.len().checked_sub(1) {
            for c in &mut self.columns {
                c.designated_timestamp = false;
            }
            self.columns[i].designated_timestamp = true;
            self.timestamp_index = Some(i);
        }
        self
    }

    pub fn max_uncommitted_rows(mut self, rows: i32) -> Self {
        self.max_uncommitted_rows = rows;
        self
    }

    pub fn commit_hysteresis_micros(mut self, micros: i64) -> Self {
        self.commit_hysteresis_micros = micros;
        self
    }

    /// Fill table defaults left unset
    pub(crate) fn with_defaults(mut self, max_uncommitted_rows: i32, commit_hysteresis_micros: i64) -> Self {
        if self.max_uncommitted_rows == 0 {
            self.max_uncommitted_rows = max_uncommitted_rows;
        }
        if self.commit_hysteresis_micros == 0 {
            self.commit_hysteresis_micros = commit_hysteresis_micros;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn partition_by(&self) -> PartitionBy {
        self.partition_by
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    fn validate(&self, registry: &TypeRegistry) -> Result<()> {
        if self.name.is_empty() || self.name.contains(['/', '\\']) || self.name.starts_with('.') {
            return Err(StrataError::InvalidArgument(format!(
                "invalid table name '{}'",
                self.name
            )));
        }
        if self.columns.is_empty() {
            return Err(StrataError::InvalidArgument(format!(
                "table '{}' has no columns",
                self.name
            )));
        }
        for (i, c) in self.columns.iter().enumerate() {
            if registry.width_of(c.column_type.id())?.is_none()
                && !matches!(c.column_type, ColumnType::String | ColumnType::Binary)
            {
                return Err(StrataError::InvalidArgument(format!(
                    "column '{}' has non-storable type {}",
                    c.name, c.column_type
                )));
            }
            if self.columns[..i]
                .iter()
                .any(|o| o.name.eq_ignore_ascii_case(&c.name))
            {
                return Err(StrataError::InvalidArgument(format!(
                    "duplicate column '{}'",
                    c.name
                )));
            }
            if c.indexed && c.column_type != ColumnType::Symbol {
                return Err(StrataError::InvalidArgument(format!(
                    "only symbol columns can be indexed, '{}' is {}",
                    c.name, c.column_type
                )));
            }
        }
        match self.timestamp_index {
            Some(i) if self.columns[i].column_type != ColumnType::Timestamp => {
                Err(StrataError::InvalidArgument(format!(
                    "designated timestamp '{}' must be TIMESTAMP, not {}",
                    self.columns[i].name, self.columns[i].column_type
                )))
            }
            None if self.partition_by.is_partitioned() => Err(StrataError::InvalidArgument(format!(
                "table '{}' is partitioned by {} but has no designated timestamp",
                self.name, self.partition_by
            ))),
            _ => Ok(()),
        }
    }

    pub(crate) fn to_metadata(&self, table_id: i32) -> TableMetadata {
        TableMetadata {
            version: format::CURRENT_VERSION,
            table_id,
            partition_by: self.partition_by,
            timestamp_index: self.timestamp_index,
            columns: self.columns.clone(),
            max_uncommitted_rows: self.max_uncommitted_rows,
            commit_hysteresis_micros: self.commit_hysteresis_micros,
        }
    }
}

/// Create `<root>/<model.name>` with metadata and an empty transaction file
/// laid out as of `version`.
pub fn create_table(
    ff: &dyn FilesFacade,
    root: &Path,
    model: &TableModel,
    registry: &TypeRegistry,
    version: i32,
    table_id: i32,
) -> Result<PathBuf> {
    if !format::is_supported(version) {
        return Err(StrataError::UnsupportedFormatVersion {
            kind: "table",
            version,
        });
    }
    model.validate(registry)?;

    let table_dir = root.join(&model.name);
    if ff.exists(&table_dir.join(META_FILE_NAME)) {
        return Err(StrataError::TableExists(model.name.clone()));
    }
    ff.mkdirs(&table_dir)
        .map_err(|e| StrataError::io("could not create table directory", &table_dir, e))?;

    let meta = meta_image(model, version, table_id);
    let symbols = model
        .columns
        .iter()
        .filter(|c| c.column_type == ColumnType::Symbol)
        .count();
    let tx = tx_image(symbols, version)?;

    // Transaction file first: a table is recognized by its metadata file.
    write_new_file(ff, &table_dir.join(TXN_FILE_NAME), &tx)?;
    write_new_file(ff, &table_dir.join(META_FILE_NAME), &meta)?;

    info!(table = %model.name, version, table_id, "table created");
    Ok(table_dir)
}

fn meta_image(model: &TableModel, version: i32, table_id: i32) -> Vec<u8> {
    let mut meta = encode_meta(&model.to_metadata(table_id));
    meta[0..4].copy_from_slice(&version.to_le_bytes());
    if version < VERSION_THAT_ADDED_TABLE_ID {
        zero(&mut meta, META_OFFSET_TABLE_ID, 4);
    }
    if version < VERSION_TBL_META_HYSTERESIS {
        zero(&mut meta, META_OFFSET_MAX_UNCOMMITTED_ROWS, 4);
        zero(&mut meta, META_OFFSET_COMMIT_HYSTERESIS_MICROS, 8);
    }
    meta
}

fn tx_image(symbols: usize, version: i32) -> Result<Vec<u8>> {
    let mut tx = encode_tx(&TxRecord::empty(symbols))?;
    tx[0..4].copy_from_slice(&version.to_le_bytes());
    if version >= VERSION_TX_STRUCT_UPDATE_1 {
        return Ok(tx);
    }

    // Legacy body: 4-byte symbol counts and an empty removed-partition list
    let mut legacy = Vec::with_capacity(legacy_tx_size(symbols, 0));
    legacy.extend_from_slice(&tx[..TX_OFFSET_SYMBOLS as usize]);
    for _ in 0..symbols {
        legacy.put_i32_le(0);
    }
    legacy.put_i32_le(0);
    Ok(legacy)
}

fn zero(buf: &mut [u8], offset: u64, len: usize) {
    let start = offset as usize;
    buf[start..start + len].fill(0);
}

fn write_new_file(ff: &dyn FilesFacade, path: &Path, bytes: &[u8]) -> Result<()> {
    let fh = files::open_rw_or_fail(ff, path)?;
    ff.truncate(&fh, 0)
        .map_err(|e| StrataError::io("could not truncate", path, e))?;
    files::write_fully(ff, &fh, bytes, 0)?;
    ff.sync(&fh)
        .map_err(|e| StrataError::io("could not sync", path, e))
}
