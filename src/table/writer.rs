//! Table Writer
//!
//! Appends rows to the open partition of a table and publishes them with
//! [`TableWriter::commit`].
//!
//! ## Commit Protocol (write-then-publish)
//! ```text
//! 1. msync every column page of the open partition
//! 2. append new symbol dictionary entries, fsync
//! 3. write the transaction image at offset 0, fsync
//! ```
//! Readers size every column from the transaction file, so rows appended
//! after the last commit are invisible to them and are overwritten by the
//! next writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::column_type::{ColumnType, TypeRegistry};
use crate::error::{Result, StrataError};
use crate::files::{self, FileHandle, FilesFacade};
use crate::format::{encode_tx, PartitionEntry, SymbolCount, TableMetadata, TxRecord, TXN_FILE_NAME};
use crate::vm::ColumnFile;

use super::symbol::{symbol_file, SymbolTable};
use super::{column_file, read_current_metadata, read_current_tx, table_name, Value};

/// Column files of the partition receiving rows
struct OpenPartition {
    timestamp: i64,
    dir: PathBuf,
    columns: Vec<ColumnFile>,
}

pub struct TableWriter {
    ff: Arc<dyn FilesFacade>,
    dir: PathBuf,
    name: String,
    meta: TableMetadata,
    tx: TxRecord,
    tx_fh: FileHandle,
    page_size: usize,
    widths: Vec<usize>,
    partition: Option<OpenPartition>,
    /// Dictionaries in symbol column order
    symbols: Vec<SymbolTable>,
    /// Column index → position in `symbols`
    symbol_slots: Vec<Option<usize>>,
    row_buf: Vec<u8>,
}

impl TableWriter {
    /// Open the table at `table_dir` for appending
    pub fn open(
        ff: Arc<dyn FilesFacade>,
        table_dir: &Path,
        registry: &TypeRegistry,
        page_size: usize,
    ) -> Result<Self> {
        let name = table_name(table_dir);
        let meta = read_current_metadata(ff.as_ref(), table_dir, registry)?;
        let tx = read_current_tx(ff.as_ref(), table_dir)?;

        let mut widths = Vec::with_capacity(meta.column_count());
        for c in &meta.columns {
            let width = registry.width_of(c.column_type.id())?.ok_or_else(|| {
                StrataError::InvalidArgument(format!(
                    "column '{}' of table '{}' is {}, the writer stores fixed-width columns only",
                    c.name, name, c.column_type
                ))
            })?;
            widths.push(width);
        }

        let symbol_columns = meta.symbol_columns();
        if symbol_columns.len() != tx.symbol_counts.len() {
            return Err(StrataError::corrupt(
                "transaction file",
                format!(
                    "table '{}' has {} symbol columns, transaction file counts {}",
                    name,
                    symbol_columns.len(),
                    tx.symbol_counts.len()
                ),
            ));
        }
        let mut symbols = Vec::with_capacity(symbol_columns.len());
        let mut symbol_slots = vec![None; meta.column_count()];
        for (slot, &col) in symbol_columns.iter().enumerate() {
            let path = symbol_file(table_dir, &meta.columns[col].name);
            let committed = tx.symbol_counts[slot].count.max(0) as usize;
            symbols.push(SymbolTable::open(ff.as_ref(), &path, committed)?);
            symbol_slots[col] = Some(slot);
        }

        let tx_fh = files::open_rw_or_fail(ff.as_ref(), &table_dir.join(TXN_FILE_NAME))?;

        let mut writer = Self {
            ff,
            dir: table_dir.to_path_buf(),
            name,
            meta,
            tx,
            tx_fh,
            page_size,
            widths,
            partition: None,
            symbols,
            symbol_slots,
            row_buf: Vec::new(),
        };

        // Reopen the open partition at its committed size
        let resume = if writer.meta.partition_by.is_partitioned() {
            writer.tx.partitions.last().map(|p| p.timestamp)
        } else if writer.tx.transient_row_count > 0 {
            Some(i64::MIN)
        } else {
            None
        };
        if let Some(timestamp) = resume {
            let rows = writer.tx.transient_row_count;
            writer.partition = Some(writer.open_partition(timestamp, rows)?);
        }

        debug!(table = %writer.name, rows = writer.tx.row_count(), "writer opened");
        Ok(writer)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.meta
    }

    /// Rows including those not yet committed
    pub fn row_count(&self) -> i64 {
        self.tx.row_count()
    }

    /// Start a row. For tables with a designated timestamp, `ts` fills that
    /// column and must not precede the newest row; otherwise it is ignored.
    pub fn new_row(&mut self, ts: i64) -> Result<Row<'_>> {
        if self.meta.timestamp_index.is_some() {
            if ts == i64::MIN {
                return Err(StrataError::InvalidArgument(format!(
                    "designated timestamp of table '{}' cannot be null",
                    self.name
                )));
            }
            if ts < self.tx.max_timestamp {
                return Err(StrataError::InvalidArgument(format!(
                    "cannot insert rows out of order [table={}, timestamp={}, max={}]",
                    self.name, ts, self.tx.max_timestamp
                )));
            }
        }

        if self.meta.partition_by.is_partitioned() {
            let floor = self.meta.partition_by.floor(ts)?;
            if self.partition.as_ref().map(|p| p.timestamp) != Some(floor) {
                self.switch_partition(floor)?;
            }
        } else if self.partition.is_none() {
            let rows = self.tx.transient_row_count;
            self.partition = Some(self.open_partition(i64::MIN, rows)?);
        }

        let mut values = vec![Value::Null; self.meta.column_count()];
        if let Some(i) = self.meta.timestamp_index {
            values[i] = Value::Timestamp(ts);
        }
        Ok(Row {
            writer: self,
            ts,
            values,
        })
    }

    /// Publish every appended row
    pub fn commit(&mut self) -> Result<()> {
        if let Some(p) = &self.partition {
            for column in &p.columns {
                column.sync(false);
            }
        }

        for (slot, table) in self.symbols.iter_mut().enumerate() {
            table.flush(self.ff.as_ref())?;
            let count = table.len() as i32;
            self.tx.symbol_counts[slot] = SymbolCount {
                count,
                transient_count: count,
            };
        }

        self.tx.txn += 1;
        let image = encode_tx(&self.tx)?;
        files::write_fully(self.ff.as_ref(), &self.tx_fh, &image, 0)?;
        self.ff
            .truncate(&self.tx_fh, image.len() as u64)
            .map_err(|e| StrataError::io("could not truncate", self.tx_fh.path(), e))?;
        self.ff
            .sync(&self.tx_fh)
            .map_err(|e| StrataError::io("could not sync", self.tx_fh.path(), e))?;

        debug!(table = %self.name, txn = self.tx.txn, rows = self.tx.row_count(), "committed");
        Ok(())
    }

    fn open_partition(&self, timestamp: i64, rows: i64) -> Result<OpenPartition> {
        let dir = self.dir.join(self.meta.partition_by.dir_name(timestamp)?);
        self.ff
            .mkdirs(&dir)
            .map_err(|e| StrataError::io("could not create partition directory", &dir, e))?;

        let mut columns = Vec::with_capacity(self.meta.column_count());
        for (c, width) in self.meta.columns.iter().zip(&self.widths) {
            let mut file = ColumnFile::open(self.ff.clone(), &column_file(&dir, &c.name), self.page_size)?;
            file.jump_to(rows as u64 * *width as u64)?;
            columns.push(file);
        }
        Ok(OpenPartition {
            timestamp,
            dir,
            columns,
        })
    }

    fn switch_partition(&mut self, timestamp: i64) -> Result<()> {
        if let Some(mut previous) = self.partition.take() {
            for column in &mut previous.columns {
                column.sync(false);
                column.close(true);
            }
            self.tx.fixed_row_count += self.tx.transient_row_count;
            info!(table = %self.name, partition = %previous.dir.display(), rows = self.tx.transient_row_count, "partition closed");
        }

        self.tx.transient_row_count = 0;
        self.tx.partitions.push(PartitionEntry {
            timestamp,
            row_count: 0,
        });
        self.tx.partition_table_version += 1;
        self.partition = Some(self.open_partition(timestamp, 0)?);
        Ok(())
    }

    fn append_row(&mut self, ts: i64, values: Vec<Value>) -> Result<()> {
        let marks: Vec<usize> = self.symbols.iter().map(SymbolTable::len).collect();
        let result = self.write_row(ts, &values);
        if result.is_err() {
            // A rejected row must not leave keys behind for the next commit
            for (symbols, mark) in self.symbols.iter_mut().zip(marks) {
                symbols.rollback(mark);
            }
        }
        result
    }

    fn write_row(&mut self, ts: i64, values: &[Value]) -> Result<()> {
        // Encode the whole row before touching any column file
        self.row_buf.clear();
        for (i, value) in values.iter().enumerate() {
            let column_type = self.meta.columns[i].column_type;
            match (self.symbol_slots[i], value) {
                (Some(_), Value::Null) => self.row_buf.extend_from_slice(&(-1i32).to_le_bytes()),
                (Some(slot), Value::Symbol(s)) => {
                    let key = self.symbols[slot].put(s);
                    self.row_buf.extend_from_slice(&key.to_le_bytes());
                }
                (Some(_), other) => {
                    return Err(StrataError::InvalidArgument(format!(
                        "cannot store {:?} in SYMBOL column '{}'",
                        other, self.meta.columns[i].name
                    )))
                }
                (None, v) => v.encode(column_type, &mut self.row_buf)?,
            }
        }

        let partition = self.partition.as_mut().ok_or_else(|| {
            StrataError::InvalidArgument(format!("table '{}' has no open partition", self.name))
        })?;
        let mut offset = 0;
        for (column, width) in partition.columns.iter_mut().zip(&self.widths) {
            column.put_bytes(&self.row_buf[offset..offset + width])?;
            offset += width;
        }

        self.tx.transient_row_count += 1;
        if let Some(last) = self.tx.partitions.last_mut() {
            last.row_count = self.tx.transient_row_count;
        }
        if self.meta.timestamp_index.is_some() {
            self.tx.min_timestamp = self.tx.min_timestamp.min(ts);
            self.tx.max_timestamp = self.tx.max_timestamp.max(ts);
        }
        Ok(())
    }
}

/// A row under construction; nothing is written until [`Row::append`]
pub struct Row<'a> {
    writer: &'a mut TableWriter,
    ts: i64,
    values: Vec<Value>,
}

impl Row<'_> {
    /// Set column `col`; unset columns are written as null
    pub fn put(&mut self, col: usize, value: impl Into<Value>) -> Result<&mut Self> {
        let meta = &self.writer.meta;
        if col >= meta.column_count() {
            return Err(StrataError::InvalidArgument(format!(
                "column index {} out of range for table '{}' [columns={}]",
                col,
                self.writer.name,
                meta.column_count()
            )));
        }
        if meta.timestamp_index == Some(col) {
            return Err(StrataError::InvalidArgument(format!(
                "designated timestamp '{}' is set by new_row",
                meta.columns[col].name
            )));
        }
        let value = value.into();
        if meta.columns[col].column_type == ColumnType::Timestamp {
            if let Value::Long(v) = value {
                self.values[col] = Value::Timestamp(v);
                return Ok(self);
            }
        }
        self.values[col] = value;
        Ok(self)
    }

    /// Set a column by name
    pub fn put_named(&mut self, name: &str, value: impl Into<Value>) -> Result<&mut Self> {
        let col = self.writer.meta.column_index(name).ok_or_else(|| {
            StrataError::InvalidArgument(format!(
                "table '{}' has no column '{}'",
                self.writer.name, name
            ))
        })?;
        self.put(col, value)
    }

    pub fn append(self) -> Result<()> {
        self.writer.append_row(self.ts, self.values)
    }
}
