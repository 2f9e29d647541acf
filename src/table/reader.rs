//! Table Reader
//!
//! Read access to the committed state of a table. Column sizes come from
//! the transaction file snapshot taken at open; rows appended later are not
//! seen until the reader is reopened.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::column_type::{ColumnType, TypeRegistry};
use crate::error::{Result, StrataError};
use crate::files::FilesFacade;
use crate::format::{ColumnDescriptor, TableMetadata, TxRecord, DEFAULT_PARTITION_NAME};
use crate::vm::ColumnReader;

use super::symbol::{read_symbols, symbol_file};
use super::{column_file, read_current_metadata, read_current_tx, table_name, Value};

/// One partition as seen by a reader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    /// Directory name under the table directory
    pub name: String,
    /// Partition start, `i64::MIN` for the `default` partition
    pub timestamp: i64,
    pub row_count: i64,
}

pub struct TableReader {
    ff: Arc<dyn FilesFacade>,
    dir: PathBuf,
    name: String,
    meta: TableMetadata,
    tx: TxRecord,
    widths: Vec<Option<usize>>,
    page_size: usize,
}

impl TableReader {
    pub fn open(
        ff: Arc<dyn FilesFacade>,
        table_dir: &Path,
        registry: &TypeRegistry,
        page_size: usize,
    ) -> Result<Self> {
        let meta = read_current_metadata(ff.as_ref(), table_dir, registry)?;
        let tx = read_current_tx(ff.as_ref(), table_dir)?;
        let widths = meta
            .columns
            .iter()
            .map(|c| registry.width_of(c.column_type.id()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            ff,
            dir: table_dir.to_path_buf(),
            name: table_name(table_dir),
            meta,
            tx,
            widths,
            page_size,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &TableMetadata {
        &self.meta
    }

    pub fn tx(&self) -> &TxRecord {
        &self.tx
    }

    pub fn row_count(&self) -> i64 {
        self.tx.row_count()
    }

    /// Partitions in chronological order. The open partition is sized by
    /// the transient row count.
    pub fn partitions(&self) -> Result<Vec<PartitionInfo>> {
        if !self.meta.partition_by.is_partitioned() {
            if self.tx.transient_row_count == 0 {
                return Ok(Vec::new());
            }
            return Ok(vec![PartitionInfo {
                name: DEFAULT_PARTITION_NAME.to_string(),
                timestamp: i64::MIN,
                row_count: self.tx.transient_row_count,
            }]);
        }

        let last = self.tx.partitions.len().saturating_sub(1);
        self.tx
            .partitions
            .iter()
            .enumerate()
            .map(|(i, p)| {
                Ok(PartitionInfo {
                    name: self.meta.partition_by.dir_name(p.timestamp)?,
                    timestamp: p.timestamp,
                    row_count: if i == last {
                        self.tx.transient_row_count
                    } else {
                        p.row_count
                    },
                })
            })
            .collect()
    }

    /// Reader over the committed values of one column in one partition
    pub fn column(&self, partition: &PartitionInfo, col: usize) -> Result<ColumnReader> {
        let (c, width) = self.fixed_column(col)?;
        let path = column_file(&self.dir.join(&partition.name), &c.name);
        ColumnReader::open(
            self.ff.clone(),
            &path,
            self.page_size,
            partition.row_count as u64 * width as u64,
        )
    }

    /// Sum of the non-null values of an INT or LONG column
    pub fn sum_long(&self, name: &str) -> Result<i64> {
        let col = self.column_index(name)?;
        let column_type = self.meta.columns[col].column_type;
        if !matches!(column_type, ColumnType::Int | ColumnType::Long) {
            return Err(StrataError::InvalidArgument(format!(
                "cannot sum {} column '{}'",
                column_type, name
            )));
        }

        let mut sum = 0i64;
        for partition in self.partitions()? {
            if partition.row_count == 0 {
                continue;
            }
            let mut reader = self.column(&partition, col)?;
            for row in 0..partition.row_count as u64 {
                match column_type {
                    ColumnType::Int => {
                        let v = reader.get_i32(row * 4)?;
                        if v != i32::MIN {
                            sum = sum.wrapping_add(v as i64);
                        }
                    }
                    _ => {
                        let v = reader.get_i64(row * 8)?;
                        if v != i64::MIN {
                            sum = sum.wrapping_add(v);
                        }
                    }
                }
            }
        }
        Ok(sum)
    }

    /// Committed dictionary of a symbol column, in key order
    pub fn symbol_values(&self, name: &str) -> Result<Vec<String>> {
        let col = self.column_index(name)?;
        let slot = self
            .meta
            .symbol_columns()
            .iter()
            .position(|&c| c == col)
            .ok_or_else(|| {
                StrataError::InvalidArgument(format!("column '{}' is not a SYMBOL column", name))
            })?;
        let count = self.tx.symbol_counts.get(slot).map_or(0, |s| s.count.max(0) as usize);
        read_symbols(self.ff.as_ref(), &symbol_file(&self.dir, &self.meta.columns[col].name), count)
    }

    /// Distinct value combinations of the named columns, in first-seen order.
    /// Symbol keys are resolved to their text.
    pub fn distinct_rows(&self, names: &[&str]) -> Result<Vec<Vec<Value>>> {
        let cols = names
            .iter()
            .map(|n| self.column_index(n))
            .collect::<Result<Vec<_>>>()?;

        let mut dictionaries = Vec::with_capacity(cols.len());
        for (&col, name) in cols.iter().zip(names) {
            dictionaries.push(if self.meta.columns[col].column_type == ColumnType::Symbol {
                Some(self.symbol_values(name)?)
            } else {
                None
            });
        }

        let mut seen = HashSet::new();
        let mut rows = Vec::new();
        let mut cell = Vec::new();
        for partition in self.partitions()? {
            if partition.row_count == 0 {
                continue;
            }
            let mut readers = cols
                .iter()
                .map(|&c| self.column(&partition, c))
                .collect::<Result<Vec<_>>>()?;

            for row in 0..partition.row_count as u64 {
                let mut values = Vec::with_capacity(cols.len());
                for (i, reader) in readers.iter_mut().enumerate() {
                    let c = &self.meta.columns[cols[i]];
                    let width = self.widths[cols[i]].unwrap_or(0);
                    cell.resize(width, 0);
                    reader.read_at(row * width as u64, &mut cell)?;
                    let value = match (Value::decode(c.column_type, &cell)?, &dictionaries[i]) {
                        (Value::Int(key), Some(dict)) => dict
                            .get(key as usize)
                            .map(|s| Value::Symbol(s.clone()))
                            .ok_or_else(|| {
                                StrataError::corrupt(
                                    "symbol dictionary",
                                    format!("key {} of column '{}' past {} entries", key, c.name, dict.len()),
                                )
                            })?,
                        (v, _) => v,
                    };
                    values.push(value);
                }
                let key: Vec<String> = values.iter().map(|v| format!("{:?}", v)).collect();
                if seen.insert(key) {
                    rows.push(values);
                }
            }
        }
        Ok(rows)
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.meta.column_index(name).ok_or_else(|| {
            StrataError::InvalidArgument(format!("table '{}' has no column '{}'", self.name, name))
        })
    }

    fn fixed_column(&self, col: usize) -> Result<(&ColumnDescriptor, usize)> {
        let c = self.meta.columns.get(col).ok_or_else(|| {
            StrataError::InvalidArgument(format!(
                "column index {} out of range for table '{}'",
                col, self.name
            ))
        })?;
        let width = self.widths[col].ok_or_else(|| {
            StrataError::InvalidArgument(format!(
                "column '{}' is {}, not fixed-width",
                c.name, c.column_type
            ))
        })?;
        Ok((c, width))
    }
}
