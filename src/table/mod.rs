//! Table Module
//!
//! Tables on top of the column files and the format codecs.
//!
//! ## On-disk Layout
//! ```text
//! {root}/{table}/
//!   ├── _meta                 metadata file
//!   ├── _txn                  transaction file
//!   ├── {symbol column}.c     symbol dictionary
//!   └── {partition}/          2020-01-01 | 2020-01 | 2020 | default
//!         └── {column}.d      fixed-width column values, row order
//! ```
//!
//! ## Components
//! - `PartitionBy`: partition scheme and directory naming
//! - `TableModel` / `create_table`: table creation at a given format version
//! - `TableIdGenerator`: persistent table id counter
//! - `TableWriter`: row append and commit
//! - `TableReader`: partition and column access

pub mod ids;
pub mod model;
pub mod partition;
pub mod reader;
pub mod symbol;
pub mod value;
pub mod writer;

use std::path::{Path, PathBuf};

use crate::column_type::TypeRegistry;
use crate::error::{Result, StrataError};
use crate::files::{self, FilesFacade};
use crate::format::{
    self, decode_meta, decode_tx, TableMetadata, TxRecord, CURRENT_VERSION, META_FILE_NAME,
    TXN_FILE_NAME,
};

pub use ids::TableIdGenerator;
pub use model::{create_table, TableModel};
pub use partition::PartitionBy;
pub use reader::{PartitionInfo, TableReader};
pub use value::Value;
pub use writer::{Row, TableWriter};

pub const COLUMN_FILE_SUFFIX: &str = ".d";

/// `<partition_dir>/<column>.d`
pub fn column_file(partition_dir: &Path, column: &str) -> PathBuf {
    partition_dir.join(format!("{}{}", column, COLUMN_FILE_SUFFIX))
}

/// Table directories under `root`: sub-directories holding a metadata file
pub fn list_tables(ff: &dyn FilesFacade, root: &Path) -> Result<Vec<PathBuf>> {
    let dirs = ff
        .list_dirs(root)
        .map_err(|e| StrataError::io("could not list tables", root, e))?;
    Ok(dirs
        .into_iter()
        .filter(|d| ff.exists(&d.join(META_FILE_NAME)))
        .collect())
}

pub(crate) fn table_name(table_dir: &Path) -> String {
    table_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| table_dir.display().to_string())
}

/// Decode the metadata file, which must be at the current version
pub fn read_current_metadata(
    ff: &dyn FilesFacade,
    table_dir: &Path,
    registry: &TypeRegistry,
) -> Result<TableMetadata> {
    let path = table_dir.join(META_FILE_NAME);
    if !ff.exists(&path) {
        return Err(StrataError::TableNotFound(table_name(table_dir)));
    }
    let bytes = files::read_file(ff, &path)?;
    let version = format::read_meta_version(&bytes)?;
    if version != CURRENT_VERSION {
        return Err(StrataError::MetadataVersionMismatch {
            table: table_name(table_dir),
            found: version,
            expected: CURRENT_VERSION,
        });
    }
    decode_meta(&bytes, version, registry)
}

/// Decode the transaction file, which must be at the current version
pub fn read_current_tx(ff: &dyn FilesFacade, table_dir: &Path) -> Result<TxRecord> {
    let bytes = files::read_file(ff, &table_dir.join(TXN_FILE_NAME))?;
    let version = format::read_tx_version(&bytes)?;
    if version != CURRENT_VERSION {
        return Err(StrataError::MetadataVersionMismatch {
            table: table_name(table_dir),
            found: version,
            expected: CURRENT_VERSION,
        });
    }
    decode_tx(&bytes, version)
}
