//! Error types for Strata
//!
//! Provides a unified error type for all storage operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result type alias using StrataError
pub type Result<T> = std::result::Result<T, StrataError>;

/// Unified error type for Strata operations
#[derive(Debug, Error)]
pub enum StrataError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("{context} [path={}]: {source}", path.display())]
    Io {
        context: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Fewer bytes reached the file than were requested. Never retried.
    #[error(
        "partial write [path={}, offset={offset}, requested={requested}, written={written}]",
        path.display()
    )]
    PartialWrite {
        path: PathBuf,
        offset: u64,
        requested: usize,
        written: usize,
    },

    // -------------------------------------------------------------------------
    // Format Errors
    // -------------------------------------------------------------------------
    #[error("unsupported {kind} format version: {version}")]
    UnsupportedFormatVersion { kind: &'static str, version: i32 },

    #[error("corrupt {kind}: {reason}")]
    Corrupt { kind: &'static str, reason: String },

    #[error("metadata version does not match runtime version [table={table}, found={found}, expected={expected}]")]
    MetadataVersionMismatch {
        table: String,
        found: i32,
        expected: i32,
    },

    // -------------------------------------------------------------------------
    // Type Registry Errors
    // -------------------------------------------------------------------------
    #[error("unknown column type id: {0}")]
    UnknownType(i32),

    #[error("unknown column type name: {0}")]
    UnknownTypeName(String),

    // -------------------------------------------------------------------------
    // Migration Errors
    // -------------------------------------------------------------------------
    #[error("could not update table '{table}': {message}")]
    Migration {
        table: String,
        message: String,
        #[source]
        source: Box<StrataError>,
    },

    // -------------------------------------------------------------------------
    // Table Errors
    // -------------------------------------------------------------------------
    #[error("table does not exist: {0}")]
    TableNotFound(String),

    #[error("table already exists: {0}")]
    TableExists(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("configuration error: {0}")]
    Config(String),
}

impl StrataError {
    /// Wrap an OS error with the operation and the file it concerned
    pub fn io(context: impl Into<String>, path: &Path, source: io::Error) -> Self {
        StrataError::Io {
            context: context.into(),
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(kind: &'static str, reason: impl Into<String>) -> Self {
        StrataError::Corrupt {
            kind,
            reason: reason.into(),
        }
    }

    /// True for failures that originate from the file system, including partial writes
    pub fn is_io(&self) -> bool {
        match self {
            StrataError::Io { .. } | StrataError::PartialWrite { .. } => true,
            StrataError::Migration { source, .. } => source.is_io(),
            _ => false,
        }
    }

    /// OS error code, when the failure carries one
    pub fn os_error(&self) -> Option<i32> {
        match self {
            StrataError::Io { source, .. } => source.raw_os_error(),
            StrataError::Migration { source, .. } => source.os_error(),
            _ => None,
        }
    }
}
