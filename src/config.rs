//! Configuration for Strata
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{Result, StrataError};
use crate::vm::MIN_PAGE_SIZE;

/// Main configuration for a Strata storage root
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory holding one sub-directory per table
    /// Internal structure:
    ///   {root}/
    ///     ├── _upgrade.d       (last completed migration version)
    ///     ├── _tab_index.d     (table id counter)
    ///     └── {table}/
    ///         ├── _meta
    ///         ├── _txn
    ///         └── {partition}/{column}.d
    pub root: PathBuf,

    /// Page size used when appending to column files (power of two)
    pub column_page_size: usize,

    /// Page size used when staging rewritten transaction files
    pub tx_page_size: usize,

    // -------------------------------------------------------------------------
    // Table Defaults
    // -------------------------------------------------------------------------
    /// Written to tables that predate the field, and to new tables
    pub max_uncommitted_rows: i32,

    /// Commit hysteresis in microseconds, defaulted the same way
    pub commit_hysteresis_micros: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./strata_data"),
            column_page_size: 1024 * 1024, // 1 MB
            tx_page_size: 64 * 1024,       // 64 KB
            max_uncommitted_rows: 500_000,
            commit_hysteresis_micros: 300_000_000, // 5 minutes
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Reject settings the storage layer cannot honor
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("column_page_size", self.column_page_size),
            ("tx_page_size", self.tx_page_size),
        ] {
            if !size.is_power_of_two() || size < MIN_PAGE_SIZE {
                return Err(StrataError::Config(format!(
                    "{} must be a power of two >= {}, got {}",
                    name, MIN_PAGE_SIZE, size
                )));
            }
        }
        if self.max_uncommitted_rows < 0 {
            return Err(StrataError::Config(format!(
                "max_uncommitted_rows must not be negative, got {}",
                self.max_uncommitted_rows
            )));
        }
        if self.commit_hysteresis_micros < 0 {
            return Err(StrataError::Config(format!(
                "commit_hysteresis_micros must not be negative, got {}",
                self.commit_hysteresis_micros
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the storage root directory
    pub fn root(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root = path.into();
        self
    }

    /// Set the column append page size (in bytes)
    pub fn column_page_size(mut self, size: usize) -> Self {
        self.config.column_page_size = size;
        self
    }

    /// Set the transaction staging page size (in bytes)
    pub fn tx_page_size(mut self, size: usize) -> Self {
        self.config.tx_page_size = size;
        self
    }

    /// Set the default max uncommitted rows
    pub fn max_uncommitted_rows(mut self, rows: i32) -> Self {
        self.config.max_uncommitted_rows = rows;
        self
    }

    /// Set the default commit hysteresis (in microseconds)
    pub fn commit_hysteresis_micros(mut self, micros: i64) -> Self {
        self.config.commit_hysteresis_micros = micros;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
