//! # Strata
//!
//! The storage layer of a column-oriented, append-mostly time-series
//! database:
//! - Memory-mapped column files grown page by page
//! - Versioned binary metadata and transaction files per table
//! - A migration engine bringing old on-disk layouts to the current one
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │          (open → migrate → serve writers / readers)          │
//! └──────────┬──────────────────────┬───────────────────────────┘
//!            │                      │
//!            ▼                      ▼
//!   ┌─────────────────┐    ┌─────────────────┐
//!   │    Migration    │    │      Table      │
//!   │ (416 → ... 419) │    │ writer / reader │
//!   └────────┬────────┘    └────────┬────────┘
//!            │                      │
//!            ▼                      ▼
//!   ┌─────────────────┐    ┌─────────────────┐
//!   │     Format      │◄───│       VM        │
//!   │  (_meta, _txn)  │    │ (paged mmap IO) │
//!   └────────┬────────┘    └────────┬────────┘
//!            │                      │
//!            ▼                      ▼
//!   ┌─────────────────┐    ┌─────────────────┐
//!   │  Type Registry  │    │  Files Facade   │
//!   └─────────────────┘    └─────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod column_type;
pub mod files;
pub mod vm;
pub mod format;
pub mod table;
pub mod migration;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{Result, StrataError};
pub use config::Config;
pub use column_type::{ColumnType, TypeRegistry};
pub use engine::Engine;
pub use migration::{EngineMigration, MigrationReport};
pub use table::{PartitionBy, TableModel, Value};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of Strata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
