//! Virtual Memory Module
//!
//! File-backed paged memory for column storage.
//!
//! ## Responsibilities
//! - Translate logical offsets into (page index, offset in page)
//! - Map pages on demand, growing the file before a page is mapped for writing
//! - Append-only column files with durable close and truncation
//! - Independent read mappings for readers
//!
//! ## Address Space
//! ```text
//! logical offset ──► page index = offset >> log2(page_size)
//!                    in page    = offset &  (page_size - 1)
//!
//! file:  ┌──────────┬──────────┬──────────┬─ ─ ─ ─ ─┐
//!        │  page 0  │  page 1  │  page 2  │ (grown) │
//!        └──────────┴──────────┴────▲─────┴─ ─ ─ ─ ─┘
//!                                   │
//!                            append offset (single write page mapped)
//! ```

mod append;
mod paged;
mod reader;

pub use append::ColumnFile;
pub use paged::{PagedAddressSpace, ReadPage};
pub use reader::ColumnReader;

/// Smallest page size accepted by an address space
pub const MIN_PAGE_SIZE: usize = 4096;
