//! Paged Address Space
//!
//! A linear, append-growable address space over one file, realized as
//! fixed-size pages mapped on demand.
//!
//! At most one page is mapped for writing. Mapping another page drops the
//! previous mapping; its dirty bytes stay in the OS page cache and are
//! visible to every other mapping of the file without an explicit flush.
//! Read pages are independent of the write page.

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::{Mmap, MmapMut};
use tracing::trace;

use crate::error::{Result, StrataError};
use crate::files::{self, FileHandle, FilesFacade};

use super::MIN_PAGE_SIZE;

/// The page currently mapped for writing
struct WritePage {
    index: usize,
    map: MmapMut,
}

/// A read-only mapping of one page, sized to the file tail for the last page
pub struct ReadPage {
    index: usize,
    offset: u64,
    map: Mmap,
}

impl ReadPage {
    pub fn index(&self) -> usize {
        self.index
    }

    /// File offset of the first byte of this page
    pub fn offset(&self) -> u64 {
        self.offset
    }
}

impl Deref for ReadPage {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.map
    }
}

/// Logical address space over one memory-mapped file
pub struct PagedAddressSpace {
    ff: Arc<dyn FilesFacade>,
    fh: FileHandle,
    page_size: usize,
    page_shift: u32,
    writable: bool,
    write_page: Option<WritePage>,
}

impl PagedAddressSpace {
    /// Open (creating if absent) for reading and writing
    pub fn open_rw(ff: Arc<dyn FilesFacade>, path: &Path, page_size: usize) -> Result<Self> {
        check_page_size(page_size)?;
        let fh = files::open_rw_or_fail(ff.as_ref(), path)?;
        Ok(Self::with_handle(ff, fh, page_size, true))
    }

    /// Open an existing file for reading only
    pub fn open_ro(ff: Arc<dyn FilesFacade>, path: &Path, page_size: usize) -> Result<Self> {
        check_page_size(page_size)?;
        let fh = files::open_ro_or_fail(ff.as_ref(), path)?;
        Ok(Self::with_handle(ff, fh, page_size, false))
    }

    fn with_handle(ff: Arc<dyn FilesFacade>, fh: FileHandle, page_size: usize, writable: bool) -> Self {
        Self {
            ff,
            fh,
            page_size,
            page_shift: page_size.trailing_zeros(),
            writable,
            write_page: None,
        }
    }

    pub fn path(&self) -> &Path {
        self.fh.path()
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_index_of(&self, offset: u64) -> usize {
        (offset >> self.page_shift) as usize
    }

    pub fn offset_in_page(&self, offset: u64) -> usize {
        (offset & (self.page_size as u64 - 1)) as usize
    }

    /// File offset where `page` starts
    pub fn page_offset(&self, page: usize) -> u64 {
        (page as u64) << self.page_shift
    }

    pub fn file_len(&self) -> Result<u64> {
        files::length_or_fail(self.ff.as_ref(), &self.fh)
    }

    /// Grow the backing file so that `page` is fully covered
    pub fn ensure_file_size(&self, page: usize) -> Result<()> {
        let target = self.page_offset(page + 1);
        if self.file_len()? < target {
            self.ff.allocate(&self.fh, target).map_err(|e| {
                StrataError::io(format!("appender resize failed [size={}]", target), self.path(), e)
            })?;
        }
        Ok(())
    }

    /// Index of the page mapped for writing, if any
    pub fn write_page_index(&self) -> Option<usize> {
        self.write_page.as_ref().map(|p| p.index)
    }

    /// Map `page` for writing, releasing whichever write page was mapped before
    pub fn map_for_write(&mut self, page: usize) -> Result<&mut [u8]> {
        if !self.writable {
            return Err(StrataError::InvalidArgument(format!(
                "address space over {} is read-only",
                self.path().display()
            )));
        }

        let current = match self.write_page.take() {
            Some(p) if p.index == page => p,
            previous => {
                if let Some(p) = previous {
                    trace!(path = %self.path().display(), page = p.index, "release write page");
                }
                self.ensure_file_size(page)?;
                let offset = self.page_offset(page);
                let map = self.ff.map_rw(&self.fh, offset, self.page_size).map_err(|e| {
                    StrataError::io(
                        format!("could not mmap for append [offset={}, size={}]", offset, self.page_size),
                        self.fh.path(),
                        e,
                    )
                })?;
                trace!(path = %self.path().display(), page, "map write page");
                WritePage { index: page, map }
            }
        };

        Ok(&mut self.write_page.insert(current).map[..])
    }

    /// Drop the write mapping, if any
    pub fn release_write_page(&mut self) {
        self.write_page = None;
    }

    /// Ask the OS to flush the dirty bytes of the write page
    pub fn sync_write_page(&self, async_flush: bool) -> Result<()> {
        match &self.write_page {
            Some(p) => self.ff.msync(&p.map, async_flush).map_err(|e| {
                StrataError::io(format!("could not msync page {}", p.index), self.path(), e)
            }),
            None => Ok(()),
        }
    }

    /// Map `page` for reading, independent of the write page
    pub fn map_for_read(&self, page: usize) -> Result<ReadPage> {
        let offset = self.page_offset(page);
        let len = self.file_len()?;
        if offset >= len {
            return Err(StrataError::InvalidArgument(format!(
                "page {} starts beyond the end of {} [length={}]",
                page,
                self.path().display(),
                len
            )));
        }
        let size = (len - offset).min(self.page_size as u64) as usize;
        let map = self.ff.map_ro(&self.fh, offset, size).map_err(|e| {
            StrataError::io(
                format!("could not mmap for read [offset={}, size={}]", offset, size),
                self.fh.path(),
                e,
            )
        })?;
        Ok(ReadPage {
            index: page,
            offset,
            map,
        })
    }

    pub(crate) fn files(&self) -> &dyn FilesFacade {
        self.ff.as_ref()
    }

    pub(crate) fn handle(&self) -> &FileHandle {
        &self.fh
    }
}

fn check_page_size(page_size: usize) -> Result<()> {
    if page_size.is_power_of_two() && page_size >= MIN_PAGE_SIZE {
        Ok(())
    } else {
        Err(StrataError::InvalidArgument(format!(
            "page size must be a power of two >= {}, got {}",
            MIN_PAGE_SIZE, page_size
        )))
    }
}
