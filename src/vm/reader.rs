//! Column Reader
//!
//! Reads a column file through read-only page mappings, caching the page
//! last touched. Readers never observe the writer's mapping directly; they
//! see whatever the OS page cache holds for the file.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Result, StrataError};
use crate::files::FilesFacade;

use super::{PagedAddressSpace, ReadPage};

pub struct ColumnReader {
    space: PagedAddressSpace,
    /// Readable logical size; bytes past it are not committed
    size: u64,
    page: Option<ReadPage>,
}

impl ColumnReader {
    /// Open `path` exposing its first `size` bytes
    pub fn open(ff: Arc<dyn FilesFacade>, path: &Path, page_size: usize, size: u64) -> Result<Self> {
        let space = PagedAddressSpace::open_ro(ff, path, page_size)?;
        let len = space.file_len()?;
        if len < size {
            return Err(StrataError::corrupt(
                "column file",
                format!(
                    "{} holds {} bytes, {} are committed",
                    path.display(),
                    len,
                    size
                ),
            ));
        }
        Ok(Self {
            space,
            size,
            page: None,
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Copy `buf.len()` bytes starting at `offset`, crossing pages as needed
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let end = offset + buf.len() as u64;
        if end > self.size {
            return Err(StrataError::InvalidArgument(format!(
                "read [{}, {}) past committed size {} of {}",
                offset,
                end,
                self.size,
                self.space.path().display()
            )));
        }

        let mut done = 0;
        while done < buf.len() {
            let pos = offset + done as u64;
            let index = self.space.page_index_of(pos);
            let in_page = self.space.offset_in_page(pos);
            let page = match self.page.take() {
                Some(p) if p.index() == index => p,
                _ => self.space.map_for_read(index)?,
            };
            let n = (page.len() - in_page).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&page[in_page..in_page + n]);
            done += n;
            self.page = Some(page);
        }
        Ok(())
    }

    pub fn get_u8(&mut self, offset: u64) -> Result<u8> {
        let mut b = [0u8; 1];
        self.read_at(offset, &mut b)?;
        Ok(b[0])
    }

    pub fn get_i16(&mut self, offset: u64) -> Result<i16> {
        let mut b = [0u8; 2];
        self.read_at(offset, &mut b)?;
        Ok(i16::from_le_bytes(b))
    }

    pub fn get_i32(&mut self, offset: u64) -> Result<i32> {
        let mut b = [0u8; 4];
        self.read_at(offset, &mut b)?;
        Ok(i32::from_le_bytes(b))
    }

    pub fn get_i64(&mut self, offset: u64) -> Result<i64> {
        let mut b = [0u8; 8];
        self.read_at(offset, &mut b)?;
        Ok(i64::from_le_bytes(b))
    }

    pub fn get_f32(&mut self, offset: u64) -> Result<f32> {
        let mut b = [0u8; 4];
        self.read_at(offset, &mut b)?;
        Ok(f32::from_le_bytes(b))
    }

    pub fn get_f64(&mut self, offset: u64) -> Result<f64> {
        let mut b = [0u8; 8];
        self.read_at(offset, &mut b)?;
        Ok(f64::from_le_bytes(b))
    }
}
