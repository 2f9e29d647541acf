//! Append-only Column File
//!
//! Writes column values sequentially through a single mapped page. The file
//! is grown one page ahead of the writer and, on close, can be truncated
//! back to the logical append offset to reclaim the pre-grown tail.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, error};

use crate::error::{Result, StrataError};
use crate::files::FilesFacade;

use super::PagedAddressSpace;

/// Append-only store for one column segment
pub struct ColumnFile {
    /// `None` once closed
    space: Option<PagedAddressSpace>,
    path: PathBuf,
    page_size: usize,
    /// Logical end of data
    append_offset: u64,
}

impl ColumnFile {
    /// Open or create a column file; the append offset starts at zero
    pub fn open(ff: Arc<dyn FilesFacade>, path: &Path, page_size: usize) -> Result<Self> {
        let space = PagedAddressSpace::open_rw(ff, path, page_size)?;
        debug!(path = %path.display(), page_size, "open column file");
        Ok(Self {
            space: Some(space),
            path: path.to_path_buf(),
            page_size,
            append_offset: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn append_offset(&self) -> u64 {
        self.append_offset
    }

    pub fn is_closed(&self) -> bool {
        self.space.is_none()
    }

    fn space_mut(&mut self) -> Result<&mut PagedAddressSpace> {
        let path = &self.path;
        self.space.as_mut().ok_or_else(|| {
            StrataError::InvalidArgument(format!("column file {} is closed", path.display()))
        })
    }

    /// Writable bytes from the append offset to the end of its page.
    ///
    /// The slice is only valid until the next mutating call; advance the
    /// cursor with [`jump_to`](Self::jump_to) after writing into it.
    pub fn append_address(&mut self) -> Result<&mut [u8]> {
        let offset = self.append_offset;
        let space = self.space_mut()?;
        let page = space.page_index_of(offset);
        let in_page = space.offset_in_page(offset);
        let buf = space.map_for_write(page)?;
        Ok(&mut buf[in_page..])
    }

    /// Bytes left in the page holding the append offset
    pub fn append_address_remaining(&self) -> usize {
        self.page_size - (self.append_offset & (self.page_size as u64 - 1)) as usize
    }

    /// Reposition the append cursor without writing
    pub fn jump_to(&mut self, offset: u64) -> Result<()> {
        let space = self.space_mut()?;
        if offset > 0 && offset > space.file_len()? {
            let last_page = space.page_index_of(offset - 1);
            space.ensure_file_size(last_page)?;
        }
        self.append_offset = offset;
        Ok(())
    }

    pub fn put_bytes(&mut self, mut bytes: &[u8]) -> Result<()> {
        while !bytes.is_empty() {
            let dst = self.append_address()?;
            let n = dst.len().min(bytes.len());
            dst[..n].copy_from_slice(&bytes[..n]);
            self.append_offset += n as u64;
            bytes = &bytes[n..];
        }
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.put_bytes(&[value])
    }

    pub fn put_i16(&mut self, value: i16) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_i32(&mut self, value: i32) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_i64(&mut self, value: i64) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_f32(&mut self, value: f32) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    pub fn put_f64(&mut self, value: f64) -> Result<()> {
        self.put_bytes(&value.to_le_bytes())
    }

    /// Flush the current page. Failures are logged, not raised.
    pub fn sync(&self, async_flush: bool) {
        if let Some(space) = &self.space {
            if let Err(e) = space.sync_write_page(async_flush) {
                error!(path = %self.path.display(), error = %e, "could not msync");
            }
        }
    }

    /// Reset the file to a single empty page and remap it
    pub fn truncate(&mut self) -> Result<()> {
        let page_size = self.page_size;
        let space = match self.space.as_mut() {
            Some(space) => space,
            None => return Ok(()),
        };

        space.release_write_page();
        space
            .files()
            .truncate(space.handle(), page_size as u64)
            .map_err(|e| {
                StrataError::io(format!("cannot truncate to {} bytes", page_size), &self.path, e)
            })?;
        space.map_for_write(0)?;
        self.append_offset = 0;
        debug!(path = %self.path.display(), "truncated");
        Ok(())
    }

    /// Unmap, optionally truncate to the append offset, and close the file
    pub fn close(&mut self, truncate: bool) {
        let mut space = match self.space.take() {
            Some(space) => space,
            None => return,
        };

        space.release_write_page();
        if truncate {
            best_effort_truncate(&space, self.append_offset);
        } else {
            debug!(path = %self.path.display(), "closed");
        }
    }
}

impl Drop for ColumnFile {
    fn drop(&mut self) {
        self.close(true);
    }
}

fn best_effort_truncate(space: &PagedAddressSpace, size: u64) {
    let ff = space.files();
    let fh = space.handle();
    let path = space.path().display();

    let err = match ff.truncate(fh, size) {
        Ok(()) => {
            debug!(path = %path, size, "truncated and closed");
            return;
        }
        Err(e) => e,
    };

    if ff.is_restricted_file_system() {
        // Shrinking is refused while any mapping exists; a page multiple is accepted.
        let page_size = space.page_size() as u64;
        let rounded = (size.saturating_sub(1) / page_size + 1) * page_size;
        if ff.truncate(fh, rounded).is_ok() {
            debug!(path = %path, size = rounded, "truncated and closed, second attempt");
            return;
        }
    }
    debug!(path = %path, error = %err, "closed without truncate");
}
