//! Files Module
//!
//! The file-system facade every storage component goes through.
//!
//! ## Responsibilities
//! - Open/read/write/truncate/allocate files at explicit offsets
//! - Map and sync file regions (unmapping is dropping the mapping)
//! - Directory housekeeping: exists/remove/rename/mkdirs/list
//!
//! Each call reports success or an `io::Error` carrying the OS error code.
//! Components never touch `std::fs` directly, which lets tests substitute a
//! facade that fails a chosen write or counts every mutation.

mod std_facade;

use std::fmt;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut};

use crate::error::{Result, StrataError};

pub use std_facade::StdFilesFacade;

/// An open file together with the path it was opened from
pub struct FileHandle {
    file: File,
    path: PathBuf,
}

impl FileHandle {
    pub fn new(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            file,
            path: path.into(),
        }
    }

    pub fn file(&self) -> &File {
        &self.file
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("path", &self.path)
            .finish()
    }
}

/// File-system contract required by the storage layer
pub trait FilesFacade: Send + Sync + fmt::Debug {
    /// Open for read-write, creating the file if absent
    fn open_rw(&self, path: &Path) -> io::Result<FileHandle>;

    fn open_ro(&self, path: &Path) -> io::Result<FileHandle>;

    fn length(&self, fh: &FileHandle) -> io::Result<u64>;

    /// Read at `offset`; returns the number of bytes read
    fn read(&self, fh: &FileHandle, buf: &mut [u8], offset: u64) -> io::Result<usize>;

    /// Write at `offset`; returns the number of bytes written
    fn write(&self, fh: &FileHandle, buf: &[u8], offset: u64) -> io::Result<usize>;

    /// Grow the file to at least `size` bytes
    fn allocate(&self, fh: &FileHandle, size: u64) -> io::Result<()>;

    /// Set the file length to exactly `size` bytes
    fn truncate(&self, fh: &FileHandle, size: u64) -> io::Result<()>;

    fn map_rw(&self, fh: &FileHandle, offset: u64, len: usize) -> io::Result<MmapMut>;

    fn map_ro(&self, fh: &FileHandle, offset: u64, len: usize) -> io::Result<Mmap>;

    fn msync(&self, map: &MmapMut, async_flush: bool) -> io::Result<()>;

    fn sync(&self, fh: &FileHandle) -> io::Result<()>;

    fn exists(&self, path: &Path) -> bool;

    fn remove(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn mkdirs(&self, path: &Path) -> io::Result<()>;

    /// Immediate sub-directories of `path`
    fn list_dirs(&self, path: &Path) -> io::Result<Vec<PathBuf>>;

    /// File systems that refuse to shrink a file while any mapping of it exists
    fn is_restricted_file_system(&self) -> bool {
        cfg!(windows)
    }
}

// =============================================================================
// Helpers shared by every component
// =============================================================================

pub fn open_rw_or_fail(ff: &dyn FilesFacade, path: &Path) -> Result<FileHandle> {
    ff.open_rw(path)
        .map_err(|e| StrataError::io("could not open read-write", path, e))
}

pub fn open_ro_or_fail(ff: &dyn FilesFacade, path: &Path) -> Result<FileHandle> {
    ff.open_ro(path)
        .map_err(|e| StrataError::io("could not open read-only", path, e))
}

pub fn length_or_fail(ff: &dyn FilesFacade, fh: &FileHandle) -> Result<u64> {
    ff.length(fh)
        .map_err(|e| StrataError::io("could not get length", fh.path(), e))
}

/// Read exactly `buf.len()` bytes at `offset`
pub fn read_fully(ff: &dyn FilesFacade, fh: &FileHandle, buf: &mut [u8], offset: u64) -> Result<()> {
    let mut done = 0;
    while done < buf.len() {
        let n = ff
            .read(fh, &mut buf[done..], offset + done as u64)
            .map_err(|e| StrataError::io("could not read", fh.path(), e))?;
        if n == 0 {
            return Err(StrataError::io(
                format!("short read at offset {}", offset + done as u64),
                fh.path(),
                io::Error::from(io::ErrorKind::UnexpectedEof),
            ));
        }
        done += n;
    }
    Ok(())
}

/// Read a whole file into memory
pub fn read_file(ff: &dyn FilesFacade, path: &Path) -> Result<Vec<u8>> {
    let fh = open_ro_or_fail(ff, path)?;
    let len = length_or_fail(ff, &fh)?;
    let mut buf = vec![0u8; len as usize];
    read_fully(ff, &fh, &mut buf, 0)?;
    Ok(buf)
}

/// Write all of `buf` at `offset`; a short write is an error, not a retry
pub fn write_fully(ff: &dyn FilesFacade, fh: &FileHandle, buf: &[u8], offset: u64) -> Result<()> {
    let written = ff
        .write(fh, buf, offset)
        .map_err(|e| StrataError::io("could not write", fh.path(), e))?;
    if written != buf.len() {
        return Err(StrataError::PartialWrite {
            path: fh.path().to_path_buf(),
            offset,
            requested: buf.len(),
            written,
        });
    }
    Ok(())
}
