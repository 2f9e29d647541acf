//! Default facade over `std::fs` and `memmap2`.

use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapMut, MmapOptions};

use super::{FileHandle, FilesFacade};

#[derive(Debug, Default, Clone, Copy)]
pub struct StdFilesFacade;

impl StdFilesFacade {
    pub fn new() -> Self {
        StdFilesFacade
    }
}

impl FilesFacade for StdFilesFacade {
    fn open_rw(&self, path: &Path) -> io::Result<FileHandle> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(FileHandle::new(file, path))
    }

    fn open_ro(&self, path: &Path) -> io::Result<FileHandle> {
        let file = OpenOptions::new().read(true).open(path)?;
        Ok(FileHandle::new(file, path))
    }

    fn length(&self, fh: &FileHandle) -> io::Result<u64> {
        Ok(fh.file().metadata()?.len())
    }

    fn read(&self, fh: &FileHandle, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        read_at(fh, buf, offset)
    }

    fn write(&self, fh: &FileHandle, buf: &[u8], offset: u64) -> io::Result<usize> {
        let mut done = 0;
        while done < buf.len() {
            let n = write_at(fh, &buf[done..], offset + done as u64)?;
            if n == 0 {
                break;
            }
            done += n;
        }
        Ok(done)
    }

    fn allocate(&self, fh: &FileHandle, size: u64) -> io::Result<()> {
        if fh.file().metadata()?.len() < size {
            fh.file().set_len(size)?;
        }
        Ok(())
    }

    fn truncate(&self, fh: &FileHandle, size: u64) -> io::Result<()> {
        fh.file().set_len(size)
    }

    fn map_rw(&self, fh: &FileHandle, offset: u64, len: usize) -> io::Result<MmapMut> {
        // SAFETY: the mapping is only valid while the file is not shrunk
        // underneath it. Callers grow the file to cover [offset, offset+len)
        // before mapping and drop the mapping before any truncate, and the
        // mapping never outlives the owning address space.
        unsafe {
            MmapOptions::new()
                .offset(offset)
                .len(len)
                .map_mut(fh.file())
        }
    }

    fn map_ro(&self, fh: &FileHandle, offset: u64, len: usize) -> io::Result<Mmap> {
        // SAFETY: same contract as map_rw; read pages are sized to the file
        // length observed when they are mapped.
        unsafe { MmapOptions::new().offset(offset).len(len).map(fh.file()) }
    }

    fn msync(&self, map: &MmapMut, async_flush: bool) -> io::Result<()> {
        if async_flush {
            map.flush_async()
        } else {
            map.flush()
        }
    }

    fn sync(&self, fh: &FileHandle) -> io::Result<()> {
        fh.file().sync_all()
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn mkdirs(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        let mut dirs = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                dirs.push(entry.path());
            }
        }
        dirs.sort();
        Ok(dirs)
    }
}

#[cfg(unix)]
fn read_at(fh: &FileHandle, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    fh.file().read_at(buf, offset)
}

#[cfg(unix)]
fn write_at(fh: &FileHandle, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::unix::fs::FileExt;
    fh.file().write_at(buf, offset)
}

#[cfg(windows)]
fn read_at(fh: &FileHandle, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    fh.file().seek_read(buf, offset)
}

#[cfg(windows)]
fn write_at(fh: &FileHandle, buf: &[u8], offset: u64) -> io::Result<usize> {
    use std::os::windows::fs::FileExt;
    fh.file().seek_write(buf, offset)
}
