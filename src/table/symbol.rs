//! Symbol dictionaries.
//!
//! One `<table>/<column>.c` file per symbol column holds the distinct values
//! in key order, each as a `u32` byte length followed by UTF-8 bytes. The
//! committed count in the transaction file bounds how many entries are
//! valid; anything past it is left over from an uncommitted writer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use bytes::BufMut;

use crate::error::{Result, StrataError};
use crate::files::{self, FileHandle, FilesFacade};

const KIND: &str = "symbol dictionary";

pub const SYMBOL_FILE_SUFFIX: &str = ".c";

pub fn symbol_file(table_dir: &Path, column: &str) -> PathBuf {
    table_dir.join(format!("{}{}", column, SYMBOL_FILE_SUFFIX))
}

/// Read the first `count` entries of a dictionary
pub fn read_symbols(ff: &dyn FilesFacade, path: &Path, count: usize) -> Result<Vec<String>> {
    if count == 0 {
        return Ok(Vec::new());
    }
    let bytes = files::read_file(ff, path)?;
    let (values, _) = parse(&bytes, count, path)?;
    Ok(values)
}

fn parse(bytes: &[u8], count: usize, path: &Path) -> Result<(Vec<String>, u64)> {
    let mut values = Vec::with_capacity(count);
    let mut offset = 0usize;
    for i in 0..count {
        let len = bytes
            .get(offset..offset + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as usize)
            .ok_or_else(|| truncated(path, i, count))?;
        let raw = bytes
            .get(offset + 4..offset + 4 + len)
            .ok_or_else(|| truncated(path, i, count))?;
        let value = std::str::from_utf8(raw).map_err(|_| {
            StrataError::corrupt(KIND, format!("{} entry {} is not UTF-8", path.display(), i))
        })?;
        values.push(value.to_string());
        offset += 4 + len;
    }
    Ok((values, offset as u64))
}

fn truncated(path: &Path, entry: usize, count: usize) -> StrataError {
    StrataError::corrupt(
        KIND,
        format!("{} ends at entry {} of {}", path.display(), entry, count),
    )
}

/// Writer-side dictionary: value → key, with entries added since the last
/// flush kept in memory.
pub struct SymbolTable {
    fh: FileHandle,
    keys: HashMap<String, i32>,
    values: Vec<String>,
    /// Entries already in the file
    flushed: usize,
    /// File length covering the flushed entries
    file_len: u64,
}

impl SymbolTable {
    /// Open a dictionary holding `committed` valid entries
    pub fn open(ff: &dyn FilesFacade, path: &Path, committed: usize) -> Result<Self> {
        let fh = files::open_rw_or_fail(ff, path)?;
        let len = files::length_or_fail(ff, &fh)?;
        let mut bytes = vec![0u8; len as usize];
        files::read_fully(ff, &fh, &mut bytes, 0)?;
        let (values, file_len) = parse(&bytes, committed, path)?;

        let keys = values
            .iter()
            .enumerate()
            .map(|(i, v)| (v.clone(), i as i32))
            .collect();
        Ok(Self {
            fh,
            keys,
            flushed: values.len(),
            values,
            file_len,
        })
    }

    /// Key of `value`, adding it when new
    pub fn put(&mut self, value: &str) -> i32 {
        if let Some(&key) = self.keys.get(value) {
            return key;
        }
        let key = self.values.len() as i32;
        self.values.push(value.to_string());
        self.keys.insert(value.to_string(), key);
        key
    }

    /// Forget entries added after the first `len`; flushed entries stay
    pub fn rollback(&mut self, len: usize) {
        let len = len.max(self.flushed);
        for value in self.values.drain(len.min(self.values.len())..) {
            self.keys.remove(&value);
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Write pending entries and sync the file
    pub fn flush(&mut self, ff: &dyn FilesFacade) -> Result<()> {
        if self.flushed == self.values.len() {
            return Ok(());
        }
        let mut buf = Vec::new();
        for value in &self.values[self.flushed..] {
            buf.put_u32_le(value.len() as u32);
            buf.put_slice(value.as_bytes());
        }
        files::write_fully(ff, &self.fh, &buf, self.file_len)?;
        ff.truncate(&self.fh, self.file_len + buf.len() as u64)
            .map_err(|e| StrataError::io("could not truncate", self.fh.path(), e))?;
        ff.sync(&self.fh)
            .map_err(|e| StrataError::io("could not sync", self.fh.path(), e))?;
        self.file_len += buf.len() as u64;
        self.flushed = self.values.len();
        Ok(())
    }
}
