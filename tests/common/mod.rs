//! Shared test helpers: fault-injecting facades and legacy table builders.

#![allow(dead_code)]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use memmap2::{Mmap, MmapMut};
use parking_lot::Mutex;
use strata::files::{FileHandle, FilesFacade, StdFilesFacade};
use strata::format::{
    decode_meta, decode_tx, ARCHIVE_FILE_NAME, CURRENT_VERSION, META_FILE_NAME, TXN_FILE_NAME,
    UPGRADE_FILE_NAME,
};
use strata::table::{PartitionBy, TableModel};
use strata::{ColumnType, Config, Engine, TypeRegistry};
use tempfile::TempDir;

/// 2020-01-01T00:00:00Z
pub const BASE_TS: i64 = 1_577_836_800_000_000;
pub const HOUR: i64 = 3_600_000_000;
pub const DAY: i64 = 24 * HOUR;

// =============================================================================
// Fault Injection
// =============================================================================

/// Delegates to the real file system, failing chosen operations with EIO
#[derive(Debug, Default)]
pub struct FaultyFacade {
    inner: StdFilesFacade,
    /// Fail writes to paths containing this text, optionally only at an offset
    fail_write: Option<(String, Option<u64>)>,
    /// Fail reads of paths containing this text
    fail_read: Option<String>,
    /// Fail syncs of paths containing this text
    fail_sync: Option<String>,
    /// Refuse truncation to sizes that are not a multiple of this page size
    restricted_page: Option<u64>,
    pub failures: AtomicUsize,
}

impl FaultyFacade {
    pub fn failing_write(path_part: &str, offset: Option<u64>) -> Self {
        Self {
            fail_write: Some((path_part.to_string(), offset)),
            ..Default::default()
        }
    }

    pub fn failing_read(path_part: &str) -> Self {
        Self {
            fail_read: Some(path_part.to_string()),
            ..Default::default()
        }
    }

    pub fn failing_sync(path_part: &str) -> Self {
        Self {
            fail_sync: Some(path_part.to_string()),
            ..Default::default()
        }
    }

    /// Behave like a file system that only shrinks mapped files to page multiples
    pub fn restricted(page_size: u64) -> Self {
        Self {
            restricted_page: Some(page_size),
            ..Default::default()
        }
    }

    fn injected(&self) -> io::Error {
        self.failures.fetch_add(1, Ordering::SeqCst);
        io::Error::from_raw_os_error(5)
    }
}

fn matches(path: &Path, part: &str) -> bool {
    path.to_string_lossy().contains(part)
}

impl FilesFacade for FaultyFacade {
    fn open_rw(&self, path: &Path) -> io::Result<FileHandle> {
        self.inner.open_rw(path)
    }

    fn open_ro(&self, path: &Path) -> io::Result<FileHandle> {
        self.inner.open_ro(path)
    }

    fn length(&self, fh: &FileHandle) -> io::Result<u64> {
        self.inner.length(fh)
    }

    fn read(&self, fh: &FileHandle, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        match &self.fail_read {
            Some(part) if matches(fh.path(), part) => Err(self.injected()),
            _ => self.inner.read(fh, buf, offset),
        }
    }

    fn write(&self, fh: &FileHandle, buf: &[u8], offset: u64) -> io::Result<usize> {
        match &self.fail_write {
            Some((part, at)) if matches(fh.path(), part) && at.map_or(true, |o| o == offset) => {
                Err(self.injected())
            }
            _ => self.inner.write(fh, buf, offset),
        }
    }

    fn allocate(&self, fh: &FileHandle, size: u64) -> io::Result<()> {
        self.inner.allocate(fh, size)
    }

    fn truncate(&self, fh: &FileHandle, size: u64) -> io::Result<()> {
        match self.restricted_page {
            Some(page) if size % page != 0 => Err(self.injected()),
            _ => self.inner.truncate(fh, size),
        }
    }

    fn map_rw(&self, fh: &FileHandle, offset: u64, len: usize) -> io::Result<MmapMut> {
        self.inner.map_rw(fh, offset, len)
    }

    fn map_ro(&self, fh: &FileHandle, offset: u64, len: usize) -> io::Result<Mmap> {
        self.inner.map_ro(fh, offset, len)
    }

    fn msync(&self, map: &MmapMut, async_flush: bool) -> io::Result<()> {
        self.inner.msync(map, async_flush)
    }

    fn sync(&self, fh: &FileHandle) -> io::Result<()> {
        match &self.fail_sync {
            Some(part) if matches(fh.path(), part) => Err(self.injected()),
            _ => self.inner.sync(fh),
        }
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.inner.remove(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.inner.remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.inner.rename(from, to)
    }

    fn mkdirs(&self, path: &Path) -> io::Result<()> {
        self.inner.mkdirs(path)
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.list_dirs(path)
    }

    fn is_restricted_file_system(&self) -> bool {
        self.restricted_page.is_some()
    }
}

/// Records every mutating call with the path it touched
#[derive(Debug, Default)]
pub struct CountingFacade {
    inner: StdFilesFacade,
    pub mutations: Mutex<Vec<(&'static str, PathBuf)>>,
}

impl CountingFacade {
    fn record(&self, op: &'static str, path: &Path) {
        self.mutations.lock().push((op, path.to_path_buf()));
    }

    /// Mutations of anything other than the paths containing `allowed`
    pub fn mutations_outside(&self, allowed: &[&Path]) -> Vec<(&'static str, PathBuf)> {
        self.mutations
            .lock()
            .iter()
            .filter(|(_, p)| !allowed.iter().any(|a| p == a))
            .cloned()
            .collect()
    }
}

impl FilesFacade for CountingFacade {
    fn open_rw(&self, path: &Path) -> io::Result<FileHandle> {
        self.inner.open_rw(path)
    }

    fn open_ro(&self, path: &Path) -> io::Result<FileHandle> {
        self.inner.open_ro(path)
    }

    fn length(&self, fh: &FileHandle) -> io::Result<u64> {
        self.inner.length(fh)
    }

    fn read(&self, fh: &FileHandle, buf: &mut [u8], offset: u64) -> io::Result<usize> {
        self.inner.read(fh, buf, offset)
    }

    fn write(&self, fh: &FileHandle, buf: &[u8], offset: u64) -> io::Result<usize> {
        self.record("write", fh.path());
        self.inner.write(fh, buf, offset)
    }

    fn allocate(&self, fh: &FileHandle, size: u64) -> io::Result<()> {
        self.record("allocate", fh.path());
        self.inner.allocate(fh, size)
    }

    fn truncate(&self, fh: &FileHandle, size: u64) -> io::Result<()> {
        self.record("truncate", fh.path());
        self.inner.truncate(fh, size)
    }

    fn map_rw(&self, fh: &FileHandle, offset: u64, len: usize) -> io::Result<MmapMut> {
        self.record("map_rw", fh.path());
        self.inner.map_rw(fh, offset, len)
    }

    fn map_ro(&self, fh: &FileHandle, offset: u64, len: usize) -> io::Result<Mmap> {
        self.inner.map_ro(fh, offset, len)
    }

    fn msync(&self, map: &MmapMut, async_flush: bool) -> io::Result<()> {
        self.inner.msync(map, async_flush)
    }

    fn sync(&self, fh: &FileHandle) -> io::Result<()> {
        self.inner.sync(fh)
    }

    fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.record("remove", path);
        self.inner.remove(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        self.record("remove_dir_all", path);
        self.inner.remove_dir_all(path)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("rename", to);
        self.inner.rename(from, to)
    }

    fn mkdirs(&self, path: &Path) -> io::Result<()> {
        self.inner.mkdirs(path)
    }

    fn list_dirs(&self, path: &Path) -> io::Result<Vec<PathBuf>> {
        self.inner.list_dirs(path)
    }
}

// =============================================================================
// Engines and Tables
// =============================================================================

pub fn test_config(root: &Path) -> Config {
    Config::builder()
        .root(root)
        .column_page_size(4096)
        .tx_page_size(4096)
        .max_uncommitted_rows(1000)
        .commit_hysteresis_micros(60_000_000)
        .build()
}

pub fn open_engine(root: &Path) -> Engine {
    Engine::open(test_config(root)).unwrap()
}

pub fn open_engine_with(root: &Path, ff: Arc<dyn FilesFacade>) -> strata::Result<Engine> {
    Engine::open_with(test_config(root), ff)
}

/// A day-partitioned table: x LONG, i INT, s1 SYMBOL, s2 SYMBOL, ts
pub fn weather_model(name: &str) -> TableModel {
    TableModel::new(name, PartitionBy::Day)
        .col("x", ColumnType::Long)
        .col("i", ColumnType::Int)
        .col("s1", ColumnType::Symbol)
        .indexed(128)
        .col("s2", ColumnType::Symbol)
        .col("ts", ColumnType::Timestamp)
        .timestamp()
}

/// Write `rows` hourly rows starting at `BASE_TS`, committing once
pub fn fill_weather(engine: &Engine, table: &str, rows: i64) {
    let mut writer = engine.writer(table).unwrap();
    for n in 0..rows {
        let mut row = writer.new_row(BASE_TS + n * HOUR).unwrap();
        row.put(0, n * 3 + 1).unwrap();
        if n % 7 != 0 {
            row.put(1, (n % 11) as i32).unwrap();
        }
        row.put(2, ["a", "b", "c"][(n % 3) as usize]).unwrap();
        if n % 5 != 0 {
            row.put(3, ["x", "y"][(n % 2) as usize]).unwrap();
        }
        row.append().unwrap();
    }
    writer.commit().unwrap();
}

/// Expected `sum(x)` of rows `[from, to)` written by [`fill_weather`]
pub fn weather_sum(from: i64, to: i64) -> i64 {
    (from..to).map(|n| n * 3 + 1).sum()
}

pub fn temp_root() -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("db");
    (temp, root)
}

// =============================================================================
// Legacy Layouts
// =============================================================================

/// Rewrite a current table in the layout of `version` (416 or 417): legacy
/// transaction file with `removed` partitions, `_archive` sizes for closed
/// partitions, fields newer than `version` zeroed. Removes the marker.
pub fn downgrade(root: &Path, table: &str, version: i32, removed: &[i64]) {
    assert!(version < 418);
    let dir = root.join(table);
    let registry = TypeRegistry::new();

    let meta_path = dir.join(META_FILE_NAME);
    let mut meta_bytes = fs::read(&meta_path).unwrap();
    let meta = decode_meta(&meta_bytes, CURRENT_VERSION, &registry).unwrap();
    meta_bytes[0..4].copy_from_slice(&version.to_le_bytes());
    meta_bytes[20..32].fill(0);
    if version < 417 {
        meta_bytes[16..20].fill(0);
    }
    fs::write(&meta_path, &meta_bytes).unwrap();

    let tx_path = dir.join(TXN_FILE_NAME);
    let tx_bytes = fs::read(&tx_path).unwrap();
    let tx = decode_tx(&tx_bytes, CURRENT_VERSION).unwrap();
    for p in tx.closed_partitions() {
        let name = meta.partition_by.dir_name(p.timestamp).unwrap();
        fs::write(dir.join(name).join(ARCHIVE_FILE_NAME), p.row_count.to_le_bytes()).unwrap();
    }

    let mut legacy = tx_bytes[..72].to_vec();
    legacy[0..4].copy_from_slice(&version.to_le_bytes());
    legacy.extend_from_slice(&(tx.symbol_counts.len() as i32).to_le_bytes());
    for s in &tx.symbol_counts {
        legacy.extend_from_slice(&s.count.to_le_bytes());
    }
    legacy.extend_from_slice(&(removed.len() as i32).to_le_bytes());
    for ts in removed {
        legacy.extend_from_slice(&ts.to_le_bytes());
    }
    fs::write(&tx_path, &legacy).unwrap();

    let marker = root.join(UPGRADE_FILE_NAME);
    if marker.exists() {
        fs::remove_file(marker).unwrap();
    }
}

pub fn read_meta_version(root: &Path, table: &str) -> i32 {
    let bytes = fs::read(root.join(table).join(META_FILE_NAME)).unwrap();
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub fn day_partition(day: i64) -> String {
    PartitionBy::Day.dir_name(BASE_TS + day * DAY).unwrap()
}
