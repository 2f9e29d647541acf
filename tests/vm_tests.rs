//! Tests for the paged address space, column files and column readers
//!
//! These tests verify:
//! - Page arithmetic and file growth before a page is mapped
//! - Appends crossing page boundaries
//! - Truncation to the logical size on close
//! - Read mappings observe bytes written through the write page

mod common;

use std::fs;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use common::FaultyFacade;

use strata::files::{FilesFacade, StdFilesFacade};
use strata::vm::{ColumnFile, ColumnReader, PagedAddressSpace};
use strata::StrataError;
use tempfile::TempDir;

const PAGE: usize = 4096;

fn facade() -> Arc<dyn FilesFacade> {
    Arc::new(StdFilesFacade::new())
}

// =============================================================================
// PagedAddressSpace Tests
// =============================================================================

#[test]
fn test_page_arithmetic() {
    let temp = TempDir::new().unwrap();
    let space = PagedAddressSpace::open_rw(facade(), &temp.path().join("a.d"), PAGE).unwrap();

    assert_eq!(space.page_index_of(0), 0);
    assert_eq!(space.page_index_of(4095), 0);
    assert_eq!(space.page_index_of(4096), 1);
    assert_eq!(space.offset_in_page(4097), 1);
    assert_eq!(space.page_offset(3), 3 * 4096);
}

#[test]
fn test_map_for_write_grows_file_first() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.d");
    let mut space = PagedAddressSpace::open_rw(facade(), &path, PAGE).unwrap();
    assert_eq!(space.file_len().unwrap(), 0);

    let page = space.map_for_write(2).unwrap();
    assert_eq!(page.len(), PAGE);
    page[0] = 7;
    assert_eq!(space.file_len().unwrap(), 3 * PAGE as u64);
    assert_eq!(space.write_page_index(), Some(2));

    // Mapping another page releases the previous one
    space.map_for_write(0).unwrap();
    assert_eq!(space.write_page_index(), Some(0));
    space.release_write_page();
    assert_eq!(space.write_page_index(), None);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes[2 * PAGE], 7);
}

#[test]
fn test_read_page_sees_write_page() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.d");
    let mut space = PagedAddressSpace::open_rw(facade(), &path, PAGE).unwrap();

    space.map_for_write(0).unwrap()[..4].copy_from_slice(b"abcd");
    let read = space.map_for_read(0).unwrap();
    assert_eq!(&read[..4], b"abcd");
    assert_eq!(read.index(), 0);
    assert_eq!(read.offset(), 0);
}

#[test]
fn test_read_only_space_rejects_write_mapping() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.d");
    fs::write(&path, vec![0u8; PAGE]).unwrap();

    let mut space = PagedAddressSpace::open_ro(facade(), &path, PAGE).unwrap();
    assert!(matches!(space.map_for_write(0), Err(StrataError::InvalidArgument(_))));
    assert!(space.map_for_read(1).is_err());
}

#[test]
fn test_invalid_page_size() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("a.d");
    assert!(PagedAddressSpace::open_rw(facade(), &path, 1000).is_err());
    assert!(PagedAddressSpace::open_rw(facade(), &path, 2048).is_err());
}

#[test]
fn test_open_missing_file_read_only() {
    let temp = TempDir::new().unwrap();
    let err = PagedAddressSpace::open_ro(facade(), &temp.path().join("missing.d"), PAGE)
        .err()
        .unwrap();
    assert!(err.is_io());
    assert!(err.os_error().is_some());
}

// =============================================================================
// ColumnFile Tests
// =============================================================================

#[test]
fn test_append_across_pages_and_truncate_on_close() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();

    for i in 0..1000i64 {
        file.put_i64(i).unwrap();
    }
    assert_eq!(file.append_offset(), 8000);
    assert_eq!(file.append_address_remaining(), 2 * PAGE - 8000);
    file.close(true);
    assert!(file.is_closed());

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes.len(), 8000);
    for i in 0..1000usize {
        let v = i64::from_le_bytes(bytes[i * 8..i * 8 + 8].try_into().unwrap());
        assert_eq!(v, i as i64);
    }
}

#[test]
fn test_close_without_truncate_keeps_pages() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();
    file.put_i32(42).unwrap();
    file.close(false);

    assert_eq!(fs::metadata(&path).unwrap().len(), PAGE as u64);
}

#[test]
fn test_drop_truncates() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    {
        let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();
        file.put_bytes(&[1u8; 10_000]).unwrap();
    }
    assert_eq!(fs::metadata(&path).unwrap().len(), 10_000);
}

#[test]
fn test_jump_to_discards_partial_record() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();

    file.put_i32(1).unwrap();
    file.put_i32(2).unwrap();
    file.jump_to(4).unwrap();
    file.put_i32(3).unwrap();
    file.close(true);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(bytes, [1i32.to_le_bytes(), 3i32.to_le_bytes()].concat());
}

#[test]
fn test_jump_forward_grows_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();

    file.jump_to(3 * PAGE as u64 + 8).unwrap();
    assert!(fs::metadata(&path).unwrap().len() >= 3 * PAGE as u64 + 8);
    file.put_i64(9).unwrap();
    assert_eq!(file.append_offset(), 3 * PAGE as u64 + 16);
}

#[test]
fn test_append_address_is_writable_until_page_end() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();

    file.put_bytes(&[0u8; 100]).unwrap();
    let dst = file.append_address().unwrap();
    assert_eq!(dst.len(), PAGE - 100);
    dst[..3].copy_from_slice(b"xyz");
    file.jump_to(103).unwrap();
    file.close(true);

    let bytes = fs::read(&path).unwrap();
    assert_eq!(&bytes[100..103], b"xyz");
}

#[test]
fn test_truncate_resets_to_first_page() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();

    file.put_bytes(&vec![5u8; 3 * PAGE]).unwrap();
    file.truncate().unwrap();
    assert_eq!(file.append_offset(), 0);
    assert_eq!(fs::metadata(&path).unwrap().len(), PAGE as u64);

    file.put_f64(1.5).unwrap();
    file.sync(false);
    file.close(true);
    assert_eq!(fs::read(&path).unwrap(), 1.5f64.to_le_bytes().to_vec());
}

#[test]
fn test_closed_file_rejects_appends() {
    let temp = TempDir::new().unwrap();
    let mut file = ColumnFile::open(facade(), &temp.path().join("x.d"), PAGE).unwrap();
    file.close(true);
    assert!(file.put_u8(1).is_err());
    // Closing twice is a no-op
    file.close(true);
}

#[test]
fn test_restricted_file_system_rounds_truncate_to_page() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let ff = Arc::new(FaultyFacade::restricted(PAGE as u64));
    let mut file = ColumnFile::open(ff.clone(), &path, PAGE).unwrap();

    file.put_bytes(&[3u8; 3 * PAGE + 10]).unwrap();
    file.close(true);

    // First attempt refused, second attempt at the next page boundary
    assert_eq!(ff.failures.load(Ordering::SeqCst), 1);
    assert_eq!(fs::metadata(&path).unwrap().len(), 4 * PAGE as u64);
}

// =============================================================================
// ColumnReader Tests
// =============================================================================

#[test]
fn test_reader_crosses_pages() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();
    for i in 0..2000i64 {
        file.put_i64(i * i).unwrap();
    }
    file.close(true);

    let mut reader = ColumnReader::open(facade(), &path, PAGE, 16_000).unwrap();
    assert_eq!(reader.size(), 16_000);
    for i in [0u64, 511, 512, 1023, 1999] {
        assert_eq!(reader.get_i64(i * 8).unwrap(), (i * i) as i64);
    }

    // A value straddling a page boundary
    let mut buf = [0u8; 8];
    reader.read_at(PAGE as u64 - 4, &mut buf).unwrap();
    assert!(matches!(reader.get_i64(16_000), Err(StrataError::InvalidArgument(_))));
}

#[test]
fn test_reader_ignores_uncommitted_tail() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    let mut file = ColumnFile::open(facade(), &path, PAGE).unwrap();
    file.put_i32(1).unwrap();
    file.put_i32(2).unwrap();

    // Writer still open; the reader sees only the first value
    let mut reader = ColumnReader::open(facade(), &path, PAGE, 4).unwrap();
    assert_eq!(reader.get_i32(0).unwrap(), 1);
    assert!(reader.get_i32(4).is_err());
}

#[test]
fn test_reader_rejects_short_file() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("x.d");
    fs::write(&path, [0u8; 8]).unwrap();

    assert!(matches!(
        ColumnReader::open(facade(), &path, PAGE, 16),
        Err(StrataError::Corrupt { .. })
    ));
}
