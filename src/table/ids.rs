//! Table id allocation.
//!
//! The last issued id is persisted as an `i64` in `<root>/_tab_index.d`;
//! ids survive restarts and are never reused.

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::error::{Result, StrataError};
use crate::files::{self, FileHandle, FilesFacade};
use crate::format::TABLE_INDEX_FILE_NAME;

pub struct TableIdGenerator {
    ff: Arc<dyn FilesFacade>,
    inner: Mutex<Inner>,
}

struct Inner {
    fh: FileHandle,
    last: i64,
}

impl TableIdGenerator {
    /// Open (creating if absent) the counter file under `root`
    pub fn open(ff: Arc<dyn FilesFacade>, root: &Path) -> Result<Self> {
        let path = root.join(TABLE_INDEX_FILE_NAME);
        let fh = files::open_rw_or_fail(ff.as_ref(), &path)?;
        let last = if files::length_or_fail(ff.as_ref(), &fh)? >= 8 {
            let mut buf = [0u8; 8];
            files::read_fully(ff.as_ref(), &fh, &mut buf, 0)?;
            i64::from_le_bytes(buf)
        } else {
            0
        };
        if last < 0 {
            return Err(StrataError::corrupt(
                "table index file",
                format!("negative table id counter {}", last),
            ));
        }
        debug!(path = %path.display(), last, "table id generator opened");
        Ok(Self {
            ff,
            inner: Mutex::new(Inner { fh, last }),
        })
    }

    /// Allocate and persist the next id. Nothing is issued if the write or sync fails.
    pub fn next(&self) -> Result<i32> {
        let mut inner = self.inner.lock();
        let next = inner.last + 1;
        if next > i32::MAX as i64 {
            return Err(StrataError::InvalidArgument(
                "table id space exhausted".to_string(),
            ));
        }
        files::write_fully(self.ff.as_ref(), &inner.fh, &next.to_le_bytes(), 0)?;
        // Durable before any table can carry the id
        self.ff
            .sync(&inner.fh)
            .map_err(|e| StrataError::io("could not sync", inner.fh.path(), e))?;
        inner.last = next;
        Ok(next as i32)
    }

    /// Last id issued, zero when none
    pub fn last(&self) -> i64 {
        self.inner.lock().last
    }
}
