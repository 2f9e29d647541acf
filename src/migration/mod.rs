//! Migration Module
//!
//! Brings every table under a storage root to a target format version,
//! exactly once, before any table is opened.
//!
//! ## Flow
//! ```text
//! ┌──────────────┐  marker >= target   ┌──────┐
//! │ read marker  │────────────────────►│ done │ (fast path)
//! └──────┬───────┘                     └──────┘
//!        ▼
//! ┌──────────────┐  for each table dir holding _meta
//! │  scan tables │──────────────────────────────┐
//! └──────┬───────┘                              ▼
//!        │                     ┌──────────────────────────────────┐
//!        │                     │ version >= target? skip          │
//!        │                     │ else step v → v+1 until target:  │
//!        │                     │   patch fields, then version tag │
//!        │                     └──────────────────────────────────┘
//!        ▼
//! ┌──────────────┐
//! │ write marker │ (failure is logged, next boot rescans)
//! └──────────────┘
//! ```
//!
//! Each table's own version tag is authoritative; the marker only skips
//! the scan. A crash between a field patch and the version tag leaves the
//! table at the old version, and the step runs again on the next boot.

mod steps;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::column_type::TypeRegistry;
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::files::{self, FileHandle, FilesFacade};
use crate::format::{
    self, meta::META_OFFSET_VERSION, CURRENT_VERSION, META_FILE_NAME, UPGRADE_FILE_NAME,
};
use crate::table::{self, TableIdGenerator};

pub use steps::MigrationStep;

/// What a migration run did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// The marker already recorded the target; no table was looked at
    pub fast_path: bool,
    pub tables_scanned: usize,
    pub tables_migrated: usize,
    pub steps_applied: usize,
}

/// Per-table state shared by the steps of one run
pub(crate) struct TableContext {
    pub(crate) dir: PathBuf,
    pub(crate) name: String,
    pub(crate) meta_fh: FileHandle,
    /// Allocated at most once per table per run
    pub(crate) table_id: Option<i32>,
}

impl TableContext {
    /// Wrap a failure as fatal for this table
    pub(crate) fn fail(&self, message: impl Into<String>) -> impl FnOnce(StrataError) -> StrataError + '_ {
        let message = message.into();
        move |source| StrataError::Migration {
            table: self.name.clone(),
            message,
            source: Box::new(source),
        }
    }

    pub(crate) fn write_meta(&self, ff: &dyn FilesFacade, offset: u64, bytes: &[u8]) -> Result<()> {
        files::write_fully(ff, &self.meta_fh, bytes, offset)
    }
}

/// Migration driver for one storage root
pub struct EngineMigration<'a> {
    ff: Arc<dyn FilesFacade>,
    config: &'a Config,
    registry: &'a TypeRegistry,
    ids: &'a TableIdGenerator,
}

impl<'a> EngineMigration<'a> {
    pub fn new(
        ff: Arc<dyn FilesFacade>,
        config: &'a Config,
        registry: &'a TypeRegistry,
        ids: &'a TableIdGenerator,
    ) -> Self {
        Self {
            ff,
            config,
            registry,
            ids,
        }
    }

    fn root(&self) -> &Path {
        &self.config.root
    }

    /// Migrate every table to `target`
    pub fn migrate_engine_to(&self, target: i32) -> Result<MigrationReport> {
        if !format::is_supported(target) {
            return Err(StrataError::UnsupportedFormatVersion {
                kind: "migration target",
                version: target,
            });
        }

        let mut report = MigrationReport::default();
        let marker = self.root().join(UPGRADE_FILE_NAME);
        if let Some(done) = self.read_marker(&marker) {
            if done >= target {
                debug!(root = %self.root().display(), version = done, "tables already migrated");
                report.fast_path = true;
                return Ok(report);
            }
        }

        info!(root = %self.root().display(), target, "migrating tables");
        for dir in table::list_tables(self.ff.as_ref(), self.root())? {
            report.tables_scanned += 1;
            let steps = self.migrate_table(&dir, target)?;
            if steps > 0 {
                report.tables_migrated += 1;
                report.steps_applied += steps;
            }
        }

        if let Err(e) = self.write_marker(&marker, target) {
            warn!(path = %marker.display(), error = %e, "could not write upgrade marker");
        }

        info!(
            scanned = report.tables_scanned,
            migrated = report.tables_migrated,
            steps = report.steps_applied,
            "migration complete"
        );
        Ok(report)
    }

    /// Bring one table to `target`; returns the number of steps applied
    fn migrate_table(&self, dir: &Path, target: i32) -> Result<usize> {
        let name = table::table_name(dir);
        let meta_path = dir.join(META_FILE_NAME);
        let failed_read = |source: StrataError| StrataError::Migration {
            table: name.clone(),
            message: "failed to read metadata file".to_string(),
            source: Box::new(source),
        };

        let meta_fh = files::open_rw_or_fail(self.ff.as_ref(), &meta_path).map_err(failed_read)?;
        let mut tag = [0u8; 4];
        files::read_fully(self.ff.as_ref(), &meta_fh, &mut tag, META_OFFSET_VERSION).map_err(failed_read)?;
        let mut version = i32::from_le_bytes(tag);

        if version >= target {
            debug!(table = %name, version, "table is up to date");
            return Ok(0);
        }
        if !format::is_supported(version) {
            return Err(StrataError::UnsupportedFormatVersion {
                kind: "metadata file",
                version,
            });
        }

        let mut ctx = TableContext {
            dir: dir.to_path_buf(),
            name,
            meta_fh,
            table_id: None,
        };

        let mut applied = 0;
        while version < target {
            let step = steps::step_for(version).ok_or(StrataError::UnsupportedFormatVersion {
                kind: "metadata file",
                version,
            })?;
            info!(table = %ctx.name, from = step.from, to = step.from + 1, step = step.description, "applying migration step");
            (step.apply)(self, &mut ctx)?;

            let next = step.from + 1;
            ctx.write_meta(self.ff.as_ref(), META_OFFSET_VERSION, &next.to_le_bytes())
                .map_err(ctx.fail("failed to write updated version to table metadata file"))?;
            version = next;
            applied += 1;
        }

        self.ff
            .sync(&ctx.meta_fh)
            .map_err(|e| StrataError::io("could not sync", &meta_path, e))
            .map_err(ctx.fail("failed to sync table metadata file"))?;
        Ok(applied)
    }

    fn read_marker(&self, path: &Path) -> Option<i32> {
        if !self.ff.exists(path) {
            return None;
        }
        match files::read_file(self.ff.as_ref(), path) {
            Ok(bytes) if bytes.len() >= 4 => Some(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])),
            Ok(_) => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read upgrade marker");
                None
            }
        }
    }

    fn write_marker(&self, path: &Path, version: i32) -> Result<()> {
        let fh = files::open_rw_or_fail(self.ff.as_ref(), path)?;
        files::write_fully(self.ff.as_ref(), &fh, &version.to_le_bytes(), 0)?;
        self.ff
            .truncate(&fh, 4)
            .map_err(|e| StrataError::io("could not truncate", path, e))?;
        self.ff
            .sync(&fh)
            .map_err(|e| StrataError::io("could not sync", path, e))
    }
}

/// Convenience wrapper migrating to the version this build writes
pub fn migrate_to_current(
    ff: Arc<dyn FilesFacade>,
    config: &Config,
    registry: &TypeRegistry,
    ids: &TableIdGenerator,
) -> Result<MigrationReport> {
    EngineMigration::new(ff, config, registry, ids).migrate_engine_to(CURRENT_VERSION)
}
