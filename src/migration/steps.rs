//! Migration steps, one per format version bump.
//!
//! A step computes everything it will write from the bytes on disk before
//! writing, patches fields, and leaves the version tag to the driver. Steps
//! are safe to rerun after a crash at any point.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, StrataError};
use crate::files;
use crate::format::meta::{
    META_OFFSET_COMMIT_HYSTERESIS_MICROS, META_OFFSET_MAX_UNCOMMITTED_ROWS, META_OFFSET_TABLE_ID,
};
use crate::format::{
    self, decode_meta, decode_tx, encode_tx, PartitionEntry, TableMetadata, TxRecord,
    ARCHIVE_FILE_NAME, META_FILE_NAME, TXN_FILE_NAME, VERSION_OLDEST_SUPPORTED,
    VERSION_THAT_ADDED_TABLE_ID, VERSION_TX_STRUCT_UPDATE_1,
};
use crate::table::column_file;
use crate::vm::ColumnFile;

use super::{EngineMigration, TableContext};

const TXN_TMP_FILE_NAME: &str = "_txn.tmp";

type StepFn = fn(&EngineMigration<'_>, &mut TableContext) -> Result<()>;

/// Transform from `from` to `from + 1`
pub struct MigrationStep {
    pub from: i32,
    pub description: &'static str,
    pub(crate) apply: StepFn,
}

static STEPS: [MigrationStep; 3] = [
    MigrationStep {
        from: VERSION_OLDEST_SUPPORTED,
        description: "assign table id",
        apply: assign_table_id,
    },
    MigrationStep {
        from: VERSION_THAT_ADDED_TABLE_ID,
        description: "rebuild transaction file",
        apply: rebuild_transaction_file,
    },
    MigrationStep {
        from: VERSION_TX_STRUCT_UPDATE_1,
        description: "add commit hysteresis",
        apply: add_commit_hysteresis,
    },
];

pub(crate) fn step_for(from: i32) -> Option<&'static MigrationStep> {
    STEPS.iter().find(|s| s.from == from)
}

// =============================================================================
// 416 → 417
// =============================================================================

fn assign_table_id(m: &EngineMigration<'_>, ctx: &mut TableContext) -> Result<()> {
    if ctx.table_id.is_none() {
        // Reserved and zero at 416; non-zero means an earlier run wrote the id
        // and crashed before the version tag
        let mut buf = [0u8; 4];
        files::read_fully(m.ff.as_ref(), &ctx.meta_fh, &mut buf, META_OFFSET_TABLE_ID)
            .map_err(ctx.fail("failed to read metadata file"))?;
        let written = i32::from_le_bytes(buf);
        if written > 0 {
            debug!(table = %ctx.name, table_id = written, "reusing table id from an earlier run");
            ctx.table_id = Some(written);
        }
    }

    let id = match ctx.table_id {
        Some(id) => id,
        None => {
            let id = m.ids.next().map_err(ctx.fail("could not allocate table id"))?;
            ctx.table_id = Some(id);
            id
        }
    };
    ctx.write_meta(m.ff.as_ref(), META_OFFSET_TABLE_ID, &id.to_le_bytes())
        .map_err(ctx.fail("could not update table id"))?;
    info!(table = %ctx.name, table_id = id, "table id assigned");
    Ok(())
}

// =============================================================================
// 417 → 418
// =============================================================================

fn rebuild_transaction_file(m: &EngineMigration<'_>, ctx: &mut TableContext) -> Result<()> {
    let ff = m.ff.as_ref();
    let meta = read_meta(m, ctx)?;
    let tx_path = ctx.dir.join(TXN_FILE_NAME);
    let bytes = files::read_file(ff, &tx_path).map_err(ctx.fail("failed to read transaction file"))?;
    let version = format::read_tx_version(&bytes).map_err(ctx.fail("failed to read transaction file"))?;
    let tx = decode_tx(&bytes, version).map_err(ctx.fail("failed to read transaction file"))?;

    if !tx.is_legacy_layout() {
        // Rebuilt before a crash that preceded the version tag
        debug!(table = %ctx.name, version, "transaction file already rebuilt");
        remove_archives(ff, &ctx.dir, &meta, &tx);
        return Ok(());
    }

    let (rebuilt, removed_dirs) = fold_legacy_partitions(m, ctx, &meta, tx)?;
    let image = encode_tx(&rebuilt).map_err(ctx.fail("could not encode transaction file"))?;

    for dir in &removed_dirs {
        match ff.remove_dir_all(dir) {
            Ok(()) => info!(table = %ctx.name, partition = %dir.display(), "removed partition deleted"),
            Err(e) => warn!(table = %ctx.name, partition = %dir.display(), error = %e, "could not delete removed partition"),
        }
    }

    let tmp_path = ctx.dir.join(TXN_TMP_FILE_NAME);
    write_staged(m, &tmp_path, &image).map_err(ctx.fail("could not write transaction file"))?;
    ff.rename(&tmp_path, &tx_path)
        .map_err(|e| StrataError::io("could not rename", &tmp_path, e))
        .map_err(ctx.fail("could not replace transaction file"))?;

    remove_archives(ff, &ctx.dir, &meta, &rebuilt);
    info!(
        table = %ctx.name,
        partitions = rebuilt.partition_count(),
        rows = rebuilt.row_count(),
        "transaction file rebuilt"
    );
    Ok(())
}

/// Fold `_archive` sizes and the removed-partition list into a partition table
fn fold_legacy_partitions(
    m: &EngineMigration<'_>,
    ctx: &TableContext,
    meta: &TableMetadata,
    mut tx: TxRecord,
) -> Result<(TxRecord, Vec<PathBuf>)> {
    let ff = m.ff.as_ref();
    let removed: HashSet<i64> = tx.removed_partitions.drain(..).collect();
    let mut removed_dirs = Vec::new();

    if meta.partition_by.is_partitioned() && tx.row_count() > 0 {
        let partition_by = meta.partition_by;
        let active = partition_by
            .floor(tx.max_timestamp)
            .map_err(ctx.fail("invalid max timestamp in transaction file"))?;
        if removed.contains(&active) {
            return Err(StrataError::Migration {
                table: ctx.name.clone(),
                message: "removed partition list holds the active partition".to_string(),
                source: Box::new(StrataError::corrupt(
                    "transaction file",
                    format!("partition {} is both active and removed", active),
                )),
            });
        }

        let dirs = ff
            .list_dirs(&ctx.dir)
            .map_err(|e| StrataError::io("could not list partitions", &ctx.dir, e))
            .map_err(ctx.fail("failed to list partitions"))?;
        let mut closed: Vec<(i64, PathBuf)> = dirs
            .into_iter()
            .filter_map(|d| {
                let name = d.file_name()?.to_str()?.to_string();
                let ts = partition_by.parse_dir_name(&name).ok()?;
                Some((ts, d))
            })
            .filter(|(ts, _)| *ts < active)
            .collect();
        closed.sort_by_key(|(ts, _)| *ts);

        let mut fixed = 0i64;
        tx.partitions.clear();
        for (ts, dir) in closed {
            if removed.contains(&ts) {
                removed_dirs.push(dir);
                continue;
            }
            let rows = read_archive(ff, &dir).map_err(ctx.fail("failed to read partition size"))?;
            fixed += rows;
            tx.partitions.push(PartitionEntry {
                timestamp: ts,
                row_count: rows,
            });
        }
        tx.partitions.push(PartitionEntry {
            timestamp: active,
            row_count: tx.transient_row_count,
        });
        tx.fixed_row_count = fixed;

        let oldest = partition_by
            .floor(tx.min_timestamp)
            .map_err(ctx.fail("invalid min timestamp in transaction file"))?;
        if removed.contains(&oldest) {
            tx.min_timestamp = first_surviving_timestamp(ff, &ctx.dir, meta, &tx)
                .map_err(ctx.fail("failed to read first timestamp"))?;
            debug!(table = %ctx.name, min_timestamp = tx.min_timestamp, "min timestamp moved past removed partitions");
        }
    }

    for symbol in &mut tx.symbol_counts {
        symbol.transient_count = symbol.count;
    }
    tx.version = format::CURRENT_VERSION;
    Ok((tx, removed_dirs))
}

/// Designated timestamp of the first row of the first non-empty partition
fn first_surviving_timestamp(
    ff: &dyn files::FilesFacade,
    table_dir: &Path,
    meta: &TableMetadata,
    tx: &TxRecord,
) -> Result<i64> {
    let column = meta
        .timestamp_index
        .map(|i| &meta.columns[i].name)
        .ok_or_else(|| {
            StrataError::corrupt("table metadata file", "partitioned table has no designated timestamp")
        })?;
    let Some(first) = tx.partitions.iter().find(|p| p.row_count > 0) else {
        return Ok(i64::MAX);
    };
    let dir = table_dir.join(meta.partition_by.dir_name(first.timestamp)?);
    let fh = files::open_ro_or_fail(ff, &column_file(&dir, column))?;
    let mut buf = [0u8; 8];
    files::read_fully(ff, &fh, &mut buf, 0)?;
    Ok(i64::from_le_bytes(buf))
}

fn read_archive(ff: &dyn files::FilesFacade, partition_dir: &Path) -> Result<i64> {
    let path = partition_dir.join(ARCHIVE_FILE_NAME);
    let fh = files::open_ro_or_fail(ff, &path)?;
    let mut buf = [0u8; 8];
    files::read_fully(ff, &fh, &mut buf, 0)?;
    let rows = i64::from_le_bytes(buf);
    if rows < 0 {
        return Err(StrataError::corrupt(
            "partition archive",
            format!("{} holds negative row count {}", path.display(), rows),
        ));
    }
    Ok(rows)
}

/// Stage a full image in `path` through a column file, truncated to size
fn write_staged(m: &EngineMigration<'_>, path: &Path, image: &[u8]) -> Result<()> {
    let ff = m.ff.as_ref();
    if ff.exists(path) {
        ff.remove(path)
            .map_err(|e| StrataError::io("could not remove stale file", path, e))?;
    }
    let mut file = ColumnFile::open(m.ff.clone(), path, m.config.tx_page_size)?;
    file.put_bytes(image)?;
    file.sync(false);
    file.close(true);

    let fh = files::open_ro_or_fail(ff, path)?;
    let len = files::length_or_fail(ff, &fh)?;
    if len < image.len() as u64 {
        return Err(StrataError::io(
            format!("staged image is {} bytes, expected {}", len, image.len()),
            path,
            std::io::Error::from(std::io::ErrorKind::WriteZero),
        ));
    }
    ff.sync(&fh)
        .map_err(|e| StrataError::io("could not sync", path, e))
}

fn remove_archives(ff: &dyn files::FilesFacade, table_dir: &Path, meta: &TableMetadata, tx: &TxRecord) {
    for p in &tx.partitions {
        let Ok(name) = meta.partition_by.dir_name(p.timestamp) else {
            continue;
        };
        let path = table_dir.join(name).join(ARCHIVE_FILE_NAME);
        if ff.exists(&path) {
            if let Err(e) = ff.remove(&path) {
                warn!(path = %path.display(), error = %e, "could not remove partition archive");
            }
        }
    }
}

// =============================================================================
// 418 → 419
// =============================================================================

fn add_commit_hysteresis(m: &EngineMigration<'_>, ctx: &mut TableContext) -> Result<()> {
    let ff = m.ff.as_ref();
    ctx.write_meta(
        ff,
        META_OFFSET_MAX_UNCOMMITTED_ROWS,
        &m.config.max_uncommitted_rows.to_le_bytes(),
    )
    .map_err(ctx.fail("failed to write max uncommitted rows to table metadata file"))?;
    ctx.write_meta(
        ff,
        META_OFFSET_COMMIT_HYSTERESIS_MICROS,
        &m.config.commit_hysteresis_micros.to_le_bytes(),
    )
    .map_err(ctx.fail("failed to write commit hysteresis to table metadata file"))?;
    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn read_meta(m: &EngineMigration<'_>, ctx: &TableContext) -> Result<TableMetadata> {
    files::read_file(m.ff.as_ref(), &ctx.dir.join(META_FILE_NAME))
        .and_then(|bytes| {
            let version = format::read_meta_version(&bytes)?;
            decode_meta(&bytes, version, m.registry)
        })
        .map_err(ctx.fail("failed to read metadata file"))
}
