//! Engine Module
//!
//! Owns a storage root and everything shared by its tables.
//!
//! ## Responsibilities
//! - Create the root and the table id counter
//! - Migrate every table to the current format before serving any
//! - Create tables and open writers and readers over them

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::column_type::TypeRegistry;
use crate::config::Config;
use crate::error::{Result, StrataError};
use crate::files::{FilesFacade, StdFilesFacade};
use crate::format::{CURRENT_VERSION, META_FILE_NAME};
use crate::migration::{EngineMigration, MigrationReport};
use crate::table::{self, TableIdGenerator, TableModel, TableReader, TableWriter};

/// A storage root with all tables at the current format version
///
/// ## Concurrency Model
///
/// - The engine itself is `Send + Sync`; the table id counter is guarded
///   by its own mutex
/// - Writers and readers are independent values; at most one writer per
///   table may exist at a time, readers are unrestricted
pub struct Engine {
    config: Config,
    ff: Arc<dyn FilesFacade>,
    registry: TypeRegistry,
    ids: TableIdGenerator,
    /// Result of the migration run at open
    report: MigrationReport,
}

impl Engine {
    /// Open a storage root with the default file system
    pub fn open(config: Config) -> Result<Self> {
        Self::open_with(config, Arc::new(StdFilesFacade::new()))
    }

    /// Open a storage root through `ff`
    ///
    /// On startup:
    /// 1. Validate config and create the root directory
    /// 2. Open the table id counter
    /// 3. Migrate every table to the current version; any failure is fatal
    pub fn open_with(config: Config, ff: Arc<dyn FilesFacade>) -> Result<Self> {
        // Step 1: Validate and create the root
        config.validate()?;
        ff.mkdirs(&config.root)
            .map_err(|e| StrataError::io("could not create root directory", &config.root, e))?;

        // Step 2: Table ids
        let registry = TypeRegistry::new();
        let ids = TableIdGenerator::open(ff.clone(), &config.root)?;

        // Step 3: Migrate
        let report = EngineMigration::new(ff.clone(), &config, &registry, &ids)
            .migrate_engine_to(CURRENT_VERSION)?;

        info!(root = %config.root.display(), version = CURRENT_VERSION, "engine opened");
        Ok(Self {
            config,
            ff,
            registry,
            ids,
            report,
        })
    }

    /// Open with a path (convenience method)
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open(Config::builder().root(path).build())
    }

    /// Run migration again, e.g. after tables were copied into the root
    pub fn migrate(&self, target: i32) -> Result<MigrationReport> {
        EngineMigration::new(self.ff.clone(), &self.config, &self.registry, &self.ids)
            .migrate_engine_to(target)
    }

    /// Create a table at the current version, filling unset table
    /// defaults from config
    pub fn create_table(&self, model: &TableModel) -> Result<PathBuf> {
        let model = model.clone().with_defaults(
            self.config.max_uncommitted_rows,
            self.config.commit_hysteresis_micros,
        );
        let id = self.ids.next()?;
        table::create_table(
            self.ff.as_ref(),
            &self.config.root,
            &model,
            &self.registry,
            CURRENT_VERSION,
            id,
        )
    }

    pub fn writer(&self, table: &str) -> Result<TableWriter> {
        TableWriter::open(
            self.ff.clone(),
            &self.table_dir(table)?,
            &self.registry,
            self.config.column_page_size,
        )
    }

    pub fn reader(&self, table: &str) -> Result<TableReader> {
        TableReader::open(
            self.ff.clone(),
            &self.table_dir(table)?,
            &self.registry,
            self.config.column_page_size,
        )
    }

    /// Names of all tables under the root, sorted
    pub fn tables(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = table::list_tables(self.ff.as_ref(), &self.config.root)?
            .iter()
            .map(|d| table::table_name(d))
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn next_table_id(&self) -> Result<i32> {
        self.ids.next()
    }

    fn table_dir(&self, table: &str) -> Result<PathBuf> {
        let dir = self.config.root.join(table);
        if !self.ff.exists(&dir.join(META_FILE_NAME)) {
            return Err(StrataError::TableNotFound(table.to_string()));
        }
        Ok(dir)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn files(&self) -> &Arc<dyn FilesFacade> {
        &self.ff
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn migration_report(&self) -> &MigrationReport {
        &self.report
    }
}
