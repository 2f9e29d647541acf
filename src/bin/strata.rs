//! Strata maintenance CLI
//!
//! Migrates and inspects a storage root.

use clap::{Parser, Subcommand};
use strata::{Config, Engine};
use tracing_subscriber::{fmt, EnvFilter};

/// Strata
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Maintenance tool for a Strata storage root")]
#[command(version)]
struct Args {
    /// Storage root directory
    #[arg(short, long, default_value = "./strata_data")]
    root: String,

    /// Max uncommitted rows written to tables that predate the field
    #[arg(long, default_value = "500000")]
    max_uncommitted_rows: i32,

    /// Commit hysteresis in microseconds written to tables that predate the field
    #[arg(long, default_value = "300000000")]
    commit_hysteresis_micros: i64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring every table to the current format version
    Migrate,

    /// List tables with their row counts
    Tables,

    /// Show the metadata and partitions of a table
    Inspect {
        /// Table name
        table: String,
    },
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,strata=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = Config::builder()
        .root(&args.root)
        .max_uncommitted_rows(args.max_uncommitted_rows)
        .commit_hysteresis_micros(args.commit_hysteresis_micros)
        .build();

    // Opening migrates every table; failure leaves the root untouched past
    // the last completed step
    let engine = match Engine::open(config) {
        Ok(e) => e,
        Err(e) => {
            tracing::error!("Failed to open storage root: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(&engine, args.command) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(engine: &Engine, command: Commands) -> strata::Result<()> {
    match command {
        Commands::Migrate => {
            let report = engine.migration_report();
            if report.fast_path {
                println!("all tables already at version {}", strata::format::CURRENT_VERSION);
            } else {
                println!(
                    "scanned {} tables, migrated {}, applied {} steps",
                    report.tables_scanned, report.tables_migrated, report.steps_applied
                );
            }
        }
        Commands::Tables => {
            for name in engine.tables()? {
                let reader = engine.reader(&name)?;
                println!(
                    "{:<32} id={:<6} partition_by={:<5} rows={}",
                    name,
                    reader.metadata().table_id,
                    reader.metadata().partition_by,
                    reader.row_count()
                );
            }
        }
        Commands::Inspect { table } => {
            let reader = engine.reader(&table)?;
            let meta = reader.metadata();
            let tx = reader.tx();
            println!("table:                 {}", table);
            println!("version:               {}", meta.version);
            println!("id:                    {}", meta.table_id);
            println!("partition by:          {}", meta.partition_by);
            println!("max uncommitted rows:  {}", meta.max_uncommitted_rows);
            println!("commit hysteresis us:  {}", meta.commit_hysteresis_micros);
            println!("txn:                   {}", tx.txn);
            println!("rows:                  {} ({} fixed, {} transient)", tx.row_count(), tx.fixed_row_count, tx.transient_row_count);
            println!("columns:");
            for (i, c) in meta.columns.iter().enumerate() {
                let mut flags = Vec::new();
                if c.designated_timestamp {
                    flags.push("designated timestamp".to_string());
                }
                if c.indexed {
                    flags.push(format!("indexed, capacity {}", c.index_value_block_capacity));
                }
                println!("  {:>3} {:<24} {:<10} {}", i, c.name, c.column_type, flags.join("; "));
            }
            println!("partitions:");
            for p in reader.partitions()? {
                println!("  {:<12} rows={}", p.name, p.row_count);
            }
        }
    }
    Ok(())
}
