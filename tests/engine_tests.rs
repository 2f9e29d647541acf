//! Tests for Engine
//!
//! These tests verify:
//! - Engine lifecycle (open creates the root, reopen)
//! - Configuration validation
//! - Table ids across threads and restarts
//! - Concurrent readers over one table

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

use common::*;
use strata::format::{CURRENT_VERSION, TABLE_INDEX_FILE_NAME, UPGRADE_FILE_NAME};
use strata::{Config, Engine, StrataError};

// =============================================================================
// Lifecycle Tests
// =============================================================================

#[test]
fn test_engine_open_creates_root() {
    let (_temp, root) = temp_root();
    let engine = open_engine(&root);

    assert!(root.exists());
    assert!(root.join(TABLE_INDEX_FILE_NAME).exists());
    assert_eq!(
        std::fs::read(root.join(UPGRADE_FILE_NAME)).unwrap(),
        CURRENT_VERSION.to_le_bytes().to_vec()
    );

    let report = engine.migration_report();
    assert!(!report.fast_path);
    assert_eq!(report.tables_scanned, 0);
    assert!(engine.tables().unwrap().is_empty());
}

#[test]
fn test_engine_reopen_keeps_tables() {
    let (_temp, root) = temp_root();
    {
        let engine = open_engine(&root);
        engine.create_table(&weather_model("weather")).unwrap();
        fill_weather(&engine, "weather", 48);
    }

    let engine = open_engine(&root);
    assert!(engine.migration_report().fast_path);
    assert_eq!(engine.tables().unwrap(), vec!["weather"]);
    assert_eq!(
        engine.reader("weather").unwrap().sum_long("x").unwrap(),
        weather_sum(0, 48)
    );
}

#[test]
fn test_open_path_uses_defaults() {
    let (_temp, root) = temp_root();
    let engine = Engine::open_path(&root).unwrap();
    let config = engine.config();

    assert_eq!(config.root, root);
    assert_eq!(config.column_page_size, Config::default().column_page_size);
    assert_eq!(config.max_uncommitted_rows, 500_000);
    assert_eq!(config.commit_hysteresis_micros, 300_000_000);
}

#[test]
fn test_migrate_on_open_engine_is_a_noop() {
    let (_temp, root) = temp_root();
    let engine = open_engine(&root);
    engine.create_table(&weather_model("weather")).unwrap();

    assert!(engine.migrate(CURRENT_VERSION).unwrap().fast_path);
    assert!(engine.migrate(415).is_err());
}

// =============================================================================
// Configuration Tests
// =============================================================================

#[test]
fn test_invalid_config_rejected() {
    let (_temp, root) = temp_root();
    let invalid = [
        Config::builder().root(&root).column_page_size(1000).build(),
        Config::builder().root(&root).column_page_size(2048).build(),
        Config::builder().root(&root).tx_page_size(3 * 4096).build(),
        Config::builder().root(&root).max_uncommitted_rows(-1).build(),
        Config::builder().root(&root).commit_hysteresis_micros(-5).build(),
    ];
    for config in invalid {
        assert!(matches!(Engine::open(config), Err(StrataError::Config(_))));
    }
    // Validation happens before anything is created
    assert!(!root.exists());
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_table_ids_unique_across_threads() {
    let (_temp, root) = temp_root();
    let engine = Arc::new(open_engine(&root));

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || {
                let mut ids: Vec<i32> = (0..25).map(|_| engine.next_table_id().unwrap()).collect();
                let name = format!("t{}", t);
                engine.create_table(&weather_model(&name)).unwrap();
                ids.push(engine.reader(&name).unwrap().metadata().table_id);
                ids
            })
        })
        .collect();

    let mut ids = HashSet::new();
    for handle in handles {
        for id in handle.join().unwrap() {
            assert!(ids.insert(id), "duplicate id {}", id);
        }
    }
    assert_eq!(ids.len(), 104);
    assert_eq!(*ids.iter().max().unwrap(), 104);

    drop(engine);
    let engine = open_engine(&root);
    assert_eq!(engine.next_table_id().unwrap(), 105);
}

#[test]
fn test_concurrent_readers() {
    let (_temp, root) = temp_root();
    let engine = Arc::new(open_engine(&root));
    engine.create_table(&weather_model("weather")).unwrap();
    fill_weather(&engine, "weather", 200);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            thread::spawn(move || engine.reader("weather").unwrap().sum_long("x").unwrap())
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.join().unwrap(), weather_sum(0, 200));
    }
}
