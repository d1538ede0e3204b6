//! Mock providers for integration testing.
//!
//! Deterministic `ListingSource` and `LevelTableSource` implementations that
//! serve known data from memory, count their calls, and can be forced to
//! fail. No network access.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gem_profit::data::{LevelTableSource, ListingSource};
use gem_profit::types::{LevelRow, LevelTable, ListingRecord, EXPERIENCE_FIELD};

/// A mock poe.ninja feed. Records can be swapped between refreshes.
pub struct MockListings {
    records: Arc<Mutex<Vec<ListingRecord>>>,
    fetches: Arc<Mutex<usize>>,
    /// If set, every fetch returns this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockListings {
    pub fn new() -> Self {
        Self::with_records(Self::default_records())
    }

    pub fn with_records(records: Vec<ListingRecord>) -> Self {
        Self {
            records: Arc::new(Mutex::new(records)),
            fetches: Arc::new(Mutex::new(0)),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_records(&self, records: Vec<ListingRecord>) {
        *self.records.lock().unwrap() = records;
    }

    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn clear_error(&self) {
        *self.force_error.lock().unwrap() = None;
    }

    pub fn fetch_count(&self) -> usize {
        *self.fetches.lock().unwrap()
    }

    /// Three gems with usable listings, plus lines the snapshot filter drops.
    pub fn default_records() -> Vec<ListingRecord> {
        vec![
            // Enlighten: L1 @ 100c → L3 @ 900c
            ListingRecord::new("Enlighten Support", 1, 100.0, 40).with_quality(0),
            ListingRecord::new("Enlighten Support", 2, 400.0, 12).with_quality(0),
            ListingRecord::new("Enlighten Support", 3, 900.0, 8).with_quality(0),
            // Empower: L1 @ 50c → L3 @ 300c
            ListingRecord::new("Empower Support", 1, 50.0, 30).with_quality(0),
            ListingRecord::new("Empower Support", 3, 300.0, 9).with_quality(0),
            // Variant prefix and level/quality suffix fold into the base name
            ListingRecord::new("Anomalous Spark 1/20", 1, 2.0, 100).with_quality(20),
            ListingRecord::new("Anomalous Spark 20/20", 20, 30.0, 100).with_quality(20),
            // Dropped: corrupted
            ListingRecord::new("Empower Support", 4, 5000.0, 50)
                .with_quality(0)
                .with_corrupted(true),
            // Dropped: too few observations
            ListingRecord::new("Enlighten Support", 4, 9000.0, 1).with_quality(0),
            // No level table exists for this gem
            ListingRecord::new("Unreleased Gem", 1, 1.0, 10).with_quality(0),
            ListingRecord::new("Unreleased Gem", 2, 9.0, 10).with_quality(0),
        ]
    }
}

#[async_trait]
impl ListingSource for MockListings {
    async fn fetch_listings(&self) -> Result<Vec<ListingRecord>> {
        *self.fetches.lock().unwrap() += 1;
        if let Some(msg) = self.force_error.lock().unwrap().clone() {
            return Err(anyhow!(msg));
        }
        Ok(self.records.lock().unwrap().clone())
    }

    fn name(&self) -> &str {
        "mock-ninja"
    }
}

/// A mock PoeDB. Unknown gems fail like a missing page would.
pub struct MockLevels {
    tables: HashMap<String, LevelTable>,
    fetches: Arc<Mutex<Vec<String>>>,
}

impl MockLevels {
    pub fn new() -> Self {
        let mut tables = HashMap::new();
        tables.insert("Enlighten Support".to_string(), flat_table(3, 1_000_000.0));
        tables.insert("Empower Support".to_string(), flat_table(4, 500_000.0));
        tables.insert("Spark".to_string(), flat_table(20, 100_000.0));
        Self {
            tables,
            fetches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Gem names requested so far, in order.
    pub fn fetched(&self) -> Vec<String> {
        self.fetches.lock().unwrap().clone()
    }
}

#[async_trait]
impl LevelTableSource for MockLevels {
    async fn fetch_level_table(&self, gem_name: &str) -> Result<LevelTable> {
        self.fetches.lock().unwrap().push(gem_name.to_string());
        self.tables
            .get(gem_name)
            .cloned()
            .ok_or_else(|| anyhow!("404 Not Found: {gem_name}"))
    }
}

/// Levels `1..=max_level`, each costing `per_level` experience.
pub fn flat_table(max_level: u32, per_level: f64) -> LevelTable {
    (1..=max_level)
        .map(|level| (level, LevelRow::new().with(EXPERIENCE_FIELD, per_level)))
        .collect()
}
