//! Level table cache.
//!
//! Resolves a gem's level table through three tiers: the in-memory index,
//! the on-disk JSON store, and finally the (paced) level table source.
//! Every gem is fetched at most once per process: a failed fetch is
//! remembered as "unknown" and never retried until the cache is cleared.

use anyhow::Result;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::cache::Pacer;
use crate::data::LevelTableSource;
use crate::storage::TableStore;
use crate::types::{total_experience, LevelData, LevelTable};

/// Default minimum gap between two PoeDB requests.
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(1);

pub struct LevelTableCache {
    source: Arc<dyn LevelTableSource>,
    store: TableStore,
    /// `None` marks a gem whose fetch failed in this process.
    known: HashMap<String, Option<Arc<LevelTable>>>,
    pacer: Pacer,
    fetches: u64,
}

impl LevelTableCache {
    /// Create the cache, making sure the cache directory exists.
    ///
    /// Failing to create the directory is fatal: nothing can be persisted.
    pub fn new(
        source: Arc<dyn LevelTableSource>,
        cache_dir: impl Into<PathBuf>,
        fetch_interval: Duration,
    ) -> Result<Self> {
        let store = TableStore::new(cache_dir);
        store.ensure_dir()?;
        Ok(Self {
            source,
            store,
            known: HashMap::new(),
            pacer: Pacer::new(fetch_interval),
            fetches: 0,
        })
    }

    /// Full level table for a gem, or `None` if it cannot be obtained.
    pub async fn level_table(&mut self, gem_name: &str) -> Option<Arc<LevelTable>> {
        if let Some(entry) = self.known.get(gem_name) {
            debug!(gem = gem_name, known = entry.is_some(), "Level table index hit");
            return entry.clone();
        }

        match self.store.load(gem_name) {
            Ok(Some(table)) => {
                let table = Arc::new(table);
                self.known.insert(gem_name.to_string(), Some(Arc::clone(&table)));
                return Some(table);
            }
            Ok(None) => {}
            Err(e) => {
                warn!(gem = gem_name, error = %e, "Ignoring unreadable cached level table");
            }
        }

        let entry = self.fetch(gem_name).await;
        self.known.insert(gem_name.to_string(), entry.clone());
        entry
    }

    /// One level of a gem's table plus the experience needed to reach it.
    pub async fn level_data(&mut self, gem_name: &str, level: u32) -> Option<LevelData> {
        let table = self.level_table(gem_name).await?;
        let row = table.get(&level)?.clone();
        let total_experience = total_experience(&table, level)?;
        Some(LevelData {
            level,
            row,
            total_experience,
        })
    }

    /// Drop every persisted table and the in-memory index, including
    /// remembered failures. Returns the number of files removed.
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self.store.clear()?;
        self.known.clear();
        Ok(removed)
    }

    /// Number of gems resolved so far (successes and failures).
    pub fn known_count(&self) -> usize {
        self.known.len()
    }

    /// Number of gems whose fetch failed in this process.
    pub fn unknown_count(&self) -> usize {
        self.known.values().filter(|e| e.is_none()).count()
    }

    /// Outbound fetches made by this cache instance.
    pub fn fetch_count(&self) -> u64 {
        self.fetches
    }

    async fn fetch(&mut self, gem_name: &str) -> Option<Arc<LevelTable>> {
        self.pacer.pace().await;
        self.fetches += 1;

        let table = match self.source.fetch_level_table(gem_name).await {
            Ok(table) => table,
            Err(e) => {
                warn!(gem = gem_name, error = %format!("{e:#}"), "Level table fetch failed, gem marked unknown");
                return None;
            }
        };

        if let Err(e) = self.store.save(gem_name, &table) {
            warn!(gem = gem_name, error = %e, "Failed to persist level table");
        }
        info!(gem = gem_name, levels = table.len(), "Level table cached");
        Some(Arc::new(table))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
