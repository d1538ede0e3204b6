//! Persistence layer.
//!
//! Stores scraped level tables as one JSON document per gem under a base
//! directory. Market listings are never persisted; they are cheap to refetch
//! and only the latest snapshot matters.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::LevelTable;

/// Default cache directory for level tables.
pub const DEFAULT_CACHE_DIR: &str = ".cache/gem_experience";

/// Characters that cannot appear in a file name on common filesystems.
const RESERVED_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// On-disk store of level tables, one `<gem name>.json` file per gem.
#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the cache directory if it does not exist yet.
    pub fn ensure_dir(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory {}", self.dir.display()))
    }

    /// Path of the cache file for a gem.
    pub fn path_for(&self, gem_name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(gem_name)))
    }

    /// Save a level table to its JSON file.
    pub fn save(&self, gem_name: &str, table: &LevelTable) -> Result<()> {
        self.ensure_dir()?;
        let path = self.path_for(gem_name);
        let json = serde_json::to_string_pretty(table)
            .context("Failed to serialise level table")?;

        std::fs::write(&path, &json)
            .with_context(|| format!("Failed to write level table to {}", path.display()))?;

        debug!(gem = gem_name, path = %path.display(), levels = table.len(), "Level table saved");
        Ok(())
    }

    /// Load a level table from its JSON file.
    /// Returns None if the gem has never been cached.
    pub fn load(&self, gem_name: &str) -> Result<Option<LevelTable>> {
        let path = self.path_for(gem_name);

        if !path.exists() {
            debug!(gem = gem_name, path = %path.display(), "No cached level table");
            return Ok(None);
        }

        let json = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read level table from {}", path.display()))?;

        let table: LevelTable = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse level table from {}", path.display()))?;

        info!(gem = gem_name, levels = table.len(), "Level table loaded from disk");
        Ok(Some(table))
    }

    /// Delete every cached table. Returns how many files were removed.
    pub fn clear(&self) -> Result<usize> {
        self.ensure_dir()?;
        let mut removed = 0;

        let entries = std::fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list cache directory {}", self.dir.display()))?;

        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            std::fs::remove_file(&path)
                .with_context(|| format!("Failed to delete {}", path.display()))?;
            removed += 1;
        }

        info!(dir = %self.dir.display(), removed, "Level table cache cleared");
        Ok(removed)
    }
}

/// Gem name with path-hostile characters replaced by `_`.
///
/// Not injective: names differing only in reserved characters (`A/B`,
/// `A:B`) share one file. Real gem names contain none of them.
fn file_stem(gem_name: &str) -> String {
    gem_name
        .chars()
        .map(|c| if RESERVED_CHARS.contains(&c) || c.is_control() { '_' } else { c })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LevelRow, EXPERIENCE_FIELD};

    fn temp_store() -> TableStore {
        let mut p = std::env::temp_dir();
        p.push(format!("gem_profit_test_{}", uuid::Uuid::new_v4()));
        TableStore::new(p)
    }

    fn sample_table() -> LevelTable {
        let mut t = LevelTable::new();
        t.insert(
            1,
            LevelRow::new()
                .with(EXPERIENCE_FIELD, 285_815.0)
                .with("Level Requirement", 1.0),
        );
        t.insert(
            2,
            LevelRow::new()
                .with(EXPERIENCE_FIELD, 1_928_964_826.0)
                .with("Level Requirement", 70.0),
        );
        t.insert(3, LevelRow::new().with(EXPERIENCE_FIELD, 0.1 + 0.2));
        t
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let store = temp_store();
        let table = sample_table();
        store.save("Awakened Enlighten Support", &table).unwrap();

        let loaded = store.load("Awakened Enlighten Support").unwrap();
        assert_eq!(loaded, Some(table));

        std::fs::remove_dir_all(store.dir()).unwrap();
    }

    #[test]
    fn test_load_nonexistent() {
        let store = temp_store();
        assert!(store.load("Never Cached").unwrap().is_none());
    }

    #[test]
    fn test_load_integer_level_values() {
        let store = temp_store();
        store.ensure_dir().unwrap();
        std::fs::write(
            store.path_for("Enlighten Support"),
            r#"{"1": {"Experience": 0, "Level Requirement": 1}, "2": {"Experience": 1000}}"#,
        )
        .unwrap();

        let table = store.load("Enlighten Support").unwrap().unwrap();
        assert_eq!(table[&1].get("Level Requirement"), Some(1.0));
        assert_eq!(table[&2].experience(), 1000.0);

        std::fs::remove_dir_all(store.dir()).unwrap();
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let store = temp_store();
        store.ensure_dir().unwrap();
        std::fs::write(store.path_for("Broken"), "not json").unwrap();
        assert!(store.load("Broken").is_err());
        std::fs::remove_dir_all(store.dir()).unwrap();
    }

    #[test]
    fn test_clear_removes_only_json() {
        let store = temp_store();
        store.save("A", &sample_table()).unwrap();
        store.save("B", &sample_table()).unwrap();
        std::fs::write(store.dir().join("notes.txt"), "keep me").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.load("A").unwrap().is_none());
        assert!(store.dir().join("notes.txt").exists());

        std::fs::remove_dir_all(store.dir()).unwrap();
    }

    #[test]
    fn test_path_sanitises_reserved_characters() {
        let store = TableStore::new("/tmp/cache");
        let path = store.path_for("Weird/Name: 1?");
        assert_eq!(path, PathBuf::from("/tmp/cache/Weird_Name_ 1_.json"));
    }

    #[test]
    fn test_reserved_characters_collapse_to_one_file() {
        let store = TableStore::new("/tmp/cache");
        assert_eq!(store.path_for("A/B"), store.path_for("A:B"));
        assert_ne!(store.path_for("A/B"), store.path_for("A B"));
    }
}
