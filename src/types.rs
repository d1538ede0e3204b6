//! Shared types for the gem profit service.
//!
//! These types form the data model used across all modules: level tables
//! scraped from PoeDB, market listings from poe.ninja, and the derived
//! per-gem margin entries served to clients.

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Multiplier applied to price-per-experience so margins are human-scale.
pub const GAIN_MARGIN_SCALE: f64 = 1_000_000.0;

/// Column holding the experience needed to advance to the next level.
pub const EXPERIENCE_FIELD: &str = "Experience";

// ---------------------------------------------------------------------------
// Level tables
// ---------------------------------------------------------------------------

/// One level's numeric attributes for one gem (experience, requirements, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LevelRow {
    fields: BTreeMap<String, f64>,
}

impl LevelRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, handy when assembling rows by hand.
    pub fn with(mut self, field: impl Into<String>, value: f64) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: f64) {
        self.fields.insert(field.into(), value);
    }

    pub fn get(&self, field: &str) -> Option<f64> {
        self.fields.get(field).copied()
    }

    /// Experience required to go from this level to the next.
    /// A missing cell counts as zero, matching how empty table cells are read.
    pub fn experience(&self) -> f64 {
        self.get(EXPERIENCE_FIELD).unwrap_or(0.0)
    }
}

/// Ordered `level → row` mapping for a single gem.
pub type LevelTable = BTreeMap<u32, LevelRow>;

/// Total experience needed to reach `level` from level 1.
///
/// Returns `None` when `level` is not a key of the table. Levels missing
/// below `level` contribute nothing.
pub fn total_experience(table: &LevelTable, level: u32) -> Option<f64> {
    if !table.contains_key(&level) {
        return None;
    }
    Some(table.range(..level).map(|(_, row)| row.experience()).sum())
}

/// A single level lookup: the row itself plus its cumulative experience.
#[derive(Debug, Clone, PartialEq)]
pub struct LevelData {
    pub level: u32,
    pub row: LevelRow,
    pub total_experience: f64,
}

// ---------------------------------------------------------------------------
// Market listings
// ---------------------------------------------------------------------------

/// One poe.ninja `SkillGem` overview line. Only the fields we use.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingRecord {
    pub name: String,
    #[serde(default)]
    pub gem_level: u32,
    #[serde(default)]
    pub gem_quality: Option<i32>,
    /// Number of listings poe.ninja saw for this line.
    #[serde(default)]
    pub count: u32,
    #[serde(default)]
    pub chaos_value: f64,
    /// `Some(true)` excludes, `Some(false)` includes unconditionally,
    /// `None` includes when the count threshold passes.
    #[serde(default)]
    pub corrupted: Option<bool>,
}

impl ListingRecord {
    /// Minimal record, used by tests and the mock providers.
    pub fn new(name: impl Into<String>, level: u32, chaos_value: f64, count: u32) -> Self {
        Self {
            name: name.into(),
            gem_level: level,
            gem_quality: None,
            count,
            chaos_value,
            corrupted: None,
        }
    }

    pub fn with_quality(mut self, quality: i32) -> Self {
        self.gem_quality = Some(quality);
        self
    }

    pub fn with_corrupted(mut self, corrupted: bool) -> Self {
        self.corrupted = Some(corrupted);
        self
    }

    pub fn quality(&self) -> i32 {
        self.gem_quality.unwrap_or(0)
    }
}

/// Listings of one `(gem, quality)` group keyed by gem level.
pub type LevelListings = BTreeMap<u32, ListingRecord>;

/// `quality → level → record` for one gem.
pub type QualityGroups = BTreeMap<i32, LevelListings>;

// ---------------------------------------------------------------------------
// Derived margins
// ---------------------------------------------------------------------------

/// One end of a margin: a level, its price and its cumulative experience.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub price: f64,
    pub level: u32,
    #[serde(rename = "exp")]
    pub experience: f64,
}

/// Cheapest and costliest observed price points for a gem.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarginEntry {
    pub min: PricePoint,
    pub max: PricePoint,
    pub gain_margin: f64,
}

impl MarginEntry {
    pub fn experience_delta(&self) -> f64 {
        self.max.experience - self.min.experience
    }
}

impl fmt::Display for MarginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "L{} @ {:.1}c → L{} @ {:.1}c (margin {:.2})",
            self.min.level, self.min.price, self.max.level, self.max.price, self.gain_margin,
        )
    }
}

/// Derived margins for every gem with a known experience table.
pub type MarginTable = BTreeMap<String, MarginEntry>;

/// Query result: gems in rank order, serialized as a JSON object whose key
/// order follows the ranking.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RankedMargins(pub Vec<(String, MarginEntry)>);

impl RankedMargins {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(name, _)| name.as_str())
    }
}

impl Serialize for RankedMargins {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, entry) in &self.0 {
            map.serialize_entry(name, entry)?;
        }
        map.end()
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors surfaced by the profit service to its callers.
#[derive(Debug, thiserror::Error)]
pub enum ProfitError {
    #[error("Invalid query: {}", .0.join("; "))]
    InvalidQuery(Vec<String>),

    #[error("Listing snapshot unavailable: {0:#}")]
    ListingsUnavailable(anyhow::Error),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
