//! Listing snapshot cache.
//!
//! Holds the latest poe.ninja snapshot, filtered and grouped as
//! `gem name → quality → level → listing`. The whole snapshot is rebuilt on
//! every refresh. A failed refresh is reported to the caller and the
//! previous snapshot stays in place for the next attempt.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::cache::TtlSlot;
use crate::data::ListingSource;
use crate::types::{ListingRecord, QualityGroups};

/// Default lifetime of a listing snapshot.
pub const DEFAULT_SNAPSHOT_TTL: Duration = Duration::from_secs(30 * 60);

/// Lines seen this many times or fewer are too thin to trust.
const MIN_LISTING_COUNT: u32 = 2;

/// Alternate-quality prefixes, stripped in this order.
pub const QUALITY_PREFIXES: &[&str] = &["Anomalous ", "Divergent ", "Phantasmal "];

// ---------------------------------------------------------------------------
// Name normalisation and filtering
// ---------------------------------------------------------------------------

/// Strip quality-variant prefixes and a trailing ` <level>/<quality>...`
/// annotation, e.g. `"Anomalous Swift Affliction 20/20c"` → `"Swift Affliction"`.
pub fn normalize_gem_name(name: &str) -> String {
    let mut base = name;
    for prefix in QUALITY_PREFIXES {
        if let Some(rest) = base.strip_prefix(prefix) {
            base = rest;
        }
    }
    strip_level_quality_suffix(base).to_string()
}

fn strip_level_quality_suffix(name: &str) -> &str {
    for (idx, _) in name.match_indices(' ') {
        if starts_with_fraction(&name[idx + 1..]) {
            return &name[..idx];
        }
    }
    name
}

/// `<digits>/<digit>` at the start of `s`.
fn starts_with_fraction(s: &str) -> bool {
    let digits = s.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return false;
    }
    s[digits..]
        .strip_prefix('/')
        .and_then(|rest| rest.bytes().next())
        .is_some_and(|b| b.is_ascii_digit())
}

/// Corrupted lines are dropped; lines explicitly marked uncorrupted are kept;
/// unmarked lines need more than `MIN_LISTING_COUNT` observations.
fn is_usable(record: &ListingRecord) -> bool {
    match record.corrupted {
        Some(true) => false,
        Some(false) => true,
        None => record.count > MIN_LISTING_COUNT,
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// One filtered, grouped market snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListingSnapshot {
    groups: BTreeMap<String, QualityGroups>,
}

impl ListingSnapshot {
    /// Filter, normalise and group raw listing lines.
    /// A later line for the same `(name, quality, level)` replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = ListingRecord>) -> Self {
        let mut groups: BTreeMap<String, QualityGroups> = BTreeMap::new();

        for mut record in records.into_iter().filter(is_usable) {
            record.name = normalize_gem_name(&record.name);
            let quality = record.quality();
            record.gem_quality = Some(quality);

            groups
                .entry(record.name.clone())
                .or_default()
                .entry(quality)
                .or_default()
                .insert(record.gem_level, record);
        }

        Self { groups }
    }

    pub fn groups(&self) -> &BTreeMap<String, QualityGroups> {
        &self.groups
    }

    pub fn gem(&self, name: &str) -> Option<&QualityGroups> {
        self.groups.get(name)
    }

    pub fn gem_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of listing records kept after filtering.
    pub fn listing_count(&self) -> usize {
        self.groups
            .values()
            .flat_map(|qualities| qualities.values())
            .map(|levels| levels.len())
            .sum()
    }
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub struct ListingSnapshotCache {
    source: Arc<dyn ListingSource>,
    slot: TtlSlot<ListingSnapshot>,
    refreshes: u64,
}

impl ListingSnapshotCache {
    pub fn new(source: Arc<dyn ListingSource>, ttl: Duration) -> Self {
        Self {
            source,
            slot: TtlSlot::new(ttl),
            refreshes: 0,
        }
    }

    /// Current grouped snapshot, refreshed from the source once the TTL lapses.
    pub async fn snapshot(&mut self) -> Result<Arc<ListingSnapshot>> {
        if let Some(snapshot) = self.slot.fresh() {
            debug!(gems = snapshot.gem_count(), "Listing snapshot cache hit");
            return Ok(snapshot);
        }

        let records = self
            .source
            .fetch_listings()
            .await
            .with_context(|| format!("Failed to fetch listings from {}", self.source.name()))?;

        let raw = records.len();
        let snapshot = ListingSnapshot::from_records(records);
        self.refreshes += 1;

        info!(
            source = self.source.name(),
            raw,
            kept = snapshot.listing_count(),
            gems = snapshot.gem_count(),
            "Listing snapshot refreshed"
        );
        Ok(self.slot.install(snapshot))
    }

    /// Latest snapshot regardless of age, without contacting the source.
    pub fn last_snapshot(&self) -> Option<Arc<ListingSnapshot>> {
        self.slot.current()
    }

    pub fn age(&self) -> Option<Duration> {
        self.slot.age()
    }

    pub fn refresh_count(&self) -> u64 {
        self.refreshes
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
