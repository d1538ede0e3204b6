//! Margin derivation.
//!
//! Joins the listing snapshot with level tables: for every gem, the
//! cheapest and costliest observed levels are located, their cumulative
//! experience is looked up, and the price gained per million experience
//! becomes the gem's gain margin. The derived table is cached briefly on
//! top of the much longer-lived listing snapshot.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::cache::TtlSlot;
use super::levels::LevelTableCache;
use super::listings::{ListingSnapshot, ListingSnapshotCache};
use crate::types::{LevelListings, MarginEntry, MarginTable, PricePoint, GAIN_MARGIN_SCALE};

/// Default lifetime of the derived margin table.
pub const DEFAULT_MARGIN_TTL: Duration = Duration::from_secs(30);

/// Price gained per `GAIN_MARGIN_SCALE` experience between two price points.
///
/// Zero when both ends are the same level or the experience delta is zero.
pub fn gain_margin(min: &PricePoint, max: &PricePoint) -> f64 {
    let delta_exp = max.experience - min.experience;
    if min.level == max.level || delta_exp == 0.0 {
        return 0.0;
    }
    (max.price - min.price) * GAIN_MARGIN_SCALE / delta_exp
}

/// `(level, price)` of the cheapest and the costliest listing, starting
/// from `seed` when one is given. On equal prices the later level wins.
pub fn price_extremes(
    listings: &LevelListings,
    seed: Option<((u32, f64), (u32, f64))>,
) -> Option<((u32, f64), (u32, f64))> {
    listings
        .iter()
        .map(|(level, record)| (*level, record.chaos_value))
        .fold(seed, |extremes, point| match extremes {
            None => Some((point, point)),
            Some((min, max)) => Some((
                if point.1 <= min.1 { point } else { min },
                if point.1 >= max.1 { point } else { max },
            )),
        })
}

pub struct MarginDeriver {
    listings: ListingSnapshotCache,
    levels: LevelTableCache,
    slot: TtlSlot<MarginTable>,
}

impl MarginDeriver {
    pub fn new(listings: ListingSnapshotCache, levels: LevelTableCache, ttl: Duration) -> Self {
        Self {
            listings,
            levels,
            slot: TtlSlot::new(ttl),
        }
    }

    /// Derived margins for every gem with known experience data.
    ///
    /// Fails only when the listing snapshot cannot be obtained.
    pub async fn margins(&mut self) -> Result<Arc<MarginTable>> {
        if let Some(margins) = self.slot.fresh() {
            debug!(entries = margins.len(), "Margin cache hit");
            return Ok(margins);
        }

        let snapshot = self.listings.snapshot().await?;
        let margins = derive_margins(&snapshot, &mut self.levels).await;

        info!(
            gems = snapshot.gem_count(),
            entries = margins.len(),
            dropped = snapshot.gem_count() - margins.len(),
            "Margins derived"
        );
        Ok(self.slot.install(margins))
    }

    /// Last derived table regardless of age.
    pub fn last_margins(&self) -> Option<Arc<MarginTable>> {
        self.slot.current()
    }

    /// Clear the level table cache and force the next call to re-derive.
    pub fn clear_level_cache(&mut self) -> Result<usize> {
        let removed = self.levels.clear()?;
        self.slot.invalidate();
        Ok(removed)
    }

    pub fn levels(&self) -> &LevelTableCache {
        &self.levels
    }

    pub fn listings(&self) -> &ListingSnapshotCache {
        &self.listings
    }
}

/// Build a margin entry per gem. Quality groups are processed in ascending
/// order; each group's scan starts from the extremes found so far, and its
/// entry replaces the earlier one. A gem whose experience lookup comes back
/// empty is left out entirely.
async fn derive_margins(snapshot: &ListingSnapshot, levels: &mut LevelTableCache) -> MarginTable {
    let mut margins = MarginTable::new();

    'gems: for (name, qualities) in snapshot.groups() {
        for (quality, listings) in qualities {
            let seed = margins
                .get(name)
                .map(|e| ((e.min.level, e.min.price), (e.max.level, e.max.price)));
            let Some(((min_level, min_price), (max_level, max_price))) =
                price_extremes(listings, seed)
            else {
                continue;
            };

            let min_data = levels.level_data(name, min_level).await;
            let max_data = match min_data {
                Some(_) => levels.level_data(name, max_level).await,
                None => None,
            };
            let (Some(min_data), Some(max_data)) = (min_data, max_data) else {
                debug!(gem = %name, quality, min_level, max_level, "No experience data, gem skipped");
                margins.remove(name);
                continue 'gems;
            };

            let min = PricePoint {
                price: min_price,
                level: min_level,
                experience: min_data.total_experience,
            };
            let max = PricePoint {
                price: max_price,
                level: max_level,
                experience: max_data.total_experience,
            };
            margins.insert(
                name.clone(),
                MarginEntry {
                    min,
                    max,
                    gain_margin: gain_margin(&min, &max),
                },
            );
        }
    }

    margins
}

/// Fixed margin table served in demo mode.
pub fn demo_margins() -> MarginTable {
    let entry = |min: (f64, u32, f64), max: (f64, u32, f64), gain_margin: f64| MarginEntry {
        min: PricePoint { price: min.0, level: min.1, experience: min.2 },
        max: PricePoint { price: max.0, level: max.1, experience: max.2 },
        gain_margin,
    };

    [
        (
            "Awakened Added Chaos Damage Support",
            entry((400.0, 1, 0.0), (800.0, 5, 3_550_000_000.0), 3_550_000_000.0),
        ),
        (
            "Divergent Inspiration Support",
            entry((100.0, 1, 0.0), (300.0, 20, 550_000_000.0), 550_000_000.0),
        ),
        (
            "Enlighten Support",
            entry((140.0, 1, 0.0), (400.0, 3, 2_625_000_000.0), 2_625_000_000.0),
        ),
        (
            "Divergent Cast when Damage Taken Support",
            entry((20.0, 2, 1_234_500.0), (340.0, 19, 550_000_000.0), 548_765_500.0),
        ),
    ]
    .into_iter()
    .map(|(name, entry)| (name.to_string(), entry))
    .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
