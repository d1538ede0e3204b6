//! External data providers.
//!
//! Defines the provider traits the caches depend on and the concrete
//! implementations for:
//! - PoeDB: per-gem level/experience tables (HTML scrape)
//! - poe.ninja: market listing snapshot for skill gems (JSON API)

pub mod ninja;
pub mod poedb;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{LevelTable, ListingRecord};

/// Source of per-gem level tables.
///
/// Any failure (network, missing section, unparsable table) is an error;
/// the level cache turns it into a standing "unknown gem" entry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LevelTableSource: Send + Sync {
    async fn fetch_level_table(&self, gem_name: &str) -> Result<LevelTable>;
}

/// Source of the current market listing snapshot.
#[async_trait]
pub trait ListingSource: Send + Sync {
    /// Fetch every listing line of the current snapshot, unfiltered.
    async fn fetch_listings(&self) -> Result<Vec<ListingRecord>>;

    /// Provider name for logging.
    fn name(&self) -> &str;
}
