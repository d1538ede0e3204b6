//! Profit service: the single entry point used by the HTTP layer and CLI.
//!
//! All cache state lives in one `MarginDeriver` behind one async mutex, so
//! concurrent requests never fetch the same listing snapshot or level table
//! twice. Query parameters are validated before the lock is taken.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::margins::{demo_margins, MarginDeriver};
use super::query::{rank, ProfitQuery, RawParams};
use crate::types::{MarginTable, ProfitError, RankedMargins};

/// Point-in-time view of the service caches, served by `GET /status`.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub demo: bool,
    pub started_at: DateTime<Utc>,
    pub uptime_secs: i64,
    pub listing_gems: Option<usize>,
    pub listing_age_secs: Option<u64>,
    pub listing_refreshes: u64,
    pub margin_entries: Option<usize>,
    pub known_level_tables: usize,
    pub unknown_level_tables: usize,
    pub level_fetches: u64,
}

pub struct ProfitService {
    deriver: Mutex<MarginDeriver>,
    /// Fixed margin table served instead of live data when set.
    demo: Option<Arc<MarginTable>>,
    started_at: DateTime<Utc>,
}

impl ProfitService {
    pub fn new(deriver: MarginDeriver) -> Self {
        Self {
            deriver: Mutex::new(deriver),
            demo: None,
            started_at: Utc::now(),
        }
    }

    /// A service that answers every query from the built-in demo table and
    /// never contacts a provider.
    pub fn demo(deriver: MarginDeriver) -> Self {
        Self {
            deriver: Mutex::new(deriver),
            demo: Some(Arc::new(demo_margins())),
            started_at: Utc::now(),
        }
    }

    pub fn is_demo(&self) -> bool {
        self.demo.is_some()
    }

    /// Validate raw parameters, then rank the current margin table.
    pub async fn query(&self, params: &RawParams) -> Result<RankedMargins, ProfitError> {
        let query = ProfitQuery::parse(params).map_err(ProfitError::InvalidQuery)?;
        self.run(&query).await
    }

    /// Same as [`query`](Self::query) for parameters taken from a query string.
    pub async fn query_strings(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<RankedMargins, ProfitError> {
        let query = ProfitQuery::from_query_string(params).map_err(ProfitError::InvalidQuery)?;
        self.run(&query).await
    }

    /// Rank an already validated query.
    pub async fn run(&self, query: &ProfitQuery) -> Result<RankedMargins, ProfitError> {
        let margins = match &self.demo {
            Some(table) => Arc::clone(table),
            None => {
                let mut deriver = self.deriver.lock().await;
                deriver.margins().await.map_err(|e| {
                    warn!(error = %format!("{e:#}"), "Margin derivation failed");
                    ProfitError::ListingsUnavailable(e)
                })?
            }
        };

        let ranked = rank(&margins, query);
        debug!(
            pattern = %query.gem_name,
            candidates = margins.len(),
            returned = ranked.len(),
            "Profit query answered"
        );
        Ok(ranked)
    }

    /// Delete every persisted level table and forget cached margins.
    pub async fn clear_level_cache(&self) -> anyhow::Result<usize> {
        let mut deriver = self.deriver.lock().await;
        let removed = deriver.clear_level_cache()?;
        info!(removed, "Level table cache cleared");
        Ok(removed)
    }

    pub async fn status(&self) -> ServiceStatus {
        let deriver = self.deriver.lock().await;
        let listings = deriver.listings();
        let levels = deriver.levels();
        ServiceStatus {
            demo: self.is_demo(),
            started_at: self.started_at,
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            listing_gems: listings.last_snapshot().map(|s| s.gem_count()),
            listing_age_secs: listings.age().map(|age| age.as_secs()),
            listing_refreshes: listings.refresh_count(),
            margin_entries: match &self.demo {
                Some(table) => Some(table.len()),
                None => deriver.last_margins().map(|m| m.len()),
            },
            known_level_tables: levels.known_count() - levels.unknown_count(),
            unknown_level_tables: levels.unknown_count(),
            level_fetches: levels.fetch_count(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
