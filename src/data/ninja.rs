//! poe.ninja market listings.
//!
//! Reads the skill gem item overview for one league. Every line is one
//! `(gem, level, quality, corrupted)` price observation.
//!
//! API: `https://poe.ninja/api/data/itemoverview?league=..&type=SkillGem`
//! Auth: None required.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::ListingSource;
use crate::types::ListingRecord;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

pub const DEFAULT_BASE_URL: &str = "https://poe.ninja/api/data/itemoverview";
pub const DEFAULT_LEAGUE: &str = "Crucible";
const PROVIDER_NAME: &str = "poe.ninja";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ItemOverview {
    #[serde(default)]
    lines: Vec<ListingRecord>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct PoeNinjaClient {
    http: Client,
    base_url: String,
    league: String,
}

impl PoeNinjaClient {
    pub fn new(base_url: impl Into<String>, league: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("gem-profit/0.1.0")
            .build()
            .context("Failed to build HTTP client for poe.ninja")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            league: league.into(),
        })
    }

    pub fn league(&self) -> &str {
        &self.league
    }

    fn overview_url(&self) -> String {
        format!(
            "{}?league={}&type=SkillGem&language=en",
            self.base_url,
            urlencoding::encode(&self.league),
        )
    }
}

#[async_trait]
impl ListingSource for PoeNinjaClient {
    async fn fetch_listings(&self) -> Result<Vec<ListingRecord>> {
        let url = self.overview_url();
        info!(league = %self.league, "Fetching poe.ninja gem listings");
        debug!(url = %url, "poe.ninja request");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .context("poe.ninja request failed")?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("poe.ninja API error {status}: {body}");
        }

        let overview: ItemOverview = resp
            .json()
            .await
            .context("Failed to parse poe.ninja item overview")?;

        info!(lines = overview.lines.len(), "Fetched gem listings from poe.ninja");
        Ok(overview.lines)
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
