//! PoeDB level table scraper.
//!
//! Each gem page on PoeDB carries a "Level Effect" card whose table lists,
//! per gem level, the experience needed for the next level together with
//! requirements and stat values. We read that table into a `LevelTable`.
//!
//! Page: `https://poedb.tw/us/{Gem_Name_With_Underscores}`
//! Auth: None required. Be polite: the level cache paces requests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info};

use super::LevelTableSource;
use crate::types::{LevelRow, LevelTable};

pub const DEFAULT_BASE_URL: &str = "https://poedb.tw/us";

const SECTION_HEADER: &str = ".tab-pane>.card>.card-header";
const SECTION_TITLE: &str = "Level Effect";
const LEVEL_COLUMN: &str = "Level";

pub struct PoeDbScraper {
    http: Client,
    base_url: String,
}

impl PoeDbScraper {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("gem-profit/0.1.0")
            .build()
            .context("Failed to build HTTP client for PoeDB")?;

        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn page_url(&self, gem_name: &str) -> String {
        let slug = gem_name.replace(' ', "_");
        format!("{}/{}", self.base_url, urlencoding::encode(&slug))
    }
}

#[async_trait]
impl LevelTableSource for PoeDbScraper {
    async fn fetch_level_table(&self, gem_name: &str) -> Result<LevelTable> {
        let url = self.page_url(gem_name);
        info!(gem = gem_name, url = %url, "Fetching gem level table");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .with_context(|| format!("PoeDB request failed for {gem_name}"))?;

        if !resp.status().is_success() {
            anyhow::bail!("PoeDB returned {} for {gem_name}", resp.status());
        }

        let html = resp.text().await.context("Failed to read PoeDB page body")?;
        let table = parse_level_table(&html)
            .with_context(|| format!("Failed to parse level table for {gem_name}"))?;

        info!(gem = gem_name, levels = table.len(), "Fetched gem level table");
        Ok(table)
    }
}

// ---------------------------------------------------------------------------
// HTML parsing
// ---------------------------------------------------------------------------

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow::anyhow!("Invalid selector {css}: {e:?}"))
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().trim().to_string()
}

/// Numeric cell value. Empty cells read as zero; text cells are not numeric.
fn parse_number(text: &str) -> Option<f64> {
    let cleaned: String = text.chars().filter(|c| *c != ',').collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Some(0.0);
    }
    cleaned.parse().ok()
}

/// Extract the "Level Effect" table from a PoeDB gem page.
pub fn parse_level_table(html: &str) -> Result<LevelTable> {
    let document = Html::parse_document(html);

    let header = document
        .select(&selector(SECTION_HEADER)?)
        .find(|h| cell_text(*h).starts_with(SECTION_TITLE))
        .context("Page has no Level Effect section")?;

    let container = header
        .next_siblings()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "div" && e.value().classes().any(|c| c == "table-responsive"))
        .context("Level Effect section has no table container")?;

    let table = container
        .select(&selector("table")?)
        .next()
        .context("Level Effect container has no table")?;

    let row_sel = selector("tr")?;
    let th_sel = selector("th")?;
    let td_sel = selector("td")?;

    let mut columns: Vec<String> = Vec::new();
    let mut levels = LevelTable::new();

    for row in table.select(&row_sel) {
        if columns.is_empty() {
            columns = row.select(&th_sel).map(cell_text).collect();
            continue;
        }

        let cells: Vec<String> = row.select(&td_sel).map(cell_text).collect();
        if cells.is_empty() {
            continue;
        }

        let level_idx = columns
            .iter()
            .position(|c| c == LEVEL_COLUMN)
            .context("Level Effect table has no Level column")?;

        let Some(level) = cells.get(level_idx).and_then(|c| c.parse::<u32>().ok()) else {
            debug!(row = ?cells, "Skipping row without a numeric level");
            continue;
        };

        let mut level_row = LevelRow::new();
        for (idx, (column, value)) in columns.iter().zip(&cells).enumerate() {
            if idx == level_idx {
                continue;
            }
            if let Some(number) = parse_number(value) {
                level_row.insert(column.clone(), number);
            }
        }
        levels.insert(level, level_row);
    }

    if levels.is_empty() {
        anyhow::bail!("Level Effect table has no level rows");
    }
    Ok(levels)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
