//! GEM PROFIT: gem levelling profit estimator
//!
//! Entry point. Loads configuration, initialises structured logging, wires
//! the PoeDB and poe.ninja providers into the profit service, then runs the
//! requested command:
//!
//! - `gem-profit [serve]` starts the HTTP API
//! - `gem-profit query [key=value ...]` runs one query and prints the result
//! - `gem-profit clear-cache` removes persisted level tables

use anyhow::{bail, Result};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use gem_profit::api::{self, routes::ApiState, routes::DataResponse};
use gem_profit::config::{self, AppConfig};
use gem_profit::data::ninja::PoeNinjaClient;
use gem_profit::data::poedb::PoeDbScraper;
use gem_profit::engine::query::RawParams;
use gem_profit::engine::{LevelTableCache, ListingSnapshotCache, MarginDeriver, ProfitService};

const BANNER: &str = r#"
  ___ ___ __  __   ___ ___  ___  ___ ___ _____
 / __| __|  \/  | | _ \ _ \/ _ \| __|_ _|_   _|
| (_ | _|| |\/| | |  _/   / (_) | _| | |  | |
 \___|___|_|  |_| |_| |_|_\___/|_| |___| |_|

  Gem levelling profit estimator
"#;

/// Env var pointing at an alternative config file.
const ENV_CONFIG_PATH: &str = "GEM_PROFIT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";
const USAGE: &str = "usage: gem-profit [serve | query [key=value ...] | clear-cache]";

enum Command {
    Serve,
    Query(RawParams),
    ClearCache,
}

impl Command {
    fn parse(args: &[String]) -> Result<Self> {
        match args.first().map(String::as_str) {
            None | Some("serve") => Ok(Command::Serve),
            Some("clear-cache") => Ok(Command::ClearCache),
            Some("query") => {
                let mut params = RawParams::new();
                for arg in &args[1..] {
                    let Some((key, value)) = arg.split_once('=') else {
                        bail!("Expected key=value, got '{arg}'\n{USAGE}");
                    };
                    params.insert(key.to_string(), Value::String(value.to_string()));
                }
                Ok(Command::Query(params))
            }
            Some(other) => bail!("Unknown command '{other}'\n{USAGE}"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var(ENV_CONFIG_PATH).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let mut cfg = AppConfig::load_or_default(&config_path)?;
    cfg.apply_env_overrides();

    init_logging(&cfg.logging);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = Command::parse(&args)?;

    let service = Arc::new(build_service(&cfg)?);

    match command {
        Command::Serve => {
            println!("{BANNER}");
            info!(
                league = %cfg.listings.league,
                cache_dir = %cfg.levels.cache_dir,
                listing_ttl_secs = cfg.listings.ttl_secs,
                margin_ttl_secs = cfg.margins.ttl_secs,
                demo = service.is_demo(),
                "GEM PROFIT starting up"
            );
            let api_token = cfg.server.api_token();
            if cfg.server.api_token_env.is_some() && api_token.is_none() {
                warn!("API token env var configured but not set, serving without authentication");
            }
            let state = Arc::new(ApiState::new(service, api_token));
            api::serve(state, &cfg.server).await?;
            info!("GEM PROFIT shut down cleanly.");
        }
        Command::Query(params) => {
            let ranked = service.query(&params).await?;
            if ranked.is_empty() {
                warn!("No gems matched the query");
            }
            println!("{}", serde_json::to_string_pretty(&DataResponse { data: ranked })?);
        }
        Command::ClearCache => {
            let removed = service.clear_level_cache().await?;
            println!("Removed {removed} cached level table(s) from {}", cfg.levels.cache_dir);
        }
    }

    Ok(())
}

/// Wire providers and caches into the profit service.
fn build_service(cfg: &AppConfig) -> Result<ProfitService> {
    let poedb = Arc::new(PoeDbScraper::new(&cfg.levels.base_url)?);
    let levels = LevelTableCache::new(poedb, &cfg.levels.cache_dir, cfg.levels.fetch_interval())?;

    let ninja = Arc::new(PoeNinjaClient::new(&cfg.listings.base_url, &cfg.listings.league)?);
    let listings = ListingSnapshotCache::new(ninja, cfg.listings.ttl());

    let deriver = MarginDeriver::new(listings, levels, cfg.margins.ttl());
    Ok(if cfg.margins.demo {
        warn!("Demo mode enabled, serving built-in margins");
        ProfitService::demo(deriver)
    } else {
        ProfitService::new(deriver)
    })
}

/// Initialise the `tracing` subscriber.
fn init_logging(cfg: &config::LoggingConfig) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.level))
        .unwrap_or_else(|_| EnvFilter::new("gem_profit=info"));

    let json_logging =
        cfg.format.eq_ignore_ascii_case("json") || std::env::var("GEM_PROFIT_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
