//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! field has a default, so a missing file or section still yields a working
//! configuration. Secrets (the API token) are referenced by env-var name in
//! the config and resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::data::{ninja, poedb};
use crate::storage::DEFAULT_CACHE_DIR;

/// Env var forcing demo mode on or off.
pub const ENV_DEMO: &str = "GEM_PROFIT_DEMO";
/// Env var with a comma-separated CORS origin list.
pub const ENV_ALLOWED_ORIGINS: &str = "GEM_PROFIT_ALLOWED_ORIGINS";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub levels: LevelsConfig,
    pub listings: ListingsConfig,
    pub margins: MarginsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LevelsConfig {
    pub base_url: String,
    pub cache_dir: String,
    /// Minimum gap between two level table fetches.
    pub fetch_interval_ms: u64,
}

impl Default for LevelsConfig {
    fn default() -> Self {
        Self {
            base_url: poedb::DEFAULT_BASE_URL.to_string(),
            cache_dir: DEFAULT_CACHE_DIR.to_string(),
            fetch_interval_ms: 1000,
        }
    }
}

impl LevelsConfig {
    pub fn fetch_interval(&self) -> Duration {
        Duration::from_millis(self.fetch_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ListingsConfig {
    pub base_url: String,
    pub league: String,
    pub ttl_secs: u64,
}

impl Default for ListingsConfig {
    fn default() -> Self {
        Self {
            base_url: ninja::DEFAULT_BASE_URL.to_string(),
            league: ninja::DEFAULT_LEAGUE.to_string(),
            ttl_secs: 30 * 60,
        }
    }
}

impl ListingsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct MarginsConfig {
    pub ttl_secs: u64,
    /// Serve the built-in demo table instead of live data.
    pub demo: bool,
}

impl Default for MarginsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 30,
            demo: false,
        }
    }
}

impl MarginsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// CORS origins; `"*"` allows any.
    pub allowed_origins: Vec<String>,
    /// Name of the env var holding the bearer token. Unset = open access.
    pub api_token_env: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            allowed_origins: vec!["*".to_string()],
            api_token_env: None,
        }
    }
}

impl ServerConfig {
    /// Resolve the bearer token, if one is configured and set.
    pub fn api_token(&self) -> Option<String> {
        let env_name = self.api_token_env.as_deref()?;
        AppConfig::resolve_env(env_name)
            .ok()
            .filter(|token| !token.is_empty())
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// `"text"` or `"json"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "gem_profit=info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise use the built-in defaults.
    /// A file that exists but does not parse is still an error.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Apply `GEM_PROFIT_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary lookup (the environment in production).
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(demo) = lookup(ENV_DEMO) {
            self.margins.demo = is_truthy(&demo);
        }
        if let Some(origins) = lookup(ENV_ALLOWED_ORIGINS) {
            let origins: Vec<String> = origins
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
            if !origins.is_empty() {
                self.server.allowed_origins = origins;
            }
        }
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
