use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use crate::http::RequestPolicy;
use crate::paths::{config_file_path, database_file_path};

pub const DB_PATH_ENV: &str = "EPHIST_DB_PATH";
pub const ANILIST_ENDPOINT_ENV: &str = "EPHIST_ANILIST_ENDPOINT";

pub const DEFAULT_ANILIST_ENDPOINT: &str = "https://graphql.anilist.co";
pub const DEFAULT_HISTORY_KEY: &str = "episodes";
pub const DEFAULT_CACHE_DAYS: i64 = 30;
pub const DEFAULT_ITEMS_PER_PAGE: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_path: Option<PathBuf>,
    pub history_key: String,
    pub default_cache_days: i64,
    pub items_per_page: usize,
    pub anilist_endpoint: String,
    pub http_attempts: usize,
    pub http_connect_timeout_ms: u64,
    pub http_read_timeout_ms: u64,
    pub http_retry_delay_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            history_key: DEFAULT_HISTORY_KEY.to_string(),
            default_cache_days: DEFAULT_CACHE_DAYS,
            items_per_page: DEFAULT_ITEMS_PER_PAGE,
            anilist_endpoint: DEFAULT_ANILIST_ENDPOINT.to_string(),
            http_attempts: 3,
            http_connect_timeout_ms: 3_000,
            http_read_timeout_ms: 6_000,
            http_retry_delay_ms: 1_000,
        }
    }
}

impl Config {
    /// Reads the config file when present, then applies environment overrides.
    pub fn load() -> Result<Self> {
        let path = config_file_path()?;
        let mut config = Self::load_file(&path)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn load_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_toml_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(DB_PATH_ENV).filter(|value| !value.trim().is_empty()) {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(endpoint) = lookup(ANILIST_ENDPOINT_ENV).filter(|value| !value.trim().is_empty())
        {
            self.anilist_endpoint = endpoint.trim().to_string();
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.history_key.trim().is_empty() {
            bail!("history_key must not be empty");
        }
        if self.history_key == crate::app::SETTINGS_KEY {
            bail!("history_key must differ from the settings key");
        }
        if self.items_per_page == 0 {
            bail!("items_per_page must be greater than zero");
        }
        if self.default_cache_days < 0 {
            bail!("default_cache_days must be zero or positive");
        }
        Ok(())
    }

    pub fn database_path(&self) -> Result<PathBuf> {
        match &self.database_path {
            Some(path) => Ok(path.clone()),
            None => database_file_path(),
        }
    }

    pub fn request_policy(&self) -> RequestPolicy {
        RequestPolicy {
            connect_timeout: Duration::from_millis(self.http_connect_timeout_ms),
            read_timeout: Duration::from_millis(self.http_read_timeout_ms),
            attempts: self.http_attempts,
            retry_delay: Duration::from_millis(self.http_retry_delay_ms),
        }
    }
}
