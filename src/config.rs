use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    settings::SettingDefaults,
};

pub const ENV_DATABASE_URL: &str = "CHOREBANK_DATABASE_URL";
pub const ENV_MAX_CONNECTIONS: &str = "CHOREBANK_MAX_CONNECTIONS";

/// Process configuration, read from a TOML file with every field optional.
///
/// ```toml
/// database_url = "sqlite:chores.db"
/// max_connections = 5
///
/// [defaults]
/// tokens_per_dollar = 100.0
/// cash_out_interest_rate = 1.0
/// penalty_per_day = 2
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub defaults: SettingDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 5,
            defaults: SettingDefaults::default(),
        }
    }
}

impl Config {
    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Validation(format!("invalid config: {}", e)))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Validation(format!("cannot read config {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    /// Defaults overlaid with environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = lookup(ENV_DATABASE_URL) {
            self.database_url = url;
        }
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            self.max_connections = raw.trim().parse().map_err(|_| {
                Error::Validation(format!("{} must be a positive integer", ENV_MAX_CONNECTIONS))
            })?;
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialize(e.to_string()))
    }
}
