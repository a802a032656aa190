//! Application configuration management.
//!
//! Holds the server address, request tuning, and the last used username.
//! Stored at `~/.config/expensee/config.json`; a handful of `EXPENSEE_*`
//! environment variables override the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::pipeline::{
    PipelineOptions, RefreshPolicy, DEFAULT_MAX_LOGGED_BODY, DEFAULT_USER_AGENT,
};

/// Application name used for config/log directory paths
const APP_NAME: &str = "expensee";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_API_URL: &str = "EXPENSEE_API_URL";
pub const ENV_USER_AGENT: &str = "EXPENSEE_USER_AGENT";
pub const ENV_TIMEOUT_SECS: &str = "EXPENSEE_TIMEOUT_SECS";
pub const ENV_COALESCE_REFRESH: &str = "EXPENSEE_COALESCE_REFRESH";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    /// Serialize token refreshes so concurrent `401`s share one refresh.
    pub coalesce_refresh: bool,
    pub last_username: Option<String>,
    pub log_body_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            coalesce_refresh: false,
            last_username: None,
            log_body_limit: DEFAULT_MAX_LOGGED_BODY,
        }
    }
}

impl Config {
    /// Load the config file (defaults if missing), then apply env overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Invalid config file {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env_from(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for rolling log files.
    pub fn log_dir() -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME).join("logs"))
    }

    /// Apply overrides from `lookup` (normally the process environment).
    /// Unparseable values are ignored with a warning.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(agent) = lookup(ENV_USER_AGENT).filter(|v| !v.trim().is_empty()) {
            self.user_agent = agent;
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_SECS) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %raw, "Ignoring invalid {}", ENV_TIMEOUT_SECS),
            }
        }
        if let Some(raw) = lookup(ENV_COALESCE_REFRESH) {
            match parse_flag(&raw) {
                Some(flag) => self.coalesce_refresh = flag,
                None => warn!(value = %raw, "Ignoring invalid {}", ENV_COALESCE_REFRESH),
            }
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            user_agent: self.user_agent.clone(),
            refresh_policy: if self.coalesce_refresh {
                RefreshPolicy::Coalesced
            } else {
                RefreshPolicy::Independent
            },
            max_logged_body: self.log_body_limit,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
