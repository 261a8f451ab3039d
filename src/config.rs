use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Overrides `server_url` when set.
pub const SERVER_URL_ENV: &str = "COMPILE_SESSION_SERVER_URL";

/// User configuration, read from `~/.compile-session/config.yaml`.
/// Every field is optional in the file.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Config {
    /// Base URL of the execution and learning service.
    #[serde(default = "default_server_url")]
    pub server_url: String,
    /// Language used when it cannot be inferred from a file name.
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Timeout for REST calls. The streaming session has none.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Whether sessions write a JSONL event log.
    #[serde(default = "default_event_log")]
    pub event_log: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `warn` or `compile_session=debug`.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// One of `pretty`, `compact`, `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file_line: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file_line: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: default_server_url(),
            default_language: default_language(),
            request_timeout_secs: default_request_timeout_secs(),
            logging: LoggingConfig::default(),
            event_log: default_event_log(),
        }
    }
}

fn default_server_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_language() -> String {
    "rust".to_string()
}

fn default_request_timeout_secs() -> u64 {
    15
}

fn default_event_log() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_log_format() -> String {
    "compact".to_string()
}

const LOG_FORMATS: &[&str] = &["pretty", "compact", "json"];

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads the user config and applies environment overrides.
    pub fn resolve() -> Result<Self> {
        let path = crate::paths::config_path()?;
        let mut config = Self::load_or_default(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(SERVER_URL_ENV) {
            if !url.trim().is_empty() {
                self.server_url = url.trim().to_string();
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.server_url)
            .with_context(|| format!("Invalid server_url '{}'", self.server_url))?;
        if !matches!(url.scheme(), "http" | "https" | "ws" | "wss") {
            anyhow::bail!(
                "server_url '{}' must use http, https, ws or wss",
                self.server_url
            );
        }
        if url.host_str().is_none() {
            anyhow::bail!("server_url '{}' has no host", self.server_url);
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }

        if self.default_language.trim().is_empty() {
            anyhow::bail!("default_language must not be empty");
        }

        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            anyhow::bail!(
                "Unknown logging format '{}' (expected one of: {})",
                self.logging.format,
                LOG_FORMATS.join(", ")
            );
        }

        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
