use std::path::{Path, PathBuf};

use serde::Deserialize;

pub const DEFAULT_WINDOW_DAYS: u32 = 7;
/// GitHub caps webhook payloads at 25 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 25 * 1024 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("analytics.window-days has to be at least 1")]
    EmptyWindow,
}

/// Server configuration, loaded from an optional TOML file.
/// Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct AppConfig {
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct AnalyticsConfig {
    /// How many days back the analytics look by default.
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
pub struct WebhookConfig {
    /// Maximum accepted webhook body size in bytes.
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_body_size: default_max_body_size(),
        }
    }
}

fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}

fn default_max_body_size() -> usize {
    DEFAULT_MAX_BODY_SIZE
}

impl AppConfig {
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        if config.analytics.window_days == 0 {
            return Err(ConfigError::EmptyWindow);
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }
}
