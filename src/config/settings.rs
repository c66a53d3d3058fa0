// ABOUTME: Process-level settings read from SHIPWRIGHT_* environment variables.
// ABOUTME: Covers notification endpoints, the registry, log level, and on-disk locations.

use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::logging::LogLevel;

pub const DEFAULT_PAGER_URL: &str = "https://events.pagerduty.com/v2/enqueue";
pub const DEFAULT_STATE_DIR: &str = ".shipwright/state";
pub const DEFAULT_LOG_DIR: &str = ".shipwright/logs";

pub const ENV_REGISTRY: &str = "SHIPWRIGHT_REGISTRY";
pub const ENV_PAGER_KEY: &str = "SHIPWRIGHT_PAGER_KEY";
pub const ENV_PAGER_URL: &str = "SHIPWRIGHT_PAGER_URL";
pub const ENV_CHAT_WEBHOOK: &str = "SHIPWRIGHT_CHAT_WEBHOOK";
pub const ENV_METRICS_URL: &str = "SHIPWRIGHT_METRICS_URL";
pub const ENV_LOG_LEVEL: &str = "SHIPWRIGHT_LOG_LEVEL";
pub const ENV_STATE_DIR: &str = "SHIPWRIGHT_STATE_DIR";
pub const ENV_LOG_DIR: &str = "SHIPWRIGHT_LOG_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Registry prefix for built artifacts.
    pub registry: Option<String>,
    /// Routing key for the paging service. Paging is disabled without it.
    pub pager_key: Option<String>,
    pub pager_url: String,
    pub chat_webhook: Option<String>,
    pub metrics_url: Option<String>,
    /// Explicit minimum log level; `--debug` overrides it.
    pub log_level: Option<LogLevel>,
    pub state_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let log_level = get(ENV_LOG_LEVEL)
            .map(|raw| {
                raw.parse::<LogLevel>()
                    .map_err(|e| Error::InvalidConfig(format!("{ENV_LOG_LEVEL}: {e}")))
            })
            .transpose()?;

        Ok(Settings {
            registry: get(ENV_REGISTRY).map(|r| r.trim_end_matches('/').to_string()),
            pager_key: get(ENV_PAGER_KEY),
            pager_url: get(ENV_PAGER_URL).unwrap_or_else(|| DEFAULT_PAGER_URL.to_string()),
            chat_webhook: get(ENV_CHAT_WEBHOOK),
            metrics_url: get(ENV_METRICS_URL),
            log_level,
            state_dir: get(ENV_STATE_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR)),
            log_dir: get(ENV_LOG_DIR)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_DIR)),
        })
    }

    /// Effective minimum log level for a run.
    pub fn effective_log_level(&self, debug: bool) -> LogLevel {
        if debug {
            LogLevel::Debug
        } else {
            self.log_level.unwrap_or(LogLevel::Info)
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            registry: None,
            pager_key: None,
            pager_url: DEFAULT_PAGER_URL.to_string(),
            chat_webhook: None,
            metrics_url: None,
            log_level: None,
            state_dir: PathBuf::from(DEFAULT_STATE_DIR),
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}
