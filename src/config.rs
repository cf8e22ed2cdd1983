use crate::history::DEFAULT_CAPACITY;
use crate::thresholds::{Escalation, Thresholds};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default)]
    pub duration_secs: Option<u64>,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_source_timeout_ms")]
    pub source_timeout_ms: u64,
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,
    #[serde(default = "default_sink_timeout_ms")]
    pub sink_timeout_ms: u64,
    #[serde(default)]
    pub listen: Option<String>,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    #[serde(default)]
    pub thresholds: BTreeMap<String, f64>,
    #[serde(default)]
    pub escalation: Escalation,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
    #[serde(default)]
    pub telegram: TelegramConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_webhook_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelegramConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bot_token_env")]
    pub bot_token_env: String,
    #[serde(default)]
    pub bot_token: Option<String>,
    #[serde(default)]
    pub allowed_chat_ids: Vec<i64>,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token_env: default_bot_token_env(),
            bot_token: None,
            allowed_chat_ids: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            duration_secs: None,
            history_capacity: default_history_capacity(),
            source_timeout_ms: default_source_timeout_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
            stop_timeout_ms: default_stop_timeout_ms(),
            sink_timeout_ms: default_sink_timeout_ms(),
            listen: None,
            report_path: None,
            thresholds: BTreeMap::new(),
            escalation: Escalation::default(),
            webhook: None,
            telegram: TelegramConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse YAML in {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("unknown threshold category '{0}' (expected cpu, memory, disk, swap or network)")]
    UnknownCategory(String),
    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs < 1 {
            return Err(ConfigError::Validation(
                "interval_secs must be >= 1".to_string(),
            ));
        }
        if self.duration_secs == Some(0) {
            return Err(ConfigError::Validation(
                "duration_secs must be >= 1 when set".to_string(),
            ));
        }
        if self.history_capacity < 1 {
            return Err(ConfigError::Validation(
                "history_capacity must be >= 1".to_string(),
            ));
        }
        for (name, value) in [
            ("source_timeout_ms", self.source_timeout_ms),
            ("failure_backoff_ms", self.failure_backoff_ms),
            ("stop_timeout_ms", self.stop_timeout_ms),
            ("sink_timeout_ms", self.sink_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
        }
        if let Some(listen) = &self.listen {
            if SocketAddr::from_str(listen).is_err() {
                return Err(ConfigError::Validation(
                    "listen must be a valid host:port address".to_string(),
                ));
            }
        }
        if let Some(webhook) = &self.webhook {
            if webhook.url.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "webhook.url must not be empty".to_string(),
                ));
            }
            if webhook.timeout_ms == 0 {
                return Err(ConfigError::Validation(
                    "webhook.timeout_ms must be > 0".to_string(),
                ));
            }
        }

        self.escalation.validate()?;
        self.initial_thresholds()?;
        Ok(())
    }

    /// Defaults, then the escalation section, then the `thresholds` map.
    pub fn initial_thresholds(&self) -> Result<Thresholds, ConfigError> {
        let mut thresholds = Thresholds {
            escalation: self.escalation,
            ..Thresholds::default()
        };
        thresholds.apply_overrides(&self.thresholds)?;
        Ok(thresholds)
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

const fn default_interval_secs() -> u64 {
    5
}

const fn default_history_capacity() -> usize {
    DEFAULT_CAPACITY
}

const fn default_source_timeout_ms() -> u64 {
    10_000
}

const fn default_failure_backoff_ms() -> u64 {
    2_000
}

const fn default_stop_timeout_ms() -> u64 {
    2_000
}

const fn default_sink_timeout_ms() -> u64 {
    10_000
}

const fn default_webhook_timeout_ms() -> u64 {
    5_000
}

fn default_bot_token_env() -> String {
    "TELEGRAM_BOT_TOKEN".to_string()
}
