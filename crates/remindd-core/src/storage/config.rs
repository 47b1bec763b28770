//! TOML-based application configuration.
//!
//! Stores the scheduler strategy and tick interval, the delivery retry
//! policy, and per-channel settings. Stored at
//! `~/.config/remindd/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::data_dir;
use crate::error::ConfigError;
use crate::model::{ChannelKind, DeliveryPolicy};

/// Scheduling strategy for due-detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Fixed-interval polling (default). Delivery latency is bounded by the
    /// tick interval plus dispatch time.
    Poll,
    /// One-shot timer per reminder, armed at creation.
    Timer,
}

/// Scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_strategy")]
    pub strategy: Strategy,
}

/// Delivery retry policy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_backoff_secs")]
    pub base_backoff_secs: u64,
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl DeliveryConfig {
    pub fn to_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts: self.max_attempts,
            base_backoff: Duration::from_secs(self.base_backoff_secs),
            send_timeout: Duration::from_secs(self.send_timeout_secs),
        }
    }
}

/// Mail gateway settings for the email channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub gateway_url: String,
    #[serde(default)]
    pub from: String,
}

/// Webhook settings for the messaging channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagingConfig {
    /// Default webhook URL, used when a reminder's recipient is empty.
    #[serde(default)]
    pub webhook_url: String,
}

/// Calendar API settings for the calendar-sync channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalendarConfig {
    #[serde(default)]
    pub api_url: String,
}

/// Channel configuration: which notifiers are enabled, and their settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default = "default_enabled_channels")]
    pub enabled: Vec<ChannelKind>,
    #[serde(default)]
    pub email: EmailConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/remindd/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    /// Path to a custom HTML message template (optional). When unset the
    /// built-in template is used.
    #[serde(default)]
    pub template_path: Option<PathBuf>,
}

// Default functions
fn default_poll_interval_secs() -> u64 {
    60
}
fn default_strategy() -> Strategy {
    Strategy::Poll
}
fn default_max_attempts() -> u32 {
    5
}
fn default_base_backoff_secs() -> u64 {
    120
}
fn default_send_timeout_secs() -> u64 {
    30
}
fn default_enabled_channels() -> Vec<ChannelKind> {
    vec![ChannelKind::Email]
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            strategy: default_strategy(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_backoff_secs: default_base_backoff_secs(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled_channels(),
            email: EmailConfig::default(),
            messaging: MessagingConfig::default(),
            calendar: CalendarConfig::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            delivery: DeliveryConfig::default(),
            channels: ChannelsConfig::default(),
            template_path: None,
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/remindd"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler.poll_interval_secs)
    }
}
