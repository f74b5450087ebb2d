//! Configuration: process environment, delivery tuning, channel registry.
//!
//! Environment config loads once at startup and fails fast if required
//! vars are missing; the database URL is wrapped in SecretString to
//! prevent log leaks. Channels are defined as one TOML file each in a
//! channels directory.

use crate::error::{Error, Result};
use crate::model::ChannelId;
use chrono::Duration;
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

/// Process-level configuration from environment variables.
///
/// In local dev, call `dotenvy::dotenv().ok()` before this.
/// In production, systemd EnvironmentFile provides the vars.
#[derive(Debug)]
pub struct Config {
    pub database_url: SecretString,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: SecretString::from(required_var("DATABASE_URL")?),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

/// Tuning knobs shared by every channel worker.
#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Delivery attempts before a message fails permanently.
    pub max_attempts: u32,
    /// Ascending retry delays; attempts beyond the table clamp to the
    /// last entry.
    pub backoff_table: Vec<Duration>,
    /// Bounds for the randomized sleep between worker iterations.
    pub jitter_min: std::time::Duration,
    pub jitter_max: std::time::Duration,
    /// Minimum gap between reconnection attempts for a down channel.
    pub health_check_interval: Duration,
    /// Reconnection attempts before a channel is flagged for manual
    /// intervention.
    pub max_reconnect_attempts: u32,
    /// Upper bound on a single transport send.
    pub transport_timeout: std::time::Duration,
    /// Channel-bootstrap retry budget (coordinator startup).
    pub bootstrap_max_attempts: u32,
    /// First bootstrap retry delay; doubles per attempt.
    pub bootstrap_initial_delay: std::time::Duration,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff_table: [5, 15, 30, 60, 120]
                .into_iter()
                .map(Duration::seconds)
                .collect(),
            jitter_min: std::time::Duration::from_secs(25),
            jitter_max: std::time::Duration::from_secs(40),
            health_check_interval: Duration::minutes(5),
            max_reconnect_attempts: 3,
            transport_timeout: std::time::Duration::from_secs(30),
            bootstrap_max_attempts: 3,
            bootstrap_initial_delay: std::time::Duration::from_secs(1),
        }
    }
}

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct ChannelFile {
    channel: ChannelConfig,
}

/// One configured send path.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub name: String,
    /// Successful sends permitted per UTC calendar day.
    #[serde(default = "default_daily_quota")]
    pub daily_quota: u32,
    /// Executable hooks backing this channel's transport. Optional —
    /// embedders that wire their own Transport leave it out.
    pub hooks: Option<ChannelHooks>,
}

/// Per-channel transport hook commands.
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelHooks {
    /// Delivers one message. Recipient in COURIER_RECIPIENT, content on
    /// stdin. Exit 0 = delivered, 75 (EX_TEMPFAIL) = channel unreachable,
    /// anything else = delivery failure.
    pub send: std::path::PathBuf,
    /// Prints the channel's connectivity state on stdout. Optional;
    /// without it the channel is assumed connected.
    pub health: Option<std::path::PathBuf>,
    /// (Re)establishes the channel's connection. Optional.
    pub connect: Option<std::path::PathBuf>,
}

fn default_daily_quota() -> u32 {
    300
}

impl ChannelConfig {
    pub fn id(&self) -> ChannelId {
        ChannelId::from(self.name.as_str())
    }
}

/// Registry of configured channels, indexed by name.
pub struct ChannelRegistry {
    channels: Vec<ChannelConfig>,
}

impl ChannelRegistry {
    /// Create an empty registry with no channels.
    pub fn empty() -> Self {
        Self {
            channels: Vec::new(),
        }
    }

    pub fn from_channels(channels: Vec<ChannelConfig>) -> Self {
        Self { channels }
    }

    /// Load all `.toml` files from a directory and build the registry.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        let mut channels = Vec::new();

        let entries = std::fs::read_dir(dir).map_err(|e| {
            Error::Config(format!("cannot read channels dir {}: {e}", dir.display()))
        })?;

        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "toml") {
                let content = std::fs::read_to_string(&path)?;
                let file: ChannelFile = toml::from_str(&content).map_err(|e| {
                    Error::Config(format!("bad channel config {}: {e}", path.display()))
                })?;
                channels.push(file.channel);
            }
        }

        channels.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { channels })
    }

    /// Look up a channel by name.
    pub fn get(&self, name: &str) -> Option<&ChannelConfig> {
        self.channels.iter().find(|c| c.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelConfig> {
        self.channels.iter()
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
