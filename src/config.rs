//! Configuration management
//!
//! Handles loading and validating client configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::connection::ConnectionConfig;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// WebSocket endpoint URL (ws:// or wss://)
    pub url: String,
}

/// Reconnection policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconnectConfig {
    /// Base delay before the first retry, in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Ceiling on the backoff delay, in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Retry attempts before giving up (0 = retry forever)
    #[serde(default)]
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            max_attempts: 0,
        }
    }
}

/// Keepalive probe configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveConfig {
    /// Probe period in seconds
    #[serde(default = "default_ping_interval")]
    pub interval_secs: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_ping_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_ping_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: Config =
            toml::from_str(&contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.url.is_empty() {
            anyhow::bail!("server.url must not be empty");
        }
        if !self.server.url.starts_with("ws://") && !self.server.url.starts_with("wss://") {
            anyhow::bail!("server.url must be a ws:// or wss:// URL");
        }
        if self.reconnect.base_delay_ms == 0 {
            anyhow::bail!("reconnect.base_delay_ms must be > 0");
        }
        if self.reconnect.max_delay_ms < self.reconnect.base_delay_ms {
            anyhow::bail!("reconnect.max_delay_ms must be >= reconnect.base_delay_ms");
        }
        if self.keepalive.interval_secs == 0 {
            anyhow::bail!("keepalive.interval_secs must be > 0");
        }
        Ok(())
    }

    /// Build the connection manager configuration
    pub fn connection(&self) -> ConnectionConfig {
        ConnectionConfig {
            url: self.server.url.clone(),
            base_delay: Duration::from_millis(self.reconnect.base_delay_ms),
            max_delay: Duration::from_millis(self.reconnect.max_delay_ms),
            max_attempts: (self.reconnect.max_attempts > 0).then_some(self.reconnect.max_attempts),
            ping_interval: Duration::from_secs(self.keepalive.interval_secs),
        }
    }
}
