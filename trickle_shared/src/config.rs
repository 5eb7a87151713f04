//! Configuration system.
//!
//! Loads client configuration from JSON strings/files. Every field has a
//! default, so `{}` is a valid config.

use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::net::connect_url;

/// What the transport does with outbound events while the channel is down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutboundMode {
    /// Drop and report `NotConnected` to the caller.
    #[default]
    Drop,
    /// Queue (bounded) and flush after reconnecting.
    Buffer,
}

/// Reconnect timing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconnectConfig {
    /// Fixed delay between a close and the next attempt.
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
    /// Use capped, jittered exponential backoff instead of the fixed delay.
    #[serde(default)]
    pub backoff: bool,
    /// Upper bound for the backoff delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Jitter fraction applied to backoff delays, `0.0..=1.0`.
    #[serde(default = "default_jitter")]
    pub jitter: f64,
    /// Deadline for one connect attempt (handshake included).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Silence after which a live link is treated as dead. `0` disables.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,
}

fn default_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_jitter() -> f64 {
    0.2
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

// Server pings every 54s.
fn default_idle_timeout_ms() -> u64 {
    60_000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_delay_ms(),
            backoff: false,
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
            connect_timeout_ms: default_connect_timeout_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
        }
    }
}

impl ReconnectConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms.max(self.delay_ms))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms.max(1))
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

/// Root client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Origin the game page is served from, e.g. `http://127.0.0.1:3000/`.
    #[serde(default = "default_origin")]
    pub origin: String,
    /// Id of the logged-in player.
    #[serde(default)]
    pub user_id: String,
    /// Auth token issued at login.
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub reconnect: ReconnectConfig,
    #[serde(default)]
    pub outbound: OutboundMode,
    /// Queue bound for [`OutboundMode::Buffer`].
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer: usize,
}

fn default_origin() -> String {
    "http://127.0.0.1:3000/".to_string()
}

fn default_outbound_buffer() -> usize {
    64
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            user_id: String::new(),
            token: String::new(),
            reconnect: ReconnectConfig::default(),
            outbound: OutboundMode::default(),
            outbound_buffer: default_outbound_buffer(),
        }
    }
}

impl ClientConfig {
    /// Parses config from JSON.
    pub fn from_json_str(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }

    /// Reads and parses a JSON config file.
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        let cfg = Self::from_json_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        debug!(path = %path.display(), origin = %cfg.origin, "Loaded config");
        Ok(cfg)
    }

    /// Event channel URL for this origin and token.
    pub fn connect_url(&self) -> anyhow::Result<String> {
        connect_url(&self.origin, &self.token)
    }
}
