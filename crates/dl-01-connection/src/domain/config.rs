//! Connection configuration with validation.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

/// Where and how to connect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// WebSocket endpoint of the device (`ws://` or `wss://`)
    pub url: String,
    /// Give up on a connect attempt after this long
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    /// Frames kept while no session is open; the oldest are dropped beyond this
    pub max_queued_frames: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            // Soft-AP address of an unprovisioned esp32m device
            url: "ws://192.168.4.1/ws".to_string(),
            connect_timeout: Duration::from_secs(10),
            max_queued_frames: 256,
        }
    }
}

impl ConnectionConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::InvalidUrl(format!(
                "{} (expected ws:// or wss://)",
                self.url
            )));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout cannot be 0".into(),
            ));
        }
        if self.max_queued_frames == 0 {
            return Err(ConfigError::InvalidLimit(
                "max_queued_frames cannot be 0".into(),
            ));
        }
        Ok(())
    }
}
