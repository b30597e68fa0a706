//! Client configuration with validation.

use dl_01_connection::ConnectionConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::ConfigError;

/// Main client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Transport settings
    pub connection: ConnectionConfig,
    /// Default time a request may go without a response
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Quiet period after the last request before a batch is flushed
    #[serde(with = "humantime_serde")]
    pub flush_debounce: Duration,
    /// Longest a continuous stream of requests may postpone a flush
    #[serde(with = "humantime_serde")]
    pub flush_max_delay: Duration,
    /// Interval of the module state poller
    #[serde(with = "humantime_serde")]
    pub state_poll_interval: Duration,
    /// Buffered events per subscriber on each client stream
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection: ConnectionConfig::default(),
            request_timeout: Duration::from_millis(10_000),
            flush_debounce: Duration::from_millis(100),
            flush_max_delay: Duration::from_secs(1),
            state_poll_interval: Duration::from_millis(1000),
            channel_capacity: shared_bus::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `DL_URL`: device WebSocket URL
    /// - `DL_REQUEST_TIMEOUT_MS`: default request timeout
    /// - `DL_FLUSH_DEBOUNCE_MS`: batching window
    /// - `DL_STATE_POLL_MS`: module state poll interval
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from any variable source.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("DL_URL") {
            self.connection.url = url;
        }
        if let Some(ms) = millis(&lookup, "DL_REQUEST_TIMEOUT_MS")? {
            self.request_timeout = ms;
        }
        if let Some(ms) = millis(&lookup, "DL_FLUSH_DEBOUNCE_MS")? {
            self.flush_debounce = ms;
        }
        if let Some(ms) = millis(&lookup, "DL_STATE_POLL_MS")? {
            self.state_poll_interval = ms;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.connection.url = url.into();
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.connection.validate()?;

        if self.request_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "request_timeout cannot be 0".into(),
            ));
        }
        if self.flush_debounce > self.flush_max_delay {
            return Err(ConfigError::InvalidInterval(format!(
                "flush_debounce ({:?}) exceeds flush_max_delay ({:?})",
                self.flush_debounce, self.flush_max_delay
            )));
        }
        if self.state_poll_interval.is_zero() {
            return Err(ConfigError::InvalidInterval(
                "state_poll_interval cannot be 0".into(),
            ));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::InvalidLimit(
                "channel_capacity cannot be 0".into(),
            ));
        }
        Ok(())
    }
}

fn millis<F>(lookup: &F, var: &str) -> Result<Option<Duration>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidEnv {
                var: var.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| vars.get(var).cloned()
    }

    #[test]
    fn test_default_config_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.flush_debounce, Duration::from_millis(100));
        assert_eq!(config.state_poll_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_env_overrides() {
        let config = ClientConfig::default()
            .with_overrides(lookup(&[
                ("DL_URL", "ws://10.0.0.9/ws"),
                ("DL_REQUEST_TIMEOUT_MS", "2500"),
                ("DL_STATE_POLL_MS", "5000"),
            ]))
            .unwrap();
        assert_eq!(config.connection.url, "ws://10.0.0.9/ws");
        assert_eq!(config.request_timeout, Duration::from_millis(2500));
        assert_eq!(config.state_poll_interval, Duration::from_secs(5));
        assert_eq!(config.flush_debounce, Duration::from_millis(100));
    }

    #[test]
    fn test_bad_env_value() {
        let result = ClientConfig::default().with_overrides(lookup(&[("DL_FLUSH_DEBOUNCE_MS", "fast")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { var, .. }) if var == "DL_FLUSH_DEBOUNCE_MS"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let result = ClientConfig::default().with_overrides(lookup(&[("DL_REQUEST_TIMEOUT_MS", "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidTimeout(_))));
    }

    #[test]
    fn test_debounce_bounded_by_max_delay() {
        let config = ClientConfig {
            flush_debounce: Duration::from_secs(2),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidInterval(_))));
    }

    #[test]
    fn test_invalid_url_surfaces_connection_error() {
        let config = ClientConfig::default().with_url("device.local");
        assert!(matches!(config.validate(), Err(ConfigError::Connection(_))));
    }

    #[test]
    fn test_deserialize_partial() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"request_timeout": "30s", "connection": {"url": "wss://dev/ws"}}"#,
        )
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.connection.url, "wss://dev/ws");
        assert_eq!(config.flush_max_delay, Duration::from_secs(1));
    }
}
