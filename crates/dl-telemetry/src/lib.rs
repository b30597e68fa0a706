//! # Device-Link Telemetry
//!
//! Structured logging for Device-Link binaries. Library crates only emit
//! `tracing` events; binaries call [`init_telemetry`] once at startup.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dl_telemetry::{init_telemetry, TelemetryConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     init_telemetry(&TelemetryConfig::from_env())?;
//!     // ...
//!     Ok(())
//! }
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DL_SERVICE_NAME` | `device-link` | Service name attached to startup log |
//! | `DL_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `DL_JSON_LOGS` | `false` | Emit JSON lines instead of human-readable output |
//! | `DL_CONSOLE_OUTPUT` | `true` | Write logs to stderr at all |

mod config;
mod tracing_setup;

pub use config::TelemetryConfig;
pub use tracing_setup::init_tracing;

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize log subscriber: {0}")]
    SubscriberInit(String),

    #[error("Invalid log filter: {0}")]
    Filter(String),
}

/// Initialize logging for the current process.
///
/// Fails if a global subscriber is already installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    init_tracing(config)?;
    tracing::info!(
        service = %config.service_name,
        level = %config.log_level,
        json = config.json_logs,
        "Telemetry initialized"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "device-link");
    }
}
