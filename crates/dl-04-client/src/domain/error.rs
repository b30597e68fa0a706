//! Client error types.

use dl_02_error_codec::ServerError;
use serde_json::Value;
use shared_types::{Request, Seq};
use std::time::Duration;
use thiserror::Error;

/// Why a request did not produce a response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    /// No final response within the timeout (partial responses restart it)
    #[error("request {seq} timed out after {timeout:?}")]
    Timeout { seq: Seq, timeout: Duration },

    /// The device answered with an error
    #[error("{0}")]
    Server(#[from] ServerError),

    /// The client was dropped before the request settled
    #[error("client shut down before the request settled")]
    ClientShutdown,
}

impl RequestError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, RequestError::Timeout { .. })
    }

    /// The decoded device error, if this is one.
    pub fn server_error(&self) -> Option<&ServerError> {
        match self {
            RequestError::Server(e) => Some(e),
            _ => None,
        }
    }
}

/// A rejected request as published on the `rejected` stream.
#[derive(Debug, Clone)]
pub struct Rejection {
    pub request: Request,
    pub error: RequestError,
}

/// Misuse of a module handle.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModuleError {
    #[error("module {module} is already polled with parameters {active:?}, refusing {requested:?}")]
    ConflictingPollParameters {
        module: String,
        active: Option<Value>,
        requested: Option<Value>,
    },
}

/// Invalid client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Connection(#[from] dl_01_connection::ConfigError),

    #[error("invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("invalid limit: {0}")]
    InvalidLimit(String),

    #[error("invalid value {value:?} for {var}")]
    InvalidEnv { var: String, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use dl_02_error_codec::DeviceError;

    #[test]
    fn test_request_error_display() {
        let e = RequestError::Timeout {
            seq: 42,
            timeout: Duration::from_secs(10),
        };
        assert_eq!(e.to_string(), "request 42 timed out after 10s");
        assert!(e.is_timeout());

        let e = RequestError::from(ServerError::Device(DeviceError::message("busy")));
        assert_eq!(e.to_string(), "busy");
        assert!(e.server_error().is_some());
    }
}
