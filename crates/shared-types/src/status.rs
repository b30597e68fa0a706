//! # Connection Status
//!
//! What consumers observe about the socket. Transport failures are only ever
//! reported here, never through a request's result.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the device connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// Current status plus the last transport error, if any.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub detail: Option<String>,
}

impl ConnectionState {
    pub fn new(status: ConnectionStatus) -> Self {
        Self { status, detail: None }
    }

    pub fn is(&self, status: ConnectionStatus) -> bool {
        self.status == status
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(ConnectionStatus::Disconnected)
    }
}

/// Published every time the status value changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub previous: ConnectionStatus,
    pub current: ConnectionStatus,
    pub detail: Option<String>,
}
