//! # DL-01 Connection
//!
//! Owns the single transport session to a device.
//!
//! ## Architecture
//!
//! ```text
//!   Connection (service)
//!     ├── session: at most one driver task at a time
//!     ├── queue:   frames sent while no session exists
//!     └── events:  Opened / Closed / Errored / Message  ──► consumer
//!            │
//!            ▼
//!   Connector (port) ──► WebSocketConnector | MemoryConnector
//! ```
//!
//! The connection never retries on its own. Whoever consumes the events
//! decides when to call [`Connection::open`] again.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::{DevicePeer, MemoryConnector, WebSocketConnector};
pub use domain::{ConfigError, ConnectionConfig, ConnectionError, ConnectionEvent};
pub use ports::{Connector, FrameSink, FrameStream};
pub use service::{Connection, Dispatch, EventReceiver};
