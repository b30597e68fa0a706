//! # DL-04 Client
//!
//! Request correlation engine for the esp32m control protocol.
//!
//! Many independent callers share one device connection:
//!
//! - **Correlation**: every request carries a `seq`; responses are matched
//!   by `seq` alone and may arrive in any order.
//! - **Batching**: requests issued within the debounce window go out as one
//!   JSON array frame, in creation order.
//! - **Deduplication**: a request equal to one still pending (same target,
//!   name and data) joins it instead of going out again.
//! - **Long-running operations**: `partial` responses keep a request alive
//!   by restarting its timeout.
//!
//! ```ignore
//! use dl_04_client::{Client, ClientConfig, DeviceApi};
//!
//! let client = Client::connect_websocket(ClientConfig::default().with_url("ws://10.0.0.7/ws"))?;
//! client.open();
//!
//! let gpio = client.module("gpio");
//! let _poll = gpio.use_state(None)?;
//! let state = client.get_state("gpio", None).await?;
//! ```
//!
//! Transport problems never fail a request directly; they show up in
//! [`Client::status`] and requests simply time out.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{
    ClientConfig, ConfigError, ModuleError, PendingResponse, Rejection, RequestError, RequestOptions,
    StatsSnapshot,
};
pub use ports::DeviceApi;
pub use service::{Client, ModuleHandle, StateRegistration};
