//! Domain types for the connection: configuration, events and errors.

pub mod config;
pub mod error;
pub mod events;

pub use config::ConnectionConfig;
pub use error::{ConfigError, ConnectionError};
pub use events::ConnectionEvent;
