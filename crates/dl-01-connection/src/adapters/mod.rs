//! Connector implementations.

pub mod memory;
pub mod websocket;

pub use memory::{DevicePeer, MemoryConnector};
pub use websocket::WebSocketConnector;
