//! Ports for the client.

pub mod inbound;

pub use inbound::DeviceApi;
