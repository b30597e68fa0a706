//! Ports for the connection.

pub mod outbound;

pub use outbound::{Connector, FrameSink, FrameStream};
