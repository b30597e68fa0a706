//! Outbound port: how a session reaches the device.

use async_trait::async_trait;
use futures::{Sink, Stream};
use std::pin::Pin;

use crate::domain::ConnectionError;

/// Writes text frames to the device.
pub type FrameSink = Pin<Box<dyn Sink<String, Error = ConnectionError> + Send>>;

/// Text frames from the device. Ends when the peer closes.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String, ConnectionError>> + Send>>;

/// Establishes one transport session per call.
///
/// Control frames (ping/pong/close) are the adapter's business; only text
/// payloads cross this port.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), ConnectionError>;

    /// Human-readable target for logs.
    fn endpoint(&self) -> String;
}
