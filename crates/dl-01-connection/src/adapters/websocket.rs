//! WebSocket connector over `tokio-tungstenite`.

use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace};

use crate::domain::{ConnectionConfig, ConnectionError};
use crate::ports::{Connector, FrameSink, FrameStream};

/// Connects to a device's WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
}

impl WebSocketConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn from_config(config: &ConnectionConfig) -> Self {
        Self::new(config.url.clone())
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), ConnectionError> {
        let (ws_stream, _) = connect_async(self.url.as_str())
            .await
            .map_err(|e| ConnectionError::Connect {
                endpoint: self.url.clone(),
                reason: e.to_string(),
            })?;

        debug!(url = %self.url, "WebSocket handshake complete");
        let (write, read) = ws_stream.split();

        let sink = write
            .sink_map_err(|e| ConnectionError::Send(e.to_string()))
            .with(|text: String| future::ready(Ok::<_, ConnectionError>(Message::Text(text.into()))));

        // tungstenite answers pings on its own while we keep reading
        let stream = read
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                        Ok(text) => Some(Ok(text)),
                        Err(_) => {
                            debug!(len = bytes.len(), "Dropping non-UTF-8 binary frame");
                            None
                        }
                    },
                    Ok(other) => {
                        trace!(frame = ?other, "Control frame");
                        None
                    }
                    Err(e) => Some(Err(ConnectionError::Receive(e.to_string()))),
                })
            });

        Ok((Box::pin(sink), Box::pin(stream)))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}
