//! In-memory connector.
//!
//! Every successful `connect()` hands a [`DevicePeer`] to whoever holds the
//! peer receiver, which then plays the device side of that session. Used by
//! unit tests, the integration suite and offline demos.

use async_trait::async_trait;
use futures::{sink, stream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::ConnectionError;
use crate::ports::{Connector, FrameSink, FrameStream};

/// Device end of one in-memory session.
#[derive(Debug)]
pub struct DevicePeer {
    /// Session number, starting at 1
    pub session: u64,
    from_client: mpsc::UnboundedReceiver<String>,
    to_client: mpsc::UnboundedSender<Result<String, ConnectionError>>,
}

impl DevicePeer {
    /// Next frame written by the client; `None` once the client side is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Frame already written by the client, if any.
    pub fn try_recv(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Deliver a text frame to the client. False if the session is gone.
    pub fn send(&self, text: impl Into<String>) -> bool {
        self.to_client.send(Ok(text.into())).is_ok()
    }

    /// Fail the client's read side with a receive error.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self
            .to_client
            .send(Err(ConnectionError::Receive(reason.into())));
    }

    /// Handle for sending from another task.
    pub fn sender(&self) -> mpsc::UnboundedSender<Result<String, ConnectionError>> {
        self.to_client.clone()
    }
}

/// Connector whose sessions are channel pairs.
#[derive(Debug, Clone)]
pub struct MemoryConnector {
    peers: mpsc::UnboundedSender<DevicePeer>,
    refuse: Arc<AtomicBool>,
    sessions: Arc<AtomicU64>,
}

impl MemoryConnector {
    /// Create the connector and the receiver of device peers.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DevicePeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        (
            Self {
                peers,
                refuse: Arc::new(AtomicBool::new(false)),
                sessions: Arc::new(AtomicU64::new(0)),
            },
            rx,
        )
    }

    /// Make subsequent connect attempts fail (simulates an unreachable device).
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Number of sessions established so far.
    pub fn sessions(&self) -> u64 {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<(FrameSink, FrameStream), ConnectionError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(ConnectionError::Connect {
                endpoint: self.endpoint(),
                reason: "connection refused".into(),
            });
        }

        let (client_tx, from_client) = mpsc::unbounded_channel::<String>();
        let (to_client, client_rx) = mpsc::unbounded_channel();
        let session = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;

        self.peers
            .send(DevicePeer {
                session,
                from_client,
                to_client,
            })
            .map_err(|_| ConnectionError::Connect {
                endpoint: self.endpoint(),
                reason: "no device attached".into(),
            })?;

        let frame_sink = sink::unfold(client_tx, |tx, text: String| async move {
            tx.send(text)
                .map_err(|_| ConnectionError::Send("device hung up".into()))?;
            Ok::<_, ConnectionError>(tx)
        });
        let frame_stream = stream::unfold(client_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok((Box::pin(frame_sink), Box::pin(frame_stream)))
    }

    fn endpoint(&self) -> String {
        "memory://device".to_string()
    }
}
