//! Connection service: session lifecycle and send buffering.
//!
//! A session is one driver task plus its outbox. Events are emitted under
//! the session lock and only by the current driver, so once `close()` has
//! returned no stale driver can report anything.

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::domain::{ConnectionConfig, ConnectionError, ConnectionEvent};
use crate::ports::Connector;

/// Receiving end of connection events.
pub type EventReceiver = mpsc::UnboundedReceiver<ConnectionEvent>;

/// Where a frame went when handed to [`Connection::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Handed to the active session
    Session,
    /// Held until a session opens
    Buffered,
}

struct ActiveSession {
    id: u64,
    connected: bool,
    outbox: mpsc::UnboundedSender<String>,
    shutdown: Option<oneshot::Sender<()>>,
    task: AbortHandle,
}

struct SessionState {
    active: Option<ActiveSession>,
    queue: VecDeque<String>,
    /// Bumped by every session start and every close
    epoch: u64,
}

struct Inner {
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    session: Mutex<SessionState>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(active) = self.session.get_mut().active.take() {
            active.task.abort();
        }
    }
}

impl Inner {
    fn enqueue(&self, state: &mut SessionState, frame: String) {
        state.queue.push_back(frame);
        while state.queue.len() > self.config.max_queued_frames {
            if let Some(dropped) = state.queue.pop_front() {
                warn!(
                    len = dropped.len(),
                    max = self.config.max_queued_frames,
                    "Send queue full, dropping oldest frame"
                );
            }
        }
    }

    fn is_current(state: &SessionState, id: u64) -> bool {
        state.active.as_ref().is_some_and(|a| a.id == id)
    }

    /// Emit on behalf of driver `id`; false if that driver is stale.
    fn emit_from(&self, id: u64, event: ConnectionEvent) -> bool {
        let state = self.session.lock();
        if !Self::is_current(&state, id) {
            return false;
        }
        let _ = self.events.send(event);
        true
    }

    fn mark_connected(&self, id: u64) -> bool {
        let mut state = self.session.lock();
        match state.active.as_mut() {
            Some(active) if active.id == id => {
                active.connected = true;
                let _ = self.events.send(ConnectionEvent::Opened { epoch: id });
                true
            }
            _ => false,
        }
    }

    /// Tear down driver `id` after an unrequested end of session. Unsent
    /// frames go back to the front of the queue.
    fn finish(&self, id: u64, mut outbox: mpsc::UnboundedReceiver<String>, unsent: Option<String>) {
        let mut state = self.session.lock();
        if !Self::is_current(&state, id) {
            return;
        }
        state.active = None;

        let mut leftover: Vec<String> = unsent.into_iter().collect();
        outbox.close();
        while let Ok(frame) = outbox.try_recv() {
            leftover.push(frame);
        }
        for frame in leftover.into_iter().rev() {
            state.queue.push_front(frame);
        }
        while state.queue.len() > self.config.max_queued_frames {
            state.queue.pop_front();
        }

        let _ = self.events.send(ConnectionEvent::Closed {
            epoch: id,
            requested: false,
        });
    }
}

/// Cloneable handle to the device connection.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.inner.connector.endpoint())
            .field("active", &self.is_active())
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Connection {
    /// Create a connection; nothing happens until [`Connection::open`].
    pub fn new(connector: Arc<dyn Connector>, config: ConnectionConfig) -> (Self, EventReceiver) {
        let (events, rx) = mpsc::unbounded_channel();
        let connection = Self {
            inner: Arc::new(Inner {
                connector,
                config,
                events,
                session: Mutex::new(SessionState {
                    active: None,
                    queue: VecDeque::new(),
                    epoch: 0,
                }),
            }),
        };
        (connection, rx)
    }

    /// Start a session unless one is already active. Returns whether a new
    /// session was started.
    pub fn open(&self) -> bool {
        let mut state = self.inner.session.lock();
        if state.active.is_some() {
            return false;
        }

        state.epoch += 1;
        let id = state.epoch;
        let (outbox, outbox_rx) = mpsc::unbounded_channel();
        for frame in state.queue.drain(..) {
            let _ = outbox.send(frame);
        }
        let (shutdown, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(drive(
            Arc::downgrade(&self.inner),
            self.inner.connector.clone(),
            self.inner.config.clone(),
            id,
            outbox_rx,
            shutdown_rx,
        ));

        debug!(session = id, endpoint = %self.inner.connector.endpoint(), "Opening session");
        state.active = Some(ActiveSession {
            id,
            connected: false,
            outbox,
            shutdown: Some(shutdown),
            task: task.abort_handle(),
        });
        true
    }

    /// End the active session (if any) and report `Closed { requested: true }`
    /// under a new epoch.
    pub fn close(&self) {
        let mut state = self.inner.session.lock();
        state.epoch += 1;
        let epoch = state.epoch;
        if let Some(mut active) = state.active.take() {
            info!(session = active.id, "Closing session");
            let signalled = active
                .shutdown
                .take()
                .is_some_and(|shutdown| shutdown.send(()).is_ok());
            if !signalled {
                active.task.abort();
            }
        }
        let _ = self.inner.events.send(ConnectionEvent::Closed {
            epoch,
            requested: true,
        });
    }

    /// Hand a text frame to the session, or buffer it until one opens.
    pub fn send(&self, frame: impl Into<String>) -> Dispatch {
        let frame = frame.into();
        let mut state = self.inner.session.lock();
        if let Some(active) = state.active.as_ref() {
            match active.outbox.send(frame) {
                Ok(()) => return Dispatch::Session,
                Err(mpsc::error::SendError(frame)) => {
                    self.inner.enqueue(&mut state, frame);
                    return Dispatch::Buffered;
                }
            }
        }
        self.inner.enqueue(&mut state, frame);
        Dispatch::Buffered
    }

    /// Whether a session exists (connecting or connected).
    pub fn is_active(&self) -> bool {
        self.inner.session.lock().active.is_some()
    }

    /// Whether the active session has completed its handshake.
    pub fn is_connected(&self) -> bool {
        self.inner
            .session
            .lock()
            .active
            .as_ref()
            .is_some_and(|a| a.connected)
    }

    /// Epoch of the latest `open()` or `close()`; 0 before either.
    pub fn epoch(&self) -> u64 {
        self.inner.session.lock().epoch
    }

    /// Frames waiting for a session.
    pub fn queued_frames(&self) -> usize {
        self.inner.session.lock().queue.len()
    }

    pub fn endpoint(&self) -> String {
        self.inner.connector.endpoint()
    }
}

/// One session: connect, then pump frames both ways until either side ends.
async fn drive(
    inner: Weak<Inner>,
    connector: Arc<dyn Connector>,
    config: ConnectionConfig,
    id: u64,
    mut outbox: mpsc::UnboundedReceiver<String>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let endpoint = connector.endpoint();
    let connect = tokio::time::timeout(config.connect_timeout, connector.connect());

    let connected = tokio::select! {
        result = connect => match result {
            Ok(Ok(pair)) => Ok(pair),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ConnectionError::ConnectTimeout {
                endpoint: endpoint.clone(),
                timeout: config.connect_timeout,
            }),
        },
        _ = &mut shutdown => return,
    };

    let (mut sink, mut stream) = match connected {
        Ok(pair) => pair,
        Err(e) => {
            warn!(session = id, error = %e, "Connect failed");
            if let Some(inner) = inner.upgrade() {
                inner.emit_from(
                    id,
                    ConnectionEvent::Errored {
                        epoch: id,
                        reason: e.to_string(),
                    },
                );
                inner.finish(id, outbox, None);
            }
            return;
        }
    };

    match inner.upgrade() {
        Some(inner) if inner.mark_connected(id) => {}
        _ => return,
    }
    info!(session = id, endpoint = %endpoint, "Session opened");

    let mut unsent = None;
    let failure = loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(text)) => {
                    let Some(inner) = inner.upgrade() else { return };
                    if !inner.emit_from(id, ConnectionEvent::Message(text)) {
                        return;
                    }
                }
                Some(Err(e)) => break Some(e),
                None => break None,
            },
            frame = outbox.recv() => match frame {
                Some(text) => {
                    if let Err(e) = sink.send(text.clone()).await {
                        unsent = Some(text);
                        break Some(e);
                    }
                }
                None => break None,
            },
            _ = &mut shutdown => {
                let _ = sink.close().await;
                debug!(session = id, "Session closed on request");
                return;
            }
        }
    };

    match &failure {
        Some(e) => warn!(session = id, error = %e, "Session failed"),
        None => info!(session = id, "Session closed by peer"),
    }
    if let Some(inner) = inner.upgrade() {
        if let Some(e) = failure {
            inner.emit_from(
                id,
                ConnectionEvent::Errored {
                    epoch: id,
                    reason: e.to_string(),
                },
            );
        }
        inner.finish(id, outbox, unsent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{DevicePeer, MemoryConnector};
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;

    fn setup() -> (Connection, EventReceiver, MemoryConnector, UnboundedReceiver<DevicePeer>) {
        let (connector, peers) = MemoryConnector::new();
        let (connection, events) =
            Connection::new(Arc::new(connector.clone()), ConnectionConfig::default());
        (connection, events, connector, peers)
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let (connection, mut events, connector, mut peers) = setup();

        assert!(connection.open());
        assert!(!connection.open());
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 1 }));
        assert!(!connection.open());

        let _peer = peers.recv().await.unwrap();
        assert_eq!(connector.sessions(), 1);
        assert!(connection.is_connected());
    }

    #[tokio::test]
    async fn test_frames_both_ways() {
        let (connection, mut events, _connector, mut peers) = setup();
        connection.open();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 1 }));

        assert_eq!(connection.send("[1]"), Dispatch::Session);
        assert_eq!(peer.recv().await.as_deref(), Some("[1]"));

        peer.send(r#"{"type":"broadcast"}"#);
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Message(r#"{"type":"broadcast"}"#.into()))
        );
    }

    #[tokio::test]
    async fn test_buffers_until_open() {
        let (connection, mut events, _connector, mut peers) = setup();

        assert_eq!(connection.send("a"), Dispatch::Buffered);
        assert_eq!(connection.send("b"), Dispatch::Buffered);
        assert_eq!(connection.queued_frames(), 2);

        connection.open();
        let mut peer = peers.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 1 }));
        assert_eq!(peer.recv().await.as_deref(), Some("a"));
        assert_eq!(peer.recv().await.as_deref(), Some("b"));
        assert_eq!(connection.queued_frames(), 0);
    }

    #[tokio::test]
    async fn test_queue_drops_oldest() {
        let (connector, _peers) = MemoryConnector::new();
        let config = ConnectionConfig {
            max_queued_frames: 2,
            ..Default::default()
        };
        let (connection, _events) = Connection::new(Arc::new(connector), config);

        connection.send("1");
        connection.send("2");
        connection.send("3");
        assert_eq!(connection.queued_frames(), 2);
    }

    #[tokio::test]
    async fn test_peer_hangup_reports_unrequested_close() {
        let (connection, mut events, _connector, mut peers) = setup();
        connection.open();
        let peer = peers.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 1 }));

        drop(peer);
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Closed {
                epoch: 1,
                requested: false
            })
        );
        assert!(!connection.is_active());

        // A new session can be opened afterwards
        assert!(connection.open());
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 2 }));
    }

    #[tokio::test]
    async fn test_receive_error_reports_errored_then_closed() {
        let (connection, mut events, _connector, mut peers) = setup();
        connection.open();
        let peer = peers.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 1 }));

        peer.fail("reset by peer");
        assert!(matches!(
            events.recv().await,
            Some(ConnectionEvent::Errored { epoch: 1, reason }) if reason.contains("reset by peer")
        ));
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Closed {
                epoch: 1,
                requested: false
            })
        );
    }

    #[tokio::test]
    async fn test_connect_failure() {
        let (connection, mut events, connector, _peers) = setup();
        connector.refuse_connections(true);

        connection.send("kept");
        connection.open();
        assert!(matches!(events.recv().await, Some(ConnectionEvent::Errored { epoch: 1, .. })));
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Closed {
                epoch: 1,
                requested: false
            })
        );
        assert_eq!(connection.queued_frames(), 1);
    }

    #[tokio::test]
    async fn test_close_is_requested_and_silences_driver() {
        let (connection, mut events, _connector, mut peers) = setup();
        connection.open();
        let peer = peers.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 1 }));

        connection.close();
        assert_eq!(
            events.recv().await,
            Some(ConnectionEvent::Closed {
                epoch: 2,
                requested: true
            })
        );

        peer.send("late");
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(events.try_recv().is_err());
        assert!(!connection.is_active());
    }

    #[tokio::test]
    async fn test_close_then_open_supersedes_old_epoch() {
        let (connection, mut events, _connector, mut peers) = setup();
        connection.open();
        let _first = peers.recv().await.unwrap();
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 1 }));

        connection.close();
        assert!(connection.open());
        assert_eq!(connection.epoch(), 3);

        let _second = peers.recv().await.unwrap();
        let closed = events.recv().await.unwrap();
        assert_eq!(
            closed,
            ConnectionEvent::Closed {
                epoch: 2,
                requested: true
            }
        );
        assert_ne!(closed.epoch(), Some(connection.epoch()));
        assert_eq!(events.recv().await, Some(ConnectionEvent::Opened { epoch: 3 }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_timeout() {
        struct Hanging;

        #[async_trait::async_trait]
        impl Connector for Hanging {
            async fn connect(
                &self,
            ) -> Result<(crate::ports::FrameSink, crate::ports::FrameStream), ConnectionError> {
                futures::future::pending().await
            }

            fn endpoint(&self) -> String {
                "hanging://".into()
            }
        }

        let (connection, mut events) = Connection::new(Arc::new(Hanging), ConnectionConfig::default());
        connection.open();
        match events.recv().await {
            Some(ConnectionEvent::Errored { reason, .. }) => assert!(reason.contains("timed out")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
