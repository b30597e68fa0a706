//! Request correlation engine.
//!
//! ```text
//!  request() ──► PendingTable ──kick──► flusher ──batch──► Connection
//!                    ▲                                        │
//!                    └──── resolve / reject / extend ◄── event pump
//!                                                             │
//!                               incoming / status buses ◄─────┘
//! ```
//!
//! Background tasks (event pump, flusher, request timers, poller control)
//! hold only weak references, so dropping the last [`Client`] shuts
//! everything down and rejects whatever is still pending with
//! [`RequestError::ClientShutdown`].

use dashmap::DashMap;
use dl_01_connection::{Connection, ConnectionEvent, Connector, EventReceiver, WebSocketConnector};
use dl_02_error_codec::{decode, ErrorRegistry};
use dl_03_poller::{Periodic, PeriodicOptions};
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::Value;
use shared_bus::{Bus, EventPublisher, Subscription};
use shared_types::{
    ConnectionState, ConnectionStatus, Message, Request, Response, Seq, StatusChange, TYPE_BROADCAST,
};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::domain::{
    ClientConfig, ConfigError, PendingResponse, PendingTable, Registration, Rejection, RequestError,
    RequestOptions, SequenceGenerator, StatsSnapshot,
};
use crate::ports::DeviceApi;
use crate::service::module::{ModuleHandle, ModuleState};

pub(crate) struct ClientCore {
    config: ClientConfig,
    connection: Connection,
    registry: ErrorRegistry,
    pending: PendingTable,
    state: Mutex<ConnectionState>,
    status_bus: Bus<StatusChange>,
    incoming: Bus<Value>,
    outgoing: Bus<Request>,
    resolved: Bus<Response>,
    rejected: Bus<Rejection>,
    flush_kick: mpsc::UnboundedSender<()>,
    poller_control: mpsc::UnboundedSender<PollerCommand>,
    pub(crate) modules: DashMap<String, Arc<ModuleState>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerCommand {
    Enable,
    Disable,
    Trigger,
}

impl Drop for ClientCore {
    fn drop(&mut self) {
        self.connection.close();
    }
}

/// Handle to a device connection and its request engine.
///
/// Cheap to clone; all clones share one connection, one pending table and
/// one set of streams.
#[derive(Clone)]
pub struct Client {
    pub(crate) core: Arc<ClientCore>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.core.connection.endpoint())
            .field("status", &self.status().status)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl Client {
    /// Client over a WebSocket to `config.connection.url`.
    pub fn connect_websocket(config: ClientConfig) -> Result<Self, ConfigError> {
        let connector = WebSocketConnector::from_config(&config.connection);
        Self::new(Arc::new(connector), config)
    }

    /// Client with the built-in ESP-IDF error names.
    ///
    /// Spawns background tasks, so it must be called within a Tokio runtime.
    /// The connection is not opened until [`Client::open`].
    pub fn new(connector: Arc<dyn Connector>, config: ClientConfig) -> Result<Self, ConfigError> {
        Self::with_registry(connector, config, ErrorRegistry::esp_idf())
    }

    /// Client with a custom error-name registry.
    pub fn with_registry(
        connector: Arc<dyn Connector>,
        config: ClientConfig,
        registry: ErrorRegistry,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let (connection, events) = Connection::new(connector, config.connection.clone());
        let (flush_kick, kicks) = mpsc::unbounded_channel();
        let (poller_control, control_rx) = mpsc::unbounded_channel();

        let core_slot: Arc<OnceLock<Weak<ClientCore>>> = Arc::default();
        let poller = Periodic::new(
            state_poll_task(core_slot.clone()),
            config.state_poll_interval,
            PeriodicOptions {
                run_on_start: true,
                ..Default::default()
            },
        )
        .map_err(|e| ConfigError::InvalidInterval(e.to_string()))?;

        let capacity = config.channel_capacity;
        let core = Arc::new(ClientCore {
            connection,
            registry,
            pending: PendingTable::new(SequenceGenerator::random()),
            state: Mutex::new(ConnectionState::default()),
            status_bus: Bus::with_capacity(capacity),
            incoming: Bus::with_capacity(capacity),
            outgoing: Bus::with_capacity(capacity),
            resolved: Bus::with_capacity(capacity),
            rejected: Bus::with_capacity(capacity),
            flush_kick,
            poller_control,
            modules: DashMap::new(),
            config,
        });
        let weak = Arc::downgrade(&core);
        let _ = core_slot.set(weak.clone());

        tokio::spawn(run_event_pump(weak.clone(), events));
        tokio::spawn(run_flusher(
            weak,
            kicks,
            core.config.flush_debounce,
            core.config.flush_max_delay,
        ));
        tokio::spawn(run_poller_control(poller, control_rx));

        Ok(Self { core })
    }

    /// Start connecting. Idempotent.
    ///
    /// Status is `Connecting` when this returns, even right after
    /// [`Client::close`].
    pub fn open(&self) {
        let mut state = self.core.state.lock();
        if self.core.connection.open() {
            info!(endpoint = %self.core.connection.endpoint(), "Connecting");
            self.core
                .transition(&mut state, ConnectionStatus::Connecting, Some(None));
        }
    }

    /// Close the connection. Status is `Disconnected` when this returns.
    /// Pending requests are left to settle or time out.
    pub fn close(&self) {
        let mut state = self.core.state.lock();
        self.core.connection.close();
        self.core
            .transition(&mut state, ConnectionStatus::Disconnected, None);
    }

    /// Current connection status.
    pub fn status(&self) -> ConnectionState {
        self.core.state.lock().clone()
    }

    /// Every status change from now on.
    pub fn status_changes(&self) -> Subscription<StatusChange> {
        self.core.status_bus.subscribe()
    }

    /// Every well-formed inbound frame, unmodified.
    pub fn incoming(&self) -> Subscription<Value> {
        self.core.incoming.subscribe()
    }

    /// Inbound broadcasts only.
    pub fn broadcasts(&self) -> Subscription<Value> {
        self.core
            .incoming
            .subscribe_filtered(|v| v.get("type").and_then(Value::as_str) == Some(TYPE_BROADCAST))
    }

    /// Every request as it is written in a batch.
    pub fn outgoing(&self) -> Subscription<Request> {
        self.core.outgoing.subscribe()
    }

    /// Every response that settled a request successfully.
    pub fn resolved(&self) -> Subscription<Response> {
        self.core.resolved.subscribe()
    }

    /// Every rejected request, timeouts included.
    pub fn rejected(&self) -> Subscription<Rejection> {
        self.core.rejected.subscribe()
    }

    /// Shared handle for the module `name`.
    pub fn module(&self, name: &str) -> ModuleHandle {
        let state = self
            .core
            .modules
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ModuleState::new(name)))
            .clone();
        ModuleHandle::new(self.clone(), state)
    }

    /// Run the module state poller now (when connected).
    pub fn poll_now(&self) {
        let _ = self.core.poller_control.send(PollerCommand::Trigger);
    }

    /// Whether a transport session exists (connecting or connected).
    pub fn is_session_active(&self) -> bool {
        self.core.connection.is_active()
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.core.pending.pending_count()
    }

    pub fn is_pending(&self, seq: Seq) -> bool {
        self.core.pending.is_pending(seq)
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.core.pending.stats().snapshot()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.core.config
    }

    pub fn registry(&self) -> &ErrorRegistry {
        &self.core.registry
    }
}

impl DeviceApi for Client {
    fn request(
        &self,
        target: Option<&str>,
        name: &str,
        data: Option<Value>,
        options: RequestOptions,
    ) -> PendingResponse {
        match self.core.pending.register(target, name, data) {
            Registration::Existing { seq, future } => PendingResponse::new(seq, future),
            Registration::New {
                seq,
                future,
                extend,
            } => {
                let timeout = options.timeout.unwrap_or(self.core.config.request_timeout);
                tokio::spawn(run_request_timer(
                    Arc::downgrade(&self.core),
                    seq,
                    timeout,
                    extend,
                ));
                let _ = self.core.flush_kick.send(());
                PendingResponse::new(seq, future)
            }
        }
    }
}

impl ClientCore {
    /// Apply a status under the state lock. `open` and `close` hold the
    /// same lock while they start a new connection epoch, so lifecycle
    /// events are checked against the epoch atomically with the change.
    fn transition(
        &self,
        state: &mut ConnectionState,
        status: ConnectionStatus,
        detail: Option<Option<String>>,
    ) {
        let previous = state.status;
        state.status = status;
        if let Some(detail) = detail {
            state.detail = detail;
        }
        if previous != status {
            info!(from = %previous, to = %status, detail = ?state.detail, "Connection status changed");
            self.status_bus.publish(StatusChange {
                previous,
                current: status,
                detail: state.detail.clone(),
            });
        }
    }

    /// Apply a lifecycle event unless a later `open`/`close` superseded it.
    fn apply_lifecycle(&self, epoch: u64, status: ConnectionStatus, detail: Option<Option<String>>) -> bool {
        let mut state = self.state.lock();
        if epoch != self.connection.epoch() {
            trace!(epoch = epoch, status = %status, "Ignoring superseded connection event");
            return false;
        }
        self.transition(&mut state, status, detail);
        true
    }

    fn on_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Message(text) => self.on_frame(&text),
            ConnectionEvent::Opened { epoch } => {
                if self.apply_lifecycle(epoch, ConnectionStatus::Connected, Some(None)) {
                    let _ = self.poller_control.send(PollerCommand::Enable);
                }
            }
            ConnectionEvent::Closed { epoch, requested } => {
                let status = if requested {
                    ConnectionStatus::Disconnected
                } else {
                    ConnectionStatus::Connecting
                };
                self.apply_lifecycle(epoch, status, None);
                let _ = self.poller_control.send(PollerCommand::Disable);
            }
            ConnectionEvent::Errored { epoch, reason } => {
                self.apply_lifecycle(epoch, ConnectionStatus::Connecting, Some(Some(reason)));
                let _ = self.poller_control.send(PollerCommand::Disable);
            }
        }
    }

    fn on_frame(&self, text: &str) {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                debug!(error = %e, len = text.len(), "Dropping malformed frame");
                return;
            }
        };
        let message = match Message::from_value(value.clone()) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "Dropping untyped frame");
                return;
            }
        };

        self.incoming.publish(value);
        if let Message::Response(response) = message {
            self.correlate(response);
        }
    }

    fn correlate(&self, response: Response) {
        let seq = response.seq;

        if response.partial {
            if !self.pending.extend(seq) {
                trace!(seq = seq, "Partial response for unknown request");
            }
            return;
        }

        if let Some(error) = response.error.as_ref().filter(|e| !e.is_null()) {
            let error = RequestError::Server(decode(error, &self.registry));
            match self.pending.reject(seq, error.clone()) {
                Some(request) => {
                    self.rejected.publish(Rejection { request, error });
                }
                None => debug!(seq = seq, "Error response for unknown request"),
            }
            return;
        }

        match self.pending.resolve(seq, response.clone()) {
            Some(_) => {
                self.resolved.publish(response);
            }
            None => debug!(seq = seq, source = %response.source, "Response for unknown request"),
        }
    }

    fn on_timeout(&self, seq: Seq, timeout: Duration) {
        if let Some(request) = self.pending.expire(seq, timeout) {
            self.rejected.publish(Rejection {
                request,
                error: RequestError::Timeout { seq, timeout },
            });
        }
    }

    fn flush(&self) {
        let batch = self.pending.take_unsent();
        if batch.is_empty() {
            return;
        }

        let frame = Request::encode_batch(&batch);
        let dispatch = self.connection.send(frame);
        debug!(count = batch.len(), dispatch = ?dispatch, "Flushed request batch");
        for request in batch {
            self.outgoing.publish(request);
        }
    }
}

async fn run_event_pump(core: Weak<ClientCore>, mut events: EventReceiver) {
    while let Some(event) = events.recv().await {
        let Some(core) = core.upgrade() else { break };
        core.on_connection_event(event);
    }
    debug!("Event pump stopped");
}

/// Trailing debounce: each kick restarts the window, bounded by `max_delay`
/// from the first kick of the burst.
async fn run_flusher(
    core: Weak<ClientCore>,
    mut kicks: mpsc::UnboundedReceiver<()>,
    debounce: Duration,
    max_delay: Duration,
) {
    while kicks.recv().await.is_some() {
        let hard_deadline = Instant::now() + max_delay;
        loop {
            let window_end = (Instant::now() + debounce).min(hard_deadline);
            tokio::select! {
                kick = kicks.recv() => {
                    if kick.is_none() {
                        return;
                    }
                }
                _ = tokio::time::sleep_until(window_end) => break,
            }
        }
        let Some(core) = core.upgrade() else { return };
        core.flush();
    }
}

/// Per-request deadline. Ends when the entry leaves the table (the extend
/// sender is dropped with it) or the deadline passes.
async fn run_request_timer(
    core: Weak<ClientCore>,
    seq: Seq,
    timeout: Duration,
    mut extend: mpsc::UnboundedReceiver<()>,
) {
    let sleep = tokio::time::sleep(timeout);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => {
                if let Some(core) = core.upgrade() {
                    core.on_timeout(seq, timeout);
                }
                return;
            }
            signal = extend.recv() => match signal {
                Some(()) => {
                    trace!(seq = seq, "Deadline extended");
                    sleep.as_mut().reset(Instant::now() + timeout);
                }
                None => return,
            },
        }
    }
}

/// Applies enable/disable requests to the state poller in order, off the
/// event pump so a poll waiting on responses never blocks it.
async fn run_poller_control(poller: Periodic, mut control: mpsc::UnboundedReceiver<PollerCommand>) {
    while let Some(command) = control.recv().await {
        match command {
            PollerCommand::Enable => {
                if let Err(e) = poller.enable(None).await {
                    warn!(error = %e, "State poller not enabled");
                }
            }
            PollerCommand::Disable => poller.disable().await,
            PollerCommand::Trigger => poller.trigger().await,
        }
    }
    poller.disable().await;
}

fn state_poll_task(
    core_slot: Arc<OnceLock<Weak<ClientCore>>>,
) -> impl Fn(Periodic) -> futures::future::BoxFuture<'static, anyhow::Result<()>> + Send + Sync {
    use futures::FutureExt;

    move |_| {
        let core = core_slot.get().and_then(Weak::upgrade);
        async move {
            let Some(core) = core else {
                return Ok::<(), anyhow::Error>(());
            };
            let client = Client { core };

            let targets: Vec<(String, Option<Value>)> = client
                .core
                .modules
                .iter()
                .filter_map(|entry| entry.value().active_parameters().map(|p| (entry.key().clone(), p)))
                .collect();
            let polls: Vec<_> = targets
                .into_iter()
                .map(|(name, params)| {
                    let response = client.get_state(&name, params);
                    async move { (name, response.await) }
                })
                .collect();
            drop(client);

            for (module, result) in join_all(polls).await {
                if let Err(e) = result {
                    debug!(module = %module, error = %e, "State poll failed");
                }
            }
            Ok::<(), anyhow::Error>(())
        }
        .boxed()
    }
}
