/// Lifecycle and data events reported by a [`crate::Connection`].
///
/// Lifecycle events carry the epoch they belong to. Every `open()` that
/// starts a session and every `close()` begins a new epoch, so a consumer
/// comparing against [`crate::Connection::epoch`] can tell an event that a
/// later open or close has already superseded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The transport session is established
    Opened { epoch: u64 },
    /// The session ended. `requested` is true only for [`crate::Connection::close`].
    Closed { epoch: u64, requested: bool },
    /// Transport failure; a `Closed` event for the same epoch follows
    Errored { epoch: u64, reason: String },
    /// One inbound text frame
    Message(String),
}

impl ConnectionEvent {
    pub fn is_message(&self) -> bool {
        matches!(self, ConnectionEvent::Message(_))
    }

    /// Epoch of a lifecycle event; `None` for messages.
    pub fn epoch(&self) -> Option<u64> {
        match self {
            ConnectionEvent::Opened { epoch }
            | ConnectionEvent::Closed { epoch, .. }
            | ConnectionEvent::Errored { epoch, .. } => Some(*epoch),
            ConnectionEvent::Message(_) => None,
        }
    }
}
