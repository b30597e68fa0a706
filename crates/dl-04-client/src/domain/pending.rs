//! Pending request table.
//!
//! Maps `seq` to the caller waiting for that request's response.
//!
//! Flow:
//! 1. `request()` calls [`PendingTable::register`]; an equivalent entry
//!    already in the table is reused instead of creating a new one
//! 2. The flusher calls [`PendingTable::take_unsent`] and writes the batch
//! 3. The inbound handler calls [`PendingTable::extend`] for partial
//!    responses, and [`PendingTable::resolve`] / [`PendingTable::reject`]
//!    for final ones
//! 4. The entry's timer calls [`PendingTable::expire`] if nothing arrives
//!
//! Every mutation happens under one lock, so an entry is removed exactly
//! once whichever of resolve, reject and expire gets there first.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use shared_types::{Request, Response, Seq};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::error::RequestError;
use super::sequence::SequenceGenerator;

/// Outcome shared by every caller of one request.
pub type ResponseFuture = Shared<BoxFuture<'static, Result<Response, RequestError>>>;

type Outcome = Result<Response, RequestError>;

/// A request waiting for its response.
struct PendingEntry {
    request: Request,
    /// Creation order, for batching
    order: u64,
    queued_at: Instant,
    sent_at: Option<Instant>,
    sender: oneshot::Sender<Outcome>,
    /// Restarts the entry's timer; dropping it stops the timer
    extend: mpsc::UnboundedSender<()>,
    future: ResponseFuture,
}

/// Statistics for the pending table
#[derive(Debug, Default)]
pub struct PendingStats {
    /// Total requests registered
    pub total_registered: AtomicU64,
    /// Requests answered by an existing entry
    pub total_deduplicated: AtomicU64,
    /// Requests written to the connection
    pub total_sent: AtomicU64,
    /// Requests resolved with a response
    pub total_resolved: AtomicU64,
    /// Requests rejected with a device error
    pub total_rejected: AtomicU64,
    /// Requests that timed out
    pub total_timeouts: AtomicU64,
}

impl PendingStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.total_registered.load(Ordering::Relaxed),
            deduplicated: self.total_deduplicated.load(Ordering::Relaxed),
            sent: self.total_sent.load(Ordering::Relaxed),
            resolved: self.total_resolved.load(Ordering::Relaxed),
            rejected: self.total_rejected.load(Ordering::Relaxed),
            timed_out: self.total_timeouts.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PendingStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub deduplicated: u64,
    pub sent: u64,
    pub resolved: u64,
    pub rejected: u64,
    pub timed_out: u64,
}

/// Result of [`PendingTable::register`].
pub enum Registration {
    /// A new entry; the caller must start its timer with `extend`
    New {
        seq: Seq,
        future: ResponseFuture,
        extend: mpsc::UnboundedReceiver<()>,
    },
    /// An equivalent request was already pending
    Existing { seq: Seq, future: ResponseFuture },
}

struct Entries {
    map: HashMap<Seq, PendingEntry>,
    next_order: u64,
}

/// Table of requests that have not settled yet.
pub struct PendingTable {
    entries: Mutex<Entries>,
    sequence: SequenceGenerator,
    stats: PendingStats,
}

impl PendingTable {
    pub fn new(sequence: SequenceGenerator) -> Self {
        Self {
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_order: 0,
            }),
            sequence,
            stats: PendingStats::default(),
        }
    }

    /// Register a request, or join an equivalent one already pending
    /// (same target, name and data).
    pub fn register(&self, target: Option<&str>, name: &str, data: Option<Value>) -> Registration {
        let mut entries = self.entries.lock();

        if let Some((seq, entry)) = entries
            .map
            .iter()
            .find(|(_, e)| e.request.is_equivalent(target, name, data.as_ref()))
        {
            self.stats.total_deduplicated.fetch_add(1, Ordering::Relaxed);
            debug!(seq = *seq, target = ?target, name = name, "Joined pending request");
            return Registration::Existing {
                seq: *seq,
                future: entry.future.clone(),
            };
        }

        let seq = self.sequence.next();
        let (sender, receiver) = oneshot::channel::<Outcome>();
        let (extend, extend_rx) = mpsc::unbounded_channel();
        let future = receiver
            .map(|outcome| outcome.unwrap_or_else(|_| Err(RequestError::ClientShutdown)))
            .boxed()
            .shared();

        let order = entries.next_order;
        entries.next_order += 1;
        entries.map.insert(
            seq,
            PendingEntry {
                request: Request::new(target.map(str::to_string), name, seq, data),
                order,
                queued_at: Instant::now(),
                sent_at: None,
                sender,
                extend,
                future: future.clone(),
            },
        );
        self.stats.total_registered.fetch_add(1, Ordering::Relaxed);
        debug!(seq = seq, target = ?target, name = name, "Registered pending request");

        Registration::New {
            seq,
            future,
            extend: extend_rx,
        }
    }

    /// Mark every not-yet-sent entry as sent and return their requests in
    /// creation order.
    pub fn take_unsent(&self) -> Vec<Request> {
        let mut entries = self.entries.lock();
        let now = Instant::now();

        let mut unsent: Vec<&mut PendingEntry> = entries
            .map
            .values_mut()
            .filter(|e| e.sent_at.is_none())
            .collect();
        unsent.sort_by_key(|e| e.order);

        let requests: Vec<Request> = unsent
            .into_iter()
            .map(|e| {
                e.sent_at = Some(now);
                e.request.clone()
            })
            .collect();
        self.stats
            .total_sent
            .fetch_add(requests.len() as u64, Ordering::Relaxed);
        requests
    }

    /// Restart the timer of `seq`. False if no such entry.
    pub fn extend(&self, seq: Seq) -> bool {
        let entries = self.entries.lock();
        match entries.map.get(&seq) {
            Some(entry) => entry.extend.send(()).is_ok(),
            None => false,
        }
    }

    /// Settle `seq` with a response. Returns the request if it was pending.
    pub fn resolve(&self, seq: Seq, response: Response) -> Option<Request> {
        let entry = self.entries.lock().map.remove(&seq)?;
        self.stats.total_resolved.fetch_add(1, Ordering::Relaxed);
        debug!(
            seq = seq,
            name = %entry.request.name,
            elapsed_ms = entry.queued_at.elapsed().as_millis() as u64,
            "Resolved pending request"
        );
        let _ = entry.sender.send(Ok(response));
        Some(entry.request)
    }

    /// Settle `seq` with a device error. Returns the request if it was pending.
    pub fn reject(&self, seq: Seq, error: RequestError) -> Option<Request> {
        let entry = self.entries.lock().map.remove(&seq)?;
        self.stats.total_rejected.fetch_add(1, Ordering::Relaxed);
        debug!(seq = seq, name = %entry.request.name, error = %error, "Rejected pending request");
        let _ = entry.sender.send(Err(error));
        Some(entry.request)
    }

    /// Time `seq` out. Returns the request if it was still pending.
    pub fn expire(&self, seq: Seq, timeout: Duration) -> Option<Request> {
        let entry = self.entries.lock().map.remove(&seq)?;
        self.stats.total_timeouts.fetch_add(1, Ordering::Relaxed);
        warn!(
            seq = seq,
            target = ?entry.request.target,
            name = %entry.request.name,
            sent = entry.sent_at.is_some(),
            timeout_ms = timeout.as_millis() as u64,
            "Request timed out"
        );
        let _ = entry.sender.send(Err(RequestError::Timeout { seq, timeout }));
        Some(entry.request)
    }

    /// Get number of currently pending requests
    pub fn pending_count(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// Check if a seq is pending
    pub fn is_pending(&self, seq: Seq) -> bool {
        self.entries.lock().map.contains_key(&seq)
    }

    /// Whether `seq` has been written to the connection.
    pub fn is_sent(&self, seq: Seq) -> bool {
        self.entries
            .lock()
            .map
            .get(&seq)
            .is_some_and(|e| e.sent_at.is_some())
    }

    /// Get statistics
    pub fn stats(&self) -> &PendingStats {
        &self.stats
    }
}
