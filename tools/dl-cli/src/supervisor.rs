//! Reconnect supervisor.
//!
//! The client never reconnects on its own. While the client reports
//! `Connecting` with no transport session alive, the supervisor waits out an
//! exponential backoff and opens a new session. An explicit close ends it.

use std::time::Duration;

use dl_04_client::Client;
use shared_types::ConnectionStatus;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Delay before the first reconnect attempt.
pub const RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);

/// Upper bound on the reconnect delay.
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);

/// How often a dangling connect attempt is re-checked.
const SESSION_CHECK_INTERVAL: Duration = Duration::from_millis(100);

/// Exponential backoff between reconnect attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: RECONNECT_BASE_DELAY,
            max: MAX_RECONNECT_DELAY,
        }
    }
}

impl Backoff {
    /// Delay before attempt number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        std::cmp::min(
            self.base.saturating_mul(1 << attempt.min(16)),
            self.max,
        )
    }
}

/// Keep `client` connected until it is closed.
pub async fn supervise(client: Client, backoff: Backoff) {
    let mut changes = client.status_changes();
    let mut attempts: u32 = 0;

    loop {
        let state = client.status();
        match state.status {
            ConnectionStatus::Disconnected => {
                debug!("Client closed, supervisor stopping");
                return;
            }
            ConnectionStatus::Connected => {
                attempts = 0;
                if changes.recv().await.is_none() {
                    return;
                }
            }
            ConnectionStatus::Connecting if client.is_session_active() => {
                tokio::select! {
                    change = changes.recv() => {
                        if change.is_none() {
                            return;
                        }
                    }
                    _ = sleep(SESSION_CHECK_INTERVAL) => {}
                }
            }
            ConnectionStatus::Connecting => {
                let delay = backoff.delay(attempts);
                attempts = attempts.saturating_add(1);
                warn!(
                    attempt = attempts,
                    delay_ms = delay.as_millis() as u64,
                    reason = state.detail.as_deref().unwrap_or("connection closed"),
                    "Reconnecting"
                );
                sleep(delay).await;
                if client.status().is(ConnectionStatus::Disconnected) {
                    return;
                }
                client.open();
            }
        }
    }
}
