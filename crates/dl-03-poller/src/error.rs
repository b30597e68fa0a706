use std::time::Duration;
use thiserror::Error;

/// Errors from poller configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PollerError {
    /// Interval must be non-zero
    #[error("invalid polling interval {0:?}")]
    InvalidInterval(Duration),
}
