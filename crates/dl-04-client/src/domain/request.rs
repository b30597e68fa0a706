//! Caller-facing request handle.

use futures::FutureExt;
use shared_types::{Response, Seq};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use super::error::RequestError;
use super::pending::ResponseFuture;

/// Per-call request options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestOptions {
    /// Overrides the client's default timeout
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Future of a request's outcome.
///
/// Cloning is cheap; all clones (and all deduplicated callers) observe the
/// same outcome. Dropping it does not cancel the request.
#[derive(Clone)]
#[must_use = "a request's outcome is only observable by awaiting it"]
pub struct PendingResponse {
    seq: Seq,
    inner: ResponseFuture,
}

impl PendingResponse {
    pub(crate) fn new(seq: Seq, inner: ResponseFuture) -> Self {
        Self { seq, inner }
    }

    /// Sequence number the request went out with.
    pub fn seq(&self) -> Seq {
        self.seq
    }

    /// Outcome if already settled.
    pub fn peek(&self) -> Option<&Result<Response, RequestError>> {
        self.inner.peek()
    }
}

impl std::fmt::Debug for PendingResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingResponse")
            .field("seq", &self.seq)
            .field("settled", &self.peek().is_some())
            .finish()
    }
}

impl Future for PendingResponse {
    type Output = Result<Response, RequestError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.poll_unpin(cx)
    }
}
