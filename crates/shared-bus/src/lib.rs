//! # Shared Bus - Fan-out Channel
//!
//! Publish/subscribe primitive behind every consumer-facing stream of the
//! Device-Link client (connection status, incoming frames, request
//! lifecycle).
//!
//! ```text
//!                  publish()                     subscribe()
//! ┌──────────────┐ ───────► ┌──────────────┐ ───────► ┌──────────────┐
//! │    Client    │          │     Bus<T>   │ ───────► │  consumer B  │
//! └──────────────┘          └──────────────┘ ───────► │  consumer C  │
//!                                                     └──────────────┘
//! ```
//!
//! ## Delivery Rules
//!
//! - Publishing never blocks, whatever the subscribers are doing.
//! - Each subscriber gets its own clone of every event published after it
//!   subscribed.
//! - A subscriber that falls more than `capacity` events behind skips the
//!   oldest ones; other subscribers are unaffected.
//! - Dropping a [`Subscription`] unsubscribes.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod publisher;
pub mod subscriber;

pub use publisher::{Bus, EventPublisher};
pub use subscriber::{EventStream, Subscription, SubscriptionError};

/// Maximum events to buffer per subscriber before it starts lagging.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_capacity() {
        assert_eq!(DEFAULT_CHANNEL_CAPACITY, 1000);
    }
}
