//! # Publishing Side
//!
//! [`Bus`] wraps a `tokio::sync::broadcast` sender and counts what went
//! through it.

use crate::subscriber::{EventStream, Filter, Subscription};
use crate::DEFAULT_CHANNEL_CAPACITY;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::trace;

/// Something events can be pushed into without waiting.
pub trait EventPublisher<T>: Send + Sync {
    /// Hand `event` to every current subscriber; returns how many there were.
    fn publish(&self, event: T) -> usize;

    /// Events offered so far, including those nobody was listening for.
    fn published(&self) -> u64;
}

/// In-memory fan-out bus.
///
/// Sending is synchronous and never waits on subscribers.
pub struct Bus<T> {
    sender: broadcast::Sender<T>,
    published: AtomicU64,
    capacity: usize,
}

impl<T: Clone + Send + 'static> Bus<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bus whose subscribers each buffer up to `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Subscribe to every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription::new(self.sender.subscribe(), None)
    }

    /// Subscribe to the events for which `filter` returns true.
    #[must_use]
    pub fn subscribe_filtered<F>(&self, filter: F) -> Subscription<T>
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let filter: Filter<T> = Arc::new(filter);
        Subscription::new(self.sender.subscribe(), Some(filter))
    }

    #[must_use]
    pub fn event_stream(&self) -> EventStream<T> {
        EventStream::new(self.subscribe())
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T: Clone + Send + 'static> Default for Bus<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> EventPublisher<T> for Bus<T> {
    fn publish(&self, event: T) -> usize {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(event).unwrap_or_else(|_| {
            trace!("No subscribers, event dropped");
            0
        })
    }

    fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unheard_events_still_counted() {
        let bus: Bus<&'static str> = Bus::new();
        assert_eq!(bus.publish("state-changed"), 0);
        assert_eq!(bus.published(), 1);
    }

    #[tokio::test]
    async fn test_filters_apply_on_receive() {
        let bus: Bus<String> = Bus::with_capacity(16);
        let mut all = bus.subscribe();
        let mut gpio = bus.subscribe_filtered(|s: &String| s.starts_with("gpio"));

        assert_eq!(bus.publish("wifi/scan".to_string()), 2);
        assert_eq!(bus.publish("gpio/level".to_string()), 2);

        assert_eq!(all.recv().await.as_deref(), Some("wifi/scan"));
        assert_eq!(gpio.recv().await.as_deref(), Some("gpio/level"));
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let bus: Bus<u8> = Bus::with_capacity(0);
        assert_eq!(bus.capacity(), 1);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
