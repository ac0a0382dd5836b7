// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Live reading fan-out.
//!
//! The [`ReadingBus`] distributes every acquired reading to an arbitrary
//! number of subscribers (websocket streams, dashboards, tests) without ever
//! blocking the publisher.
//!
//! # Slow-consumer policy
//!
//! The bus is a bounded broadcast ring (default capacity
//! [`DEFAULT_STREAM_CAPACITY`]). A subscriber that falls more than the
//! capacity behind has its oldest pending messages overwritten: on the next
//! `recv` it observes the lag, the dropped count is recorded, and it resumes
//! from the oldest retained message. Publishing completes in bounded time
//! regardless of subscriber count or subscriber health.
//!
//! # Example
//!
//! ```rust,ignore
//! let bus = ReadingBus::new(64);
//! let mut sub = bus.subscribe();
//! bus.publish(reading);
//! let received = sub.recv().await?;
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::BusError;
use crate::types::Reading;

/// Default outbound capacity per subscriber.
pub const DEFAULT_STREAM_CAPACITY: usize = 64;

// =============================================================================
// ReadingBus
// =============================================================================

/// Broadcast bus for live readings.
pub struct ReadingBus {
    sender: broadcast::Sender<Reading>,
    capacity: usize,
    stats: Arc<AtomicBusStats>,
}

#[derive(Debug, Default)]
struct AtomicBusStats {
    published: AtomicU64,
    dropped: AtomicU64,
}

impl ReadingBus {
    /// Creates a new bus with the given ring capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            stats: Arc::new(AtomicBusStats::default()),
        }
    }

    /// Publishes a reading to all subscribers.
    ///
    /// Never blocks and never fails; with no subscribers the reading is
    /// simply discarded. Returns the number of subscribers that will see it.
    pub fn publish(&self, reading: Reading) -> usize {
        self.stats.published.fetch_add(1, Ordering::Relaxed);
        self.sender.send(reading).unwrap_or(0)
    }

    /// Creates a new subscriber.
    pub fn subscribe(&self) -> ReadingSubscriber {
        ReadingSubscriber {
            receiver: self.sender.subscribe(),
            stats: self.stats.clone(),
        }
    }

    /// Returns the current number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Returns the ring capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> BusStats {
        BusStats {
            published: self.stats.published.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            subscriber_count: self.subscriber_count() as u64,
        }
    }
}

impl Default for ReadingBus {
    fn default() -> Self {
        Self::new(DEFAULT_STREAM_CAPACITY)
    }
}

impl std::fmt::Debug for ReadingBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadingBus")
            .field("capacity", &self.capacity)
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Statistics for the reading bus.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct BusStats {
    /// Total readings published.
    pub published: u64,
    /// Readings skipped by lagging subscribers.
    pub dropped: u64,
    /// Current number of subscribers.
    pub subscriber_count: u64,
}

// =============================================================================
// ReadingSubscriber
// =============================================================================

/// A subscription to the reading bus.
///
/// Dropping the subscriber releases its slot in the ring.
pub struct ReadingSubscriber {
    receiver: broadcast::Receiver<Reading>,
    stats: Arc<AtomicBusStats>,
}

impl ReadingSubscriber {
    /// Receives the next reading.
    ///
    /// A lagging subscriber transparently skips the overwritten messages and
    /// continues from the oldest retained one; the skipped count is added to
    /// the bus statistics.
    pub async fn recv(&mut self) -> Result<Reading, BusError> {
        loop {
            match self.receiver.recv().await {
                Ok(reading) => return Ok(reading),
                Err(broadcast::error::RecvError::Closed) => return Err(BusError::Closed),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    self.stats.dropped.fetch_add(count, Ordering::Relaxed);
                    tracing::warn!(count, "slow reading subscriber, oldest messages dropped");
                }
            }
        }
    }

    /// Tries to receive without waiting.
    pub fn try_recv(&mut self) -> Result<Option<Reading>, BusError> {
        match self.receiver.try_recv() {
            Ok(reading) => Ok(Some(reading)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(BusError::Closed),
            Err(broadcast::error::TryRecvError::Lagged(count)) => {
                self.stats.dropped.fetch_add(count, Ordering::Relaxed);
                Ok(None)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DeviceId, ReadingStatus};
    use chrono::Utc;

    fn reading(seq: i64) -> Reading {
        Reading {
            id: None,
            device_id: DeviceId::new(1),
            device_name: "Furnace A".to_string(),
            timestamp: Utc::now(),
            value: Some(seq as f32),
            ambient_temp: None,
            status: ReadingStatus::Ok,
            raw_hex: None,
            error_message: None,
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = ReadingBus::new(16);
        let mut sub = bus.subscribe();

        assert_eq!(bus.publish(reading(1)), 1);

        let received = sub.recv().await.unwrap();
        assert_eq!(received.value, Some(1.0));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_discarded() {
        let bus = ReadingBus::new(16);
        assert_eq!(bus.publish(reading(1)), 0);
        assert_eq!(bus.stats().published, 1);
    }

    #[tokio::test]
    async fn test_multiple_subscribers_see_every_reading() {
        let bus = ReadingBus::new(16);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        assert_eq!(bus.publish(reading(7)), 2);

        assert_eq!(sub1.recv().await.unwrap().value, Some(7.0));
        assert_eq!(sub2.recv().await.unwrap().value, Some(7.0));
    }

    #[tokio::test]
    async fn test_slow_subscriber_drops_oldest_and_recovers() {
        let bus = ReadingBus::new(4);
        let mut sub = bus.subscribe();

        // Overfill the ring while the subscriber sleeps.
        for seq in 0..10 {
            bus.publish(reading(seq));
        }

        // The first recv observes the lag, skips the overwritten messages
        // and resumes from the oldest retained one.
        let first = sub.recv().await.unwrap();
        assert_eq!(first.value, Some(6.0));
        assert!(bus.stats().dropped >= 6);

        // The remaining ring contents are still delivered in order.
        assert_eq!(sub.recv().await.unwrap().value, Some(7.0));
        assert_eq!(sub.recv().await.unwrap().value, Some(8.0));
        assert_eq!(sub.recv().await.unwrap().value, Some(9.0));
    }

    #[tokio::test]
    async fn test_dropped_subscriber_releases_slot() {
        let bus = ReadingBus::new(16);
        let sub = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
