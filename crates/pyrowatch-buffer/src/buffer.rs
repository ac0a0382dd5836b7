// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The ping-pong buffer and its background flusher.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use pyrowatch_core::types::Reading;

use crate::sink::{ReadingSink, SinkError};

// =============================================================================
// Configuration
// =============================================================================

/// Write-back buffer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Slot size at which the active slot swaps and a flush is scheduled.
    pub threshold: usize,

    /// Forced swap interval so a slow trickle still reaches the store.
    #[serde(with = "duration_millis")]
    pub max_hold: Duration,

    /// Flush attempts per batch before giving up.
    pub max_retries: u32,

    /// Base delay for exponential backoff.
    #[serde(with = "duration_millis")]
    pub retry_base_delay: Duration,

    /// Backoff ceiling.
    #[serde(with = "duration_millis")]
    pub max_retry_delay: Duration,

    /// Jitter factor for retries (0.0 to 1.0).
    pub jitter: f64,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            threshold: 100,
            max_hold: Duration::from_secs(5),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_secs(30),
            jitter: 0.3,
        }
    }
}

impl BufferConfig {
    /// Builds the production configuration from the service settings.
    pub fn from_settings(threshold: usize, max_hold: Duration) -> Self {
        Self {
            threshold,
            max_hold,
            ..Self::default()
        }
    }

    /// Small limits and fast timers for tests.
    pub fn for_testing() -> Self {
        Self {
            threshold: 4,
            max_hold: Duration::from_millis(50),
            max_retries: 2,
            retry_base_delay: Duration::from_millis(5),
            max_retry_delay: Duration::from_millis(20),
            jitter: 0.0,
        }
    }
}

// =============================================================================
// Errors and stats
// =============================================================================

/// Errors from `append`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Both slots are saturated; the reading was not accepted.
    #[error("write-back buffer full ({capacity} readings pending)")]
    Full {
        /// The high-water mark that was hit.
        capacity: usize,
    },
}

/// Snapshot of the buffer state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferStats {
    /// Which slot is accepting appends: `"a"` or `"b"`.
    pub active_slot: char,
    /// Readings pending in slot A.
    pub slot_a_len: usize,
    /// Readings pending in slot B.
    pub slot_b_len: usize,
    /// Whether a flush is currently in flight.
    pub flush_in_flight: bool,
    /// Swap point.
    pub threshold: usize,
    /// Readings persisted successfully.
    pub total_flushed: u64,
    /// Readings dropped after the retry budget was exhausted.
    pub total_dropped: u64,
    /// Slot swaps performed.
    pub swaps: u64,
    /// Flush batches that failed at least once.
    pub flush_failures: u64,
}

// =============================================================================
// Slots
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotId {
    A,
    B,
}

#[derive(Debug)]
struct Slots {
    a: Vec<Reading>,
    b: Vec<Reading>,
    active: SlotId,
    /// True from swap until the drained batch is resolved.
    flush_in_flight: bool,
}

impl Slots {
    fn new() -> Self {
        Self {
            a: Vec::new(),
            b: Vec::new(),
            active: SlotId::A,
            flush_in_flight: false,
        }
    }

    fn active_mut(&mut self) -> &mut Vec<Reading> {
        match self.active {
            SlotId::A => &mut self.a,
            SlotId::B => &mut self.b,
        }
    }

    fn active_len(&self) -> usize {
        match self.active {
            SlotId::A => self.a.len(),
            SlotId::B => self.b.len(),
        }
    }

    fn standby_mut(&mut self) -> &mut Vec<Reading> {
        match self.active {
            SlotId::A => &mut self.b,
            SlotId::B => &mut self.a,
        }
    }

    fn standby_len(&self) -> usize {
        match self.active {
            SlotId::A => self.b.len(),
            SlotId::B => self.a.len(),
        }
    }

    fn swap(&mut self) {
        self.active = match self.active {
            SlotId::A => SlotId::B,
            SlotId::B => SlotId::A,
        };
    }
}

// =============================================================================
// WriteBackBuffer
// =============================================================================

/// The ping-pong write-back buffer.
///
/// Clone handles freely; all clones share the same slots and flusher.
pub struct WriteBackBuffer<S: ReadingSink> {
    inner: Arc<Inner<S>>,
}

impl<S: ReadingSink> Clone for WriteBackBuffer<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct Inner<S> {
    config: BufferConfig,
    sink: S,
    slots: Mutex<Slots>,
    flush_notify: Notify,
    shutdown_notify: Notify,
    running: AtomicBool,
    total_flushed: AtomicU64,
    total_dropped: AtomicU64,
    swaps: AtomicU64,
    flush_failures: AtomicU64,
}

impl<S: ReadingSink> WriteBackBuffer<S> {
    /// Creates a buffer over `sink`.
    pub fn new(sink: S, config: BufferConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                sink,
                slots: Mutex::new(Slots::new()),
                flush_notify: Notify::new(),
                shutdown_notify: Notify::new(),
                running: AtomicBool::new(false),
                total_flushed: AtomicU64::new(0),
                total_dropped: AtomicU64::new(0),
                swaps: AtomicU64::new(0),
                flush_failures: AtomicU64::new(0),
            }),
        }
    }

    /// Starts the background flusher.
    pub fn start(&self) -> JoinHandle<()> {
        self.inner.running.store(true, Ordering::SeqCst);
        let inner = self.inner.clone();
        tokio::spawn(async move {
            debug!(
                threshold = inner.config.threshold,
                max_hold_ms = inner.config.max_hold.as_millis() as u64,
                sink = inner.sink.name(),
                "write-back flusher started"
            );
            Self::run(inner).await;
        })
    }

    /// Appends a reading to the active slot. Constant-time.
    ///
    /// # Errors
    ///
    /// [`BufferError::Full`] once `2 × threshold` readings are pending in
    /// the active slot — only reachable while a flush is stuck on a failing
    /// store. The caller (the scheduler) records the drop and continues.
    pub fn append(&self, reading: Reading) -> Result<(), BufferError> {
        let high_water = self.inner.config.threshold * 2;
        let mut slots = self.inner.slots.lock().expect("buffer lock poisoned");

        if slots.active_len() >= high_water {
            return Err(BufferError::Full {
                capacity: high_water,
            });
        }

        slots.active_mut().push(reading);

        if slots.active_len() >= self.inner.config.threshold && !slots.flush_in_flight {
            slots.swap();
            slots.flush_in_flight = true;
            self.inner.swaps.fetch_add(1, Ordering::Relaxed);
            drop(slots);
            self.inner.flush_notify.notify_one();
        }

        Ok(())
    }

    /// Forces a swap-and-flush of whatever is pending.
    pub fn flush_now(&self) {
        let mut slots = self.inner.slots.lock().expect("buffer lock poisoned");
        if !slots.flush_in_flight && slots.standby_len() == 0 && slots.active_len() > 0 {
            slots.swap();
            slots.flush_in_flight = true;
            self.inner.swaps.fetch_add(1, Ordering::Relaxed);
        }
        drop(slots);
        self.inner.flush_notify.notify_one();
    }

    /// Signals the flusher to drain both slots and stop.
    pub fn shutdown(&self) {
        self.inner.shutdown_notify.notify_one();
    }

    /// Returns `true` while the flusher runs.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> BufferStats {
        let slots = self.inner.slots.lock().expect("buffer lock poisoned");
        BufferStats {
            active_slot: match slots.active {
                SlotId::A => 'a',
                SlotId::B => 'b',
            },
            slot_a_len: slots.a.len(),
            slot_b_len: slots.b.len(),
            flush_in_flight: slots.flush_in_flight,
            threshold: self.inner.config.threshold,
            total_flushed: self.inner.total_flushed.load(Ordering::Relaxed),
            total_dropped: self.inner.total_dropped.load(Ordering::Relaxed),
            swaps: self.inner.swaps.load(Ordering::Relaxed),
            flush_failures: self.inner.flush_failures.load(Ordering::Relaxed),
        }
    }

    // =========================================================================
    // Flusher
    // =========================================================================

    async fn run(inner: Arc<Inner<S>>) {
        let mut tick = tokio::time::interval(inner.config.max_hold);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately; skip it.
        tick.tick().await;

        loop {
            tokio::select! {
                _ = inner.flush_notify.notified() => {}
                _ = tick.tick() => {
                    let mut slots = inner.slots.lock().expect("buffer lock poisoned");
                    if !slots.flush_in_flight && slots.standby_len() == 0 {
                        if slots.active_len() == 0 {
                            continue;
                        }
                        slots.swap();
                        slots.flush_in_flight = true;
                        inner.swaps.fetch_add(1, Ordering::Relaxed);
                    }
                }
                _ = inner.shutdown_notify.notified() => break,
            }

            Self::drain(&inner).await;
        }

        // Final flush: the standby first, then whatever accumulated in the
        // active slot while it drained.
        Self::drain(&inner).await;
        {
            let mut slots = inner.slots.lock().expect("buffer lock poisoned");
            if slots.active_len() > 0 {
                slots.swap();
                slots.flush_in_flight = true;
                inner.swaps.fetch_add(1, Ordering::Relaxed);
            }
        }
        Self::drain(&inner).await;

        inner.running.store(false, Ordering::SeqCst);
        debug!("write-back flusher stopped");
    }

    async fn drain(inner: &Arc<Inner<S>>) {
        let batch = {
            let mut slots = inner.slots.lock().expect("buffer lock poisoned");
            std::mem::take(slots.standby_mut())
        };

        if batch.is_empty() {
            let mut slots = inner.slots.lock().expect("buffer lock poisoned");
            slots.flush_in_flight = false;
            return;
        }

        match Self::flush_with_retry(inner, &batch).await {
            Ok(()) => {
                inner
                    .total_flushed
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                debug!(readings = batch.len(), "flush completed");
            }
            Err(e) => {
                inner
                    .total_dropped
                    .fetch_add(batch.len() as u64, Ordering::Relaxed);
                error!(
                    readings = batch.len(),
                    error = %e,
                    "flush gave up, batch dropped"
                );
            }
        }

        let flush_again = {
            let mut slots = inner.slots.lock().expect("buffer lock poisoned");
            slots.flush_in_flight = false;
            if slots.active_len() >= inner.config.threshold {
                slots.swap();
                slots.flush_in_flight = true;
                inner.swaps.fetch_add(1, Ordering::Relaxed);
                true
            } else {
                false
            }
        };
        if flush_again {
            inner.flush_notify.notify_one();
        }
    }

    async fn flush_with_retry(inner: &Arc<Inner<S>>, batch: &[Reading]) -> Result<(), SinkError> {
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match inner.sink.append_batch(batch).await {
                Ok(()) => return Ok(()),
                Err(SinkError::Permanent(message)) => {
                    inner.flush_failures.fetch_add(1, Ordering::Relaxed);
                    return Err(SinkError::Permanent(message));
                }
                Err(SinkError::Transient(message)) => {
                    inner.flush_failures.fetch_add(1, Ordering::Relaxed);
                    if attempt >= inner.config.max_retries {
                        return Err(SinkError::Transient(message));
                    }

                    let delay = calculate_backoff(attempt, &inner.config);
                    warn!(
                        attempt,
                        max_attempts = inner.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "flush failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

/// Exponential backoff with jitter.
fn calculate_backoff(attempt: u32, config: &BufferConfig) -> Duration {
    let base_ms = config.retry_base_delay.as_millis() as f64;
    let multiplied = base_ms * 2.0f64.powi(attempt.saturating_sub(1) as i32);
    let capped = multiplied.min(config.max_retry_delay.as_millis() as f64);

    let jitter_range = capped * config.jitter;
    let jitter = if jitter_range > 0.0 {
        let random: f64 = rand::random();
        (random * 2.0 - 1.0) * jitter_range
    } else {
        0.0
    };

    Duration::from_millis((capped + jitter).max(0.0) as u64)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::MockSink;
    use chrono::Utc;
    use pyrowatch_core::types::{DeviceId, ReadingStatus};
    use std::sync::Arc as StdArc;

    fn reading(seq: usize) -> Reading {
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

    /// Sink wrapper so tests can hold onto the mock after the buffer takes
    /// ownership.
    struct SharedSink(StdArc<MockSink>);

    #[async_trait::async_trait]
    impl ReadingSink for SharedSink {
        async fn append_batch(&self, batch: &[Reading]) -> Result<(), SinkError> {
            self.0.append_batch(batch).await
        }
        fn name(&self) -> &str {
            "shared-mock"
        }
    }

    fn buffer_with(
        sink: MockSink,
        config: BufferConfig,
    ) -> (WriteBackBuffer<SharedSink>, StdArc<MockSink>) {
        let shared = StdArc::new(sink);
        let buffer = WriteBackBuffer::new(SharedSink(shared.clone()), config);
        (buffer, shared)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(30)).await;
    }

    #[tokio::test]
    async fn test_threshold_swap_flushes_batch() {
        let (buffer, sink) = buffer_with(MockSink::new(), BufferConfig::for_testing());
        let handle = buffer.start();

        for seq in 0..4 {
            buffer.append(reading(seq)).unwrap();
        }
        settle().await;

        assert_eq!(sink.accepted_count(), 4);
        assert_eq!(buffer.stats().total_flushed, 4);
        assert_eq!(buffer.stats().swaps, 1);

        buffer.shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_max_hold_flushes_below_threshold() {
        let (buffer, sink) = buffer_with(MockSink::new(), BufferConfig::for_testing());
        let handle = buffer.start();

        buffer.append(reading(0)).unwrap();
        buffer.append(reading(1)).unwrap();

        // Two readings are below the threshold of four; only the max-hold
        // timer (50 ms in the test config) can move them.
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(sink.accepted_count(), 2);

        buffer.shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_appends_continue_during_flush() {
        // A sink that fails once holds the flush in flight long enough for
        // the other slot to take appends.
        let (buffer, sink) = buffer_with(MockSink::failing_transiently(1), BufferConfig::for_testing());
        let handle = buffer.start();

        for seq in 0..6 {
            buffer.append(reading(seq)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        // All six land: four from the first batch (after one retry), the
        // remaining two via the max-hold timer.
        assert_eq!(sink.accepted_count(), 6);
        assert_eq!(buffer.stats().total_dropped, 0);

        buffer.shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_high_water_rejects_appends() {
        // Flusher not started: the first swap parks four readings in the
        // standby slot, then the active slot fills to the high-water mark.
        let (buffer, _sink) = buffer_with(MockSink::new(), BufferConfig::for_testing());

        let mut accepted = 0;
        let mut rejected = 0;
        for seq in 0..20 {
            match buffer.append(reading(seq)) {
                Ok(()) => accepted += 1,
                Err(BufferError::Full { .. }) => rejected += 1,
            }
        }

        // 4 swapped out + 8 in the active slot (2 × threshold).
        assert_eq!(accepted, 12);
        assert_eq!(rejected, 8);
    }

    #[tokio::test]
    async fn test_retry_then_success() {
        let (buffer, sink) = buffer_with(MockSink::failing_transiently(1), BufferConfig::for_testing());
        let handle = buffer.start();

        for seq in 0..4 {
            buffer.append(reading(seq)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        assert_eq!(sink.accepted_count(), 4);
        assert!(sink.attempts.load(Ordering::SeqCst) >= 2);
        assert_eq!(buffer.stats().total_dropped, 0);
        assert!(buffer.stats().flush_failures >= 1);

        buffer.shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_permanent_failure_drops_batch_once() {
        let (buffer, sink) = buffer_with(MockSink::failing_permanently(), BufferConfig::for_testing());
        let handle = buffer.start();

        for seq in 0..4 {
            buffer.append(reading(seq)).unwrap();
        }
        settle().await;

        // Permanent failures skip the retry budget entirely.
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
        assert_eq!(buffer.stats().total_dropped, 4);
        assert_eq!(buffer.stats().total_flushed, 0);

        buffer.shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_transient_exhaustion_drops_and_counts() {
        let (buffer, _sink) = buffer_with(
            MockSink::failing_transiently(10),
            BufferConfig::for_testing(),
        );
        let handle = buffer.start();

        for seq in 0..4 {
            buffer.append(reading(seq)).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(100)).await;

        let stats = buffer.stats();
        assert_eq!(stats.total_dropped, 4);
        assert_eq!(stats.total_flushed, 0);

        buffer.shutdown();
        let _ = handle.await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_both_slots() {
        let (buffer, sink) = buffer_with(MockSink::new(), BufferConfig::for_testing());
        let handle = buffer.start();

        // Three readings, below threshold, no timer fired yet.
        for seq in 0..3 {
            buffer.append(reading(seq)).unwrap();
        }
        buffer.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(1), handle).await;

        assert_eq!(sink.accepted_count(), 3);
        assert!(!buffer.is_running());
    }

    #[tokio::test]
    async fn test_flush_now_moves_partial_slot() {
        let (buffer, sink) = buffer_with(MockSink::new(), BufferConfig::for_testing());
        let handle = buffer.start();

        buffer.append(reading(0)).unwrap();
        buffer.flush_now();
        settle().await;

        assert_eq!(sink.accepted_count(), 1);

        buffer.shutdown();
        let _ = handle.await;
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let config = BufferConfig {
            retry_base_delay: Duration::from_millis(100),
            max_retry_delay: Duration::from_millis(500),
            jitter: 0.0,
            ..BufferConfig::default()
        };

        assert_eq!(calculate_backoff(1, &config), Duration::from_millis(100));
        assert_eq!(calculate_backoff(2, &config), Duration::from_millis(200));
        assert_eq!(calculate_backoff(3, &config), Duration::from_millis(400));
        assert_eq!(calculate_backoff(10, &config), Duration::from_millis(500));
    }

    #[test]
    fn test_stats_snapshot_shape() {
        let buffer = WriteBackBuffer::new(MockSink::new(), BufferConfig::for_testing());
        buffer.append(reading(0)).unwrap();

        let stats = buffer.stats();
        assert_eq!(stats.active_slot, 'a');
        assert_eq!(stats.slot_a_len, 1);
        assert_eq!(stats.slot_b_len, 0);
        assert!(!stats.flush_in_flight);
    }
}
