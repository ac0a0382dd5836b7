// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Flush targets for the write-back buffer.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use pyrowatch_core::types::Reading;
use pyrowatch_store::ReadingStore;

// =============================================================================
// SinkError
// =============================================================================

/// A failed flush, classified for the retry policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Worth retrying with backoff.
    #[error("transient store failure: {0}")]
    Transient(String),
    /// Retrying cannot help; the batch is dropped immediately.
    #[error("permanent store failure: {0}")]
    Permanent(String),
}

// =============================================================================
// ReadingSink
// =============================================================================

/// Destination for flushed reading batches.
#[async_trait]
pub trait ReadingSink: Send + Sync + 'static {
    /// Persists a batch atomically.
    async fn append_batch(&self, batch: &[Reading]) -> Result<(), SinkError>;

    /// Sink name for logging.
    fn name(&self) -> &str;
}

// =============================================================================
// StoreSink
// =============================================================================

/// The production sink: the SQL reading store.
#[derive(Clone)]
pub struct StoreSink {
    store: ReadingStore,
}

impl StoreSink {
    /// Wraps a reading store.
    pub fn new(store: ReadingStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl ReadingSink for StoreSink {
    async fn append_batch(&self, batch: &[Reading]) -> Result<(), SinkError> {
        self.store.append_batch(batch).await.map(|_| ()).map_err(|e| {
            if e.is_transient() {
                SinkError::Transient(e.to_string())
            } else {
                SinkError::Permanent(e.to_string())
            }
        })
    }

    fn name(&self) -> &str {
        "store"
    }
}

// =============================================================================
// MockSink (for tests)
// =============================================================================

/// A scriptable sink for tests.
#[derive(Debug, Default)]
pub struct MockSink {
    /// Readings accepted so far.
    pub accepted: Mutex<Vec<Reading>>,
    /// Number of successful batches.
    pub batches: AtomicU64,
    /// Total append attempts, including failed ones.
    pub attempts: AtomicU64,
    /// Fail this many calls transiently before succeeding.
    pub fail_next: AtomicU64,
    /// Fail every call permanently.
    pub fail_permanently: AtomicBool,
}

impl MockSink {
    /// Creates a sink that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a sink whose next `n` calls fail transiently.
    pub fn failing_transiently(n: u64) -> Self {
        let sink = Self::default();
        sink.fail_next.store(n, Ordering::SeqCst);
        sink
    }

    /// Creates a sink that always fails permanently.
    pub fn failing_permanently() -> Self {
        let sink = Self::default();
        sink.fail_permanently.store(true, Ordering::SeqCst);
        sink
    }

    /// Number of readings accepted.
    pub fn accepted_count(&self) -> usize {
        self.accepted.lock().unwrap().len()
    }
}

#[async_trait]
impl ReadingSink for MockSink {
    async fn append_batch(&self, batch: &[Reading]) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_permanently.load(Ordering::SeqCst) {
            return Err(SinkError::Permanent("mock permanent failure".to_string()));
        }

        let remaining = self.fail_next.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.store(remaining - 1, Ordering::SeqCst);
            return Err(SinkError::Transient("mock transient failure".to_string()));
        }

        self.accepted.lock().unwrap().extend_from_slice(batch);
        self.batches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
