// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Write-Back Buffer Integration Tests
//!
//! The buffer against the real (in-memory) SQL store: burst behaviour,
//! swap accounting and the at-least-once-or-counted invariant.

use std::time::Duration;

use pyrowatch_buffer::{BufferConfig, StoreSink, WriteBackBuffer};
use pyrowatch_store::{DeviceRegistry, ReadingStore};

use pyrowatch_tests::common::{init_test_logging, ok_reading, scaled_device_draft};

async fn stores() -> (DeviceRegistry, ReadingStore) {
    init_test_logging();
    let pool = pyrowatch_store::connect("sqlite::memory:").await.unwrap();
    (DeviceRegistry::new(pool.clone()), ReadingStore::new(pool))
}

#[tokio::test]
async fn test_burst_is_fully_persisted_without_drops() {
    let (registry, store) = stores().await;
    let device = registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();

    let config = BufferConfig {
        threshold: 10,
        max_hold: Duration::from_millis(40),
        ..BufferConfig::for_testing()
    };
    let buffer = WriteBackBuffer::new(StoreSink::new(store.clone()), config);
    let flusher = buffer.start();

    // A burst well past several thresholds, paced so flushes can land.
    for i in 0..100 {
        buffer.append(ok_reading(&device, i as f32)).unwrap();
        if i % 10 == 9 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    buffer.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), flusher).await;

    let stats = buffer.stats();
    assert_eq!(stats.total_flushed, 100);
    assert_eq!(stats.total_dropped, 0);
    assert!(stats.swaps >= 10);

    assert_eq!(store.stats().await.unwrap().total_readings, 100);
}

#[tokio::test]
async fn test_shutdown_persists_partial_slot() {
    let (registry, store) = stores().await;
    let device = registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();

    let buffer = WriteBackBuffer::new(StoreSink::new(store.clone()), BufferConfig::for_testing());
    let flusher = buffer.start();

    buffer.append(ok_reading(&device, 1.0)).unwrap();
    buffer.append(ok_reading(&device, 2.0)).unwrap();

    buffer.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(1), flusher).await;

    assert_eq!(store.stats().await.unwrap().total_readings, 2);
}

#[tokio::test]
async fn test_flushed_plus_dropped_accounts_for_every_accepted_reading() {
    // A reading for a device that does not exist violates the readings
    // foreign key: the batch is a permanent failure and must be counted as
    // dropped, not retried forever and not lost silently.
    let (registry, store) = stores().await;
    let real = registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    let mut ghost = real.clone();
    ghost.id = pyrowatch_core::types::DeviceId::new(999);

    let buffer = WriteBackBuffer::new(StoreSink::new(store.clone()), BufferConfig::for_testing());
    let flusher = buffer.start();

    let mut accepted = 0u64;
    for i in 0..4 {
        let device = if i % 2 == 0 { &real } else { &ghost };
        if buffer.append(ok_reading(device, i as f32)).is_ok() {
            accepted += 1;
        }
    }

    buffer.shutdown();
    let _ = tokio::time::timeout(Duration::from_secs(2), flusher).await;

    let stats = buffer.stats();
    assert_eq!(stats.total_flushed + stats.total_dropped, accepted);
    // The poisoned batch went down whole (batches fail atomically).
    assert_eq!(stats.total_dropped, 4);
}
