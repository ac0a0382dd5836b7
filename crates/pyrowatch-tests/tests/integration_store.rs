// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Store Integration Tests
//!
//! Larger-scale checks over the reading store: CSV export laws, range
//! boundaries and retention.

use chrono::{Duration as ChronoDuration, Utc};

use pyrowatch_core::timefmt;
use pyrowatch_core::types::Reading;
use pyrowatch_store::{DeviceRegistry, ReadingStore};

use pyrowatch_tests::common::{init_test_logging, ok_reading, scaled_device_draft};

async fn stores() -> (DeviceRegistry, ReadingStore) {
    init_test_logging();
    let pool = pyrowatch_store::connect("sqlite::memory:").await.unwrap();
    (DeviceRegistry::new(pool.clone()), ReadingStore::new(pool))
}

#[tokio::test]
async fn test_csv_export_matches_history_for_same_range() {
    let (registry, store) = stores().await;
    let device = registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();

    let t0 = Utc::now();
    // 500 readings inside the range, 50 before it, 50 after it.
    let mut batch: Vec<Reading> = Vec::new();
    for i in 0..500 {
        let mut r = ok_reading(&device, 20.0 + (i % 50) as f32);
        r.timestamp = t0 + ChronoDuration::milliseconds(i * 10);
        batch.push(r);
    }
    for i in 0..50 {
        let mut r = ok_reading(&device, 1.0);
        r.timestamp = t0 - ChronoDuration::seconds(100 + i);
        batch.push(r);
    }
    for i in 0..50 {
        let mut r = ok_reading(&device, 2.0);
        r.timestamp = t0 + ChronoDuration::seconds(100 + i);
        batch.push(r);
    }
    store.append_batch(&batch).await.unwrap();

    let t1 = t0 + ChronoDuration::seconds(10);
    let history = store.history(device.id, t0, t1, None).await.unwrap();
    let csv = store.export_csv(device.id, t0, t1).await.unwrap();

    // Header plus one line per history row.
    assert_eq!(history.len(), 500);
    assert_eq!(csv.len(), history.len() + 1);

    // Rows are numbered from 1 and ordered ascending.
    assert!(csv[1].starts_with("1,"));
    assert!(csv[csv.len() - 1].starts_with(&format!("{},", history.len())));

    let first_ts = history.first().unwrap().timestamp;
    let last_ts = history.last().unwrap().timestamp;
    assert!(first_ts >= t0);
    assert!(last_ts <= t1);
    assert!(first_ts <= last_ts);

    // Data rows carry the CSV timestamp format.
    assert!(csv[1].contains(&timefmt::to_csv(first_ts)));
}

#[tokio::test]
async fn test_range_boundaries_are_inclusive() {
    let (registry, store) = stores().await;
    let device = registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();

    let t0 = Utc::now();
    let mut exact_start = ok_reading(&device, 1.0);
    exact_start.timestamp = t0;
    let mut exact_end = ok_reading(&device, 2.0);
    exact_end.timestamp = t0 + ChronoDuration::seconds(10);

    store.append_batch(&[exact_start, exact_end]).await.unwrap();

    let history = store
        .history(device.id, t0, t0 + ChronoDuration::seconds(10), None)
        .await
        .unwrap();
    assert_eq!(history.len(), 2);
}

#[tokio::test]
async fn test_readings_survive_per_device_isolation() {
    let (registry, store) = stores().await;
    let a = registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    let b = registry.create(&scaled_device_draft("Furnace B", 2)).await.unwrap();

    store
        .append_batch(&[ok_reading(&a, 1.0), ok_reading(&b, 2.0), ok_reading(&a, 3.0)])
        .await
        .unwrap();

    let start = Utc::now() - ChronoDuration::seconds(60);
    let end = Utc::now() + ChronoDuration::seconds(60);
    assert_eq!(store.history(a.id, start, end, None).await.unwrap().len(), 2);
    assert_eq!(store.history(b.id, start, end, None).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_retention_horizon_spares_recent_rows() {
    let (registry, store) = stores().await;
    let device = registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();

    let mut batch = Vec::new();
    for days_ago in [5i64, 3, 1, 0] {
        let mut r = ok_reading(&device, days_ago as f32);
        r.timestamp = Utc::now() - ChronoDuration::days(days_ago);
        batch.push(r);
    }
    store.append_batch(&batch).await.unwrap();

    let cutoff = Utc::now() - ChronoDuration::days(2);
    assert_eq!(store.delete_older_than(cutoff).await.unwrap(), 2);
    assert_eq!(store.stats().await.unwrap().total_readings, 2);
}
