// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Scheduler and Parameter Service Integration Tests
//!
//! End-to-end tests over the simulated RS-485 bus:
//!
//! - Happy-path polling into the store and the live stream
//! - Timeout, stale and recovery behaviour
//! - Pause/resume lease protocol
//! - Parameter brackets preempting polling
//! - Registry reload and restart

use std::sync::Arc;
use std::time::Duration;

use pyrowatch_buffer::{BufferConfig, StoreSink, WriteBackBuffer};
use pyrowatch_core::bus::{ReadingBus, ReadingSubscriber};
use pyrowatch_core::types::{Reading, ReadingStatus};
use pyrowatch_poller::{
    Parameter, ParameterService, ParamError, PollingScheduler, SchedulerConfig, SchedulerError,
};
use pyrowatch_store::{DeviceRegistry, ReadingStore};

use pyrowatch_tests::common::{
    float_device_draft, init_test_logging, scaled_device_draft, BusSim, SimFactory,
};

// =============================================================================
// Harness
// =============================================================================

struct Harness {
    registry: DeviceRegistry,
    readings: ReadingStore,
    scheduler: PollingScheduler<StoreSink>,
    params: ParameterService<StoreSink>,
    buffer: WriteBackBuffer<StoreSink>,
    live: Arc<ReadingBus>,
    sim: Arc<BusSim>,
}

async fn harness() -> Harness {
    init_test_logging();

    let pool = pyrowatch_store::connect("sqlite::memory:").await.unwrap();
    let registry = DeviceRegistry::new(pool.clone());
    let readings = ReadingStore::new(pool);

    let live = Arc::new(ReadingBus::new(64));
    let buffer = WriteBackBuffer::new(
        StoreSink::new(readings.clone()),
        BufferConfig::for_testing(),
    );
    let _flusher = buffer.start();

    let sim = BusSim::new();
    let scheduler = PollingScheduler::new(
        registry.clone(),
        buffer.clone(),
        live.clone(),
        Arc::new(SimFactory::new(sim.clone())),
        SchedulerConfig::for_testing(),
    );
    let params = ParameterService::new(
        scheduler.clone(),
        Duration::from_millis(100),
        Duration::from_millis(10),
    );

    Harness {
        registry,
        readings,
        scheduler,
        params,
        buffer,
        live,
        sim,
    }
}

/// Receives readings until `predicate` matches or the timeout elapses.
async fn await_reading(
    subscriber: &mut ReadingSubscriber,
    predicate: impl Fn(&Reading) -> bool,
    timeout: Duration,
) -> Reading {
    tokio::time::timeout(timeout, async {
        loop {
            let reading = subscriber.recv().await.expect("live bus closed");
            if predicate(&reading) {
                return reading;
            }
        }
    })
    .await
    .expect("no matching reading before timeout")
}

fn drain(subscriber: &mut ReadingSubscriber) {
    while let Ok(Some(_)) = subscriber.try_recv() {}
}

// =============================================================================
// Happy path
// =============================================================================

#[tokio::test]
async fn test_happy_poll_reaches_store_and_stream() {
    let h = harness().await;
    let device = h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    h.sim.set_register(1, 0, 300); // 30.0 °C

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();

    // Live path: one frame per poll.
    let reading = await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;
    assert_eq!(reading.device_id, device.id);
    assert_eq!(reading.value, Some(30.0));
    assert!(reading.raw_hex.as_deref().unwrap_or("").contains("01 03 02"));

    // Persistence path.
    h.buffer.flush_now();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let recent = h.readings.recent(device.id, 10).await.unwrap();
    assert!(!recent.is_empty());
    assert_eq!(recent[0].status, ReadingStatus::Ok);
    assert_eq!(recent[0].value, Some(30.0));

    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_float_layout_decodes_big_endian() {
    let h = harness().await;
    h.registry.create(&float_device_draft("Kiln", 2)).await.unwrap();
    h.sim.set_float(2, 0, 812.5);

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();

    let reading = await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;
    assert_eq!(reading.value, Some(812.5));

    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_multiple_devices_polled_in_slave_order() {
    let h = harness().await;
    h.registry.create(&scaled_device_draft("Second", 5)).await.unwrap();
    h.registry.create(&scaled_device_draft("First", 2)).await.unwrap();
    h.sim.set_register(2, 0, 100);
    h.sim.set_register(5, 0, 200);

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();

    let first = await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;
    let second = await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;
    assert_eq!(first.device_name, "First");
    assert_eq!(second.device_name, "Second");

    h.scheduler.shutdown().await;
}

// =============================================================================
// Failure and recovery
// =============================================================================

#[tokio::test]
async fn test_timeout_recovery_keeps_bus_usable() {
    let h = harness().await;
    let device = h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    h.sim.set_register(1, 0, 300);

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();

    // Establish a successful read first.
    await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;

    // Cable break: while the last success is fresh, timeouts read Err.
    h.sim.set_silent(1, true);
    let failed = await_reading(&mut sub, |r| r.status != ReadingStatus::Ok, Duration::from_secs(1)).await;
    assert_eq!(failed.status, ReadingStatus::Err);
    assert!(failed.value.is_none());
    assert!(failed.error_message.as_deref().unwrap_or("").contains("no reply"));

    // Once the silence outlives the stale window (3 cycles), timeouts read
    // Stale.
    await_reading(&mut sub, |r| r.status == ReadingStatus::Stale, Duration::from_secs(2)).await;

    // Device comes back: the next cycle is OK again.
    h.sim.set_silent(1, false);
    let recovered = await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;
    assert_eq!(recovered.device_id, device.id);

    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_failed_attempts_are_recorded_not_swallowed() {
    let h = harness().await;
    let device = h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    // Slave never configured on the sim: every poll times out.

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();

    await_reading(&mut sub, |r| r.status != ReadingStatus::Ok, Duration::from_secs(1)).await;
    h.scheduler.shutdown().await;

    h.buffer.flush_now();
    tokio::time::sleep(Duration::from_millis(50)).await;

    let recent = h.readings.recent(device.id, 5).await.unwrap();
    assert!(!recent.is_empty());
    assert!(recent.iter().all(|r| r.value.is_none()));
    assert!(recent.iter().all(|r| r.error_message.is_some()));
}

// =============================================================================
// Pause / resume
// =============================================================================

#[tokio::test]
async fn test_pause_parks_polling_and_resume_restarts_it() {
    let h = harness().await;
    h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    h.sim.set_register(1, 0, 300);

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();
    await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;

    let lease = h.scheduler.pause().await.unwrap();

    // The poll that completed just before the grant may still publish its
    // reading; give it a beat, then expect full silence.
    tokio::time::sleep(Duration::from_millis(30)).await;
    drain(&mut sub);
    let before = h.sim.request_count();
    tokio::time::sleep(Duration::from_millis(180)).await;
    assert_eq!(h.sim.request_count(), before);
    assert!(matches!(sub.try_recv(), Ok(None)));

    // A second pause fails fast while the lease is out.
    assert!(matches!(
        h.scheduler.pause().await,
        Err(SchedulerError::Busy { .. })
    ));

    h.scheduler.resume(lease).await.unwrap();
    await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;

    h.scheduler.shutdown().await;
}

// =============================================================================
// Parameter service
// =============================================================================

#[tokio::test]
async fn test_parameter_write_preempts_polling_and_verifies() {
    let h = harness().await;
    h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    h.sim.set_register(1, 0, 300);
    h.sim.set_register(1, 4, 95); // emissivity 0.95

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();
    await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;

    // The bracket pauses, writes, verifies and resumes.
    let verified = h
        .params
        .write("COM3", 1, Parameter::Emissivity, 0.70)
        .await
        .unwrap();
    assert_eq!(verified, 0.70);
    assert_eq!(h.sim.register(1, 4), Some(70));

    // Polling continues afterwards.
    await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;

    // The next read sees the committed value.
    let read_back = h.params.read("COM3", 1, Parameter::Emissivity).await.unwrap();
    assert_eq!(read_back, 0.70);

    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_parameter_validation_rejects_before_touching_the_bus() {
    let h = harness().await;
    h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    h.scheduler.start().await.unwrap();

    let before = h.sim.request_count();
    let err = h
        .params
        .write("COM3", 1, Parameter::Emissivity, 1.5)
        .await
        .unwrap_err();
    assert!(matches!(err, ParamError::Validation(_)));

    // No control transaction went out for the rejected value.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after = h.sim.request_count();
    // Polls may have run in between; verify no write frame reached slave 1.
    assert!(after >= before);
    assert_eq!(h.sim.register(1, 4), None);

    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_temp_limit_cross_validation() {
    let h = harness().await;
    h.sim.set_register(1, 8, 0); // lower limit
    h.sim.set_register(1, 9, 500); // upper limit

    // No polling running: the bracket still works on an idle bus.
    let err = h
        .params
        .write("COM3", 1, Parameter::TempLowerLimit, 600.0)
        .await
        .unwrap_err();
    assert!(matches!(err, ParamError::Validation(_)));
    assert_eq!(h.sim.register(1, 8), Some(0));

    let ok = h
        .params
        .write("COM3", 1, Parameter::TempLowerLimit, 100.0)
        .await
        .unwrap();
    assert_eq!(ok, 100.0);
}

#[tokio::test]
async fn test_read_all_parameters_in_one_bracket() {
    let h = harness().await;
    h.sim.set_register(1, 3, 100); // slope 1.00
    h.sim.set_register(1, 4, 95); // emissivity 0.95
    h.sim.set_register(1, 6, 1); // mode
    h.sim.set_register(1, 7, 60); // interval
    h.sim.set_register(1, 8, 0); // lower
    h.sim.set_register(1, 9, 1200); // upper

    let all = h.params.read_all("COM3", 1).await.unwrap();
    assert_eq!(all.slope, 1.00);
    assert_eq!(all.emissivity, 0.95);
    assert_eq!(all.measurement_mode, 1);
    assert_eq!(all.time_interval, 60);
    assert_eq!(all.temp_lower_limit, 0);
    assert_eq!(all.temp_upper_limit, 1200);
}

// =============================================================================
// Reload and restart
// =============================================================================

#[tokio::test]
async fn test_registry_change_reloads_bus_snapshot() {
    let h = harness().await;
    h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    h.sim.set_register(1, 0, 300);

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();
    await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;

    // A device added on the same bus shows up at a cycle boundary without a
    // restart.
    h.sim.set_register(7, 0, 450);
    h.registry.create(&scaled_device_draft("Furnace B", 7)).await.unwrap();

    let new_device = await_reading(
        &mut sub,
        |r| r.device_name == "Furnace B" && r.status == ReadingStatus::Ok,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(new_device.value, Some(45.0));

    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_restart_picks_up_new_bus() {
    let h = harness().await;
    h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    h.sim.set_register(1, 0, 300);

    h.scheduler.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    // A device on a brand-new port needs a restart to get its own loop.
    let mut draft = scaled_device_draft("Remote", 3);
    draft.com_port = "COM7".to_string();
    h.registry.create(&draft).await.unwrap();
    h.sim.set_register(3, 0, 555);

    let mut sub = h.live.subscribe();
    h.scheduler.restart().await.unwrap();

    let reading = await_reading(
        &mut sub,
        |r| r.device_name == "Remote" && r.status == ReadingStatus::Ok,
        Duration::from_secs(2),
    )
    .await;
    assert_eq!(reading.value, Some(55.5));

    h.scheduler.shutdown().await;
}

#[tokio::test]
async fn test_stats_reflect_activity() {
    let h = harness().await;
    h.registry.create(&scaled_device_draft("Furnace A", 1)).await.unwrap();
    h.sim.set_register(1, 0, 300);

    let mut sub = h.live.subscribe();
    h.scheduler.start().await.unwrap();
    await_reading(&mut sub, |r| r.status == ReadingStatus::Ok, Duration::from_secs(1)).await;

    let stats = h.scheduler.stats();
    assert!(stats.is_running);
    assert!(stats.cycle_count >= 1);
    assert!(stats.readings_ok >= 1);
    assert_eq!(stats.readings_dropped, 0);
    assert_eq!(stats.buses.len(), 1);
    assert!(stats.device_latency_ms.len() == 1);

    h.scheduler.shutdown().await;
    assert!(!h.scheduler.is_running());
}
