// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! The polling scheduler.
//!
//! # Per-bus loop
//!
//! Each loop runs the same cycle: gate on the run state, take a device
//! snapshot (refreshed at cycle boundaries when the registry changed),
//! poll each device in slave-id order through the bus arbiter, hand every
//! reading to the buffer and the live bus, then sleep until
//! `cycle_start + poll_interval`. An overrunning cycle starts the next one
//! immediately and bumps the slow-cycle counter.
//!
//! # Pause protocol
//!
//! `pause()` flips the run state and waits until no transaction is in
//! flight on any bus, bounded by `max_pause_wait`. Loops increment the
//! in-flight count *before* re-checking the run state, so a granted pause
//! can never race a freshly submitted poll. The returned lease must be
//! presented to `resume()`; a second pause while one is outstanding fails
//! fast with `Busy`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use pyrowatch_buffer::{BufferStats, ReadingSink, WriteBackBuffer};
use pyrowatch_core::bus::ReadingBus;
use pyrowatch_core::types::{format_raw_hex, Device, Reading, ReadingStatus};
use pyrowatch_modbus::transport::{RtuTransport, SerialSettings, SerialTransport};
use pyrowatch_modbus::{
    build_read_request, decode_temperature, parse_read_response, read_reply_len, ArbiterStats,
    BusArbiter, BusHandle, ModbusError, Transaction, TxnKind,
};
use pyrowatch_store::DeviceRegistry;

use crate::error::SchedulerError;

// =============================================================================
// Configuration
// =============================================================================

/// Scheduler timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Cycle period per bus.
    pub poll_interval: Duration,
    /// Upper bound on one transaction's deadline.
    pub modbus_timeout: Duration,
    /// Lower bound on one transaction's deadline.
    pub min_device_timeout: Duration,
    /// Age of the last successful read beyond which timeouts read `Stale`.
    pub stale_window: Duration,
    /// How long a pause may wait for in-flight transactions.
    pub max_pause_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        let poll_interval = Duration::from_secs(5);
        Self {
            poll_interval,
            modbus_timeout: Duration::from_secs(5),
            min_device_timeout: Duration::from_millis(200),
            stale_window: poll_interval * 3,
            max_pause_wait: Duration::from_secs(2),
        }
    }
}

impl SchedulerConfig {
    /// Fast timers for tests.
    pub fn for_testing() -> Self {
        let poll_interval = Duration::from_millis(50);
        Self {
            poll_interval,
            modbus_timeout: Duration::from_millis(100),
            min_device_timeout: Duration::from_millis(20),
            stale_window: poll_interval * 3,
            max_pause_wait: Duration::from_millis(500),
        }
    }
}

// =============================================================================
// Transport factory
// =============================================================================

/// Creates the transport for a bus when its arbiter is first needed.
///
/// The seam exists so tests can drive the scheduler against scripted
/// transports instead of real serial ports.
pub trait TransportFactory: Send + Sync + 'static {
    /// Creates a transport for `(port, baud)`.
    fn create(&self, port: &str, baud_rate: u32) -> Box<dyn RtuTransport>;
}

/// Production factory: real serial ports, 8N1.
pub struct SerialFactory;

impl TransportFactory for SerialFactory {
    fn create(&self, port: &str, baud_rate: u32) -> Box<dyn RtuTransport> {
        Box::new(SerialTransport::new(SerialSettings::new(port, baud_rate)))
    }
}

// =============================================================================
// Run state and lease
// =============================================================================

/// Scheduler run state, observed by every bus loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Loops are polling.
    Running,
    /// Loops are parked; the bus is free for control transactions.
    Paused,
    /// Loops are exiting.
    Stopping,
}

/// Token returned by [`PollingScheduler::pause`].
///
/// Must be presented to `resume`; prevents an unrelated caller from
/// resuming somebody else's bracket.
#[derive(Debug)]
#[must_use = "a pause lease must be resumed"]
pub struct PauseLease {
    token: u64,
}

// =============================================================================
// Stats
// =============================================================================

#[derive(Debug, Default)]
struct AtomicSchedulerStats {
    cycles: AtomicU64,
    slow_cycles: AtomicU64,
    readings_ok: AtomicU64,
    readings_err: AtomicU64,
    readings_dropped: AtomicU64,
}

/// One bus in the stats snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusSnapshot {
    /// `port@baud` label.
    pub bus: String,
    /// Arbiter counters.
    pub arbiter: ArbiterStats,
}

/// Scheduler statistics snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingStats {
    /// Whether loops are running.
    pub is_running: bool,
    /// Completed cycles across all buses.
    pub cycle_count: u64,
    /// Cycles that overran the poll interval.
    pub slow_cycles: u64,
    /// Successful readings.
    pub readings_ok: u64,
    /// Failed readings.
    pub readings_err: u64,
    /// Readings rejected by a full buffer.
    pub readings_dropped: u64,
    /// Last observed per-device poll latency in milliseconds.
    pub device_latency_ms: HashMap<i64, u64>,
    /// Per-bus arbiter counters.
    pub buses: Vec<BusSnapshot>,
    /// Write-back buffer snapshot.
    pub buffer_stats: BufferStats,
}

// =============================================================================
// PollingScheduler
// =============================================================================

/// One scheduler per process, owning the per-bus polling loops.
pub struct PollingScheduler<S: ReadingSink> {
    inner: Arc<SchedulerInner<S>>,
}

impl<S: ReadingSink> Clone for PollingScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

struct SchedulerInner<S: ReadingSink> {
    registry: DeviceRegistry,
    buffer: WriteBackBuffer<S>,
    live: Arc<ReadingBus>,
    factory: Arc<dyn TransportFactory>,
    config: SchedulerConfig,

    state_tx: watch::Sender<RunState>,
    reload_tx: watch::Sender<u64>,
    in_flight_tx: watch::Sender<u32>,

    lease: Mutex<Option<u64>>,
    lease_counter: AtomicU64,

    arbiters: StdMutex<HashMap<(String, u32), BusHandle>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,

    stats: AtomicSchedulerStats,
    device_latency_ms: StdMutex<HashMap<i64, u64>>,
}

impl<S: ReadingSink> PollingScheduler<S> {
    /// Creates a scheduler. Loops start on [`start`](Self::start).
    pub fn new(
        registry: DeviceRegistry,
        buffer: WriteBackBuffer<S>,
        live: Arc<ReadingBus>,
        factory: Arc<dyn TransportFactory>,
        config: SchedulerConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(RunState::Running);
        let (reload_tx, _) = watch::channel(0);
        let (in_flight_tx, _) = watch::channel(0);

        Self {
            inner: Arc::new(SchedulerInner {
                registry,
                buffer,
                live,
                factory,
                config,
                state_tx,
                reload_tx,
                in_flight_tx,
                lease: Mutex::new(None),
                lease_counter: AtomicU64::new(0),
                arbiters: StdMutex::new(HashMap::new()),
                loops: Mutex::new(Vec::new()),
                running: AtomicBool::new(false),
                stats: AtomicSchedulerStats::default(),
                device_latency_ms: StdMutex::new(HashMap::new()),
            }),
        }
    }

    /// Reads the registry, groups enabled devices by bus and spawns one
    /// loop per bus. Idempotent while running.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            warn!("polling scheduler already running");
            return Ok(());
        }

        self.inner.state_tx.send_replace(RunState::Running);

        let devices = self.inner.registry.list(true).await?;
        let mut buses: HashMap<(String, u32), Vec<Device>> = HashMap::new();
        for device in devices {
            buses
                .entry((device.com_port.clone(), device.baud_rate.value()))
                .or_default()
                .push(device);
        }

        let mut loops = self.inner.loops.lock().await;

        for ((port, baud), mut bus_devices) in buses {
            bus_devices.sort_by_key(|d| (d.slave_id, d.id));
            let handle = self.arbiter_for(&port, baud);
            let inner = self.inner.clone();
            info!(bus = %handle.label(), devices = bus_devices.len(), "bus loop starting");
            loops.push(tokio::spawn(bus_loop(inner, port, baud, handle, bus_devices)));
        }

        // Registry mutations reload the loops at their next cycle boundary.
        loops.push(tokio::spawn(config_change_forwarder(self.inner.clone())));

        info!(buses = loops.len().saturating_sub(1), "polling scheduler started");
        Ok(())
    }

    /// Signals every loop to stop and waits for them.
    pub async fn shutdown(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return;
        }

        self.inner.state_tx.send_replace(RunState::Stopping);
        let mut loops = self.inner.loops.lock().await;
        for handle in loops.drain(..) {
            let _ = handle.await;
        }
        info!("polling scheduler stopped");
    }

    /// Stops the loops, clears any stale lease and starts again from a
    /// fresh registry read.
    pub async fn restart(&self) -> Result<(), SchedulerError> {
        self.shutdown().await;
        *self.inner.lease.lock().await = None;
        self.start().await
    }

    /// Pauses polling and returns the lease once every bus is quiescent.
    ///
    /// Fails with `Busy` when a lease is already outstanding or the
    /// in-flight transaction does not finish within `max_pause_wait`.
    pub async fn pause(&self) -> Result<PauseLease, SchedulerError> {
        let mut lease_slot = self.inner.lease.lock().await;
        if lease_slot.is_some() {
            return Err(SchedulerError::busy("a pause lease is already outstanding"));
        }

        self.inner.state_tx.send_replace(RunState::Paused);

        let mut in_flight = self.inner.in_flight_tx.subscribe();
        let quiesced = tokio::time::timeout(
            self.inner.config.max_pause_wait,
            in_flight.wait_for(|count| *count == 0),
        )
        .await;

        match quiesced {
            Ok(Ok(_)) => {}
            _ => {
                self.inner.state_tx.send_replace(RunState::Running);
                return Err(SchedulerError::busy(
                    "in-flight transaction did not finish within the pause budget",
                ));
            }
        }

        let token = self.inner.lease_counter.fetch_add(1, Ordering::SeqCst) + 1;
        *lease_slot = Some(token);
        debug!(token, "polling paused");
        Ok(PauseLease { token })
    }

    /// Resumes polling. The lease must be the outstanding one.
    pub async fn resume(&self, lease: PauseLease) -> Result<(), SchedulerError> {
        let mut lease_slot = self.inner.lease.lock().await;
        if *lease_slot != Some(lease.token) {
            return Err(SchedulerError::InvalidLease);
        }
        *lease_slot = None;
        self.inner.state_tx.send_replace(RunState::Running);
        debug!(token = lease.token, "polling resumed");
        Ok(())
    }

    /// Signals every loop to re-read the registry at its next cycle
    /// boundary.
    pub fn reload(&self) {
        self.inner.reload_tx.send_modify(|generation| *generation += 1);
    }

    /// Whether the loops are running.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Returns the arbiter handle for a bus, creating it on first use.
    ///
    /// The parameter service uses this to reach buses the scheduler also
    /// polls (or idle ones, at the default baud).
    pub fn arbiter_for(&self, port: &str, baud_rate: u32) -> BusHandle {
        let mut arbiters = self.inner.arbiters.lock().expect("arbiter map poisoned");
        arbiters
            .entry((port.to_string(), baud_rate))
            .or_insert_with(|| BusArbiter::spawn(self.inner.factory.create(port, baud_rate)))
            .clone()
    }

    /// Returns the arbiter for any bus on `port`, falling back to a new
    /// arbiter at 9600 baud when the port is not currently polled.
    pub fn control_arbiter(&self, port: &str) -> BusHandle {
        let existing = {
            let arbiters = self.inner.arbiters.lock().expect("arbiter map poisoned");
            arbiters
                .iter()
                .find(|((p, _), _)| p == port)
                .map(|(_, handle)| handle.clone())
        };
        existing.unwrap_or_else(|| self.arbiter_for(port, 9600))
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> PollingStats {
        let buses = {
            let arbiters = self.inner.arbiters.lock().expect("arbiter map poisoned");
            arbiters
                .values()
                .map(|handle| BusSnapshot {
                    bus: handle.label().to_string(),
                    arbiter: handle.stats(),
                })
                .collect()
        };

        PollingStats {
            is_running: self.is_running(),
            cycle_count: self.inner.stats.cycles.load(Ordering::Relaxed),
            slow_cycles: self.inner.stats.slow_cycles.load(Ordering::Relaxed),
            readings_ok: self.inner.stats.readings_ok.load(Ordering::Relaxed),
            readings_err: self.inner.stats.readings_err.load(Ordering::Relaxed),
            readings_dropped: self.inner.stats.readings_dropped.load(Ordering::Relaxed),
            device_latency_ms: self
                .inner
                .device_latency_ms
                .lock()
                .expect("latency map poisoned")
                .clone(),
            buses,
            buffer_stats: self.inner.buffer.stats(),
        }
    }
}

// =============================================================================
// Bus loop
// =============================================================================

async fn config_change_forwarder<S: ReadingSink>(inner: Arc<SchedulerInner<S>>) {
    let mut changes = inner.registry.subscribe_changes();
    let mut state_rx = inner.state_tx.subscribe();

    loop {
        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    return;
                }
                inner.reload_tx.send_modify(|generation| *generation += 1);
                debug!("device registry changed, reload signalled");
            }
            _ = state_rx.wait_for(|state| *state == RunState::Stopping) => return,
        }
    }
}

async fn bus_loop<S: ReadingSink>(
    inner: Arc<SchedulerInner<S>>,
    port: String,
    baud_rate: u32,
    handle: BusHandle,
    mut devices: Vec<Device>,
) {
    let mut state_rx = inner.state_tx.subscribe();
    let mut reload_rx = inner.reload_tx.subscribe();
    let mut last_ok: HashMap<i64, Instant> = HashMap::new();

    'cycles: loop {
        // Run-state gate.
        loop {
            let state = *state_rx.borrow_and_update();
            match state {
                RunState::Running => break,
                RunState::Paused => {
                    if state_rx.changed().await.is_err() {
                        return;
                    }
                }
                RunState::Stopping => return,
            }
        }

        // Reload at the cycle boundary.
        if reload_rx.has_changed().unwrap_or(false) {
            reload_rx.borrow_and_update();
            match inner.registry.list(true).await {
                Ok(all) => {
                    devices = all
                        .into_iter()
                        .filter(|d| d.com_port == port && d.baud_rate.value() == baud_rate)
                        .collect();
                    devices.sort_by_key(|d| (d.slave_id, d.id));
                    debug!(bus = %handle.label(), devices = devices.len(), "device snapshot reloaded");
                }
                Err(e) => warn!(bus = %handle.label(), error = %e, "registry reload failed"),
            }
        }

        let cycle_start = Instant::now();
        inner.stats.cycles.fetch_add(1, Ordering::Relaxed);

        for device in &devices {
            // The in-flight count goes up before the state re-check, so a
            // granted pause can never overlap a new submission.
            inner.in_flight_tx.send_modify(|count| *count += 1);
            let state = *state_rx.borrow();
            if state != RunState::Running {
                inner.in_flight_tx.send_modify(|count| *count -= 1);
                match state {
                    RunState::Stopping => return,
                    _ => continue 'cycles,
                }
            }

            let elapsed = cycle_start.elapsed();
            let deadline = device_deadline(
                inner.config.poll_interval.saturating_sub(elapsed),
                inner.config.min_device_timeout,
                inner.config.modbus_timeout,
            );

            let started = Instant::now();
            let outcome = poll_device(&handle, device, deadline).await;
            inner.in_flight_tx.send_modify(|count| *count -= 1);

            let latency_ms = started.elapsed().as_millis() as u64;
            inner
                .device_latency_ms
                .lock()
                .expect("latency map poisoned")
                .insert(device.id.value(), latency_ms);

            let reading = match outcome {
                Ok(reading) => {
                    last_ok.insert(device.id.value(), Instant::now());
                    inner.stats.readings_ok.fetch_add(1, Ordering::Relaxed);
                    reading
                }
                Err((error, raw_hex)) => {
                    inner.stats.readings_err.fetch_add(1, Ordering::Relaxed);
                    let last_ok_age = last_ok.get(&device.id.value()).map(|t| t.elapsed());
                    let status =
                        failure_status(&error, last_ok_age, inner.config.stale_window);
                    Reading::failed(device, status, raw_hex, error.to_string())
                }
            };

            if let Err(e) = inner.buffer.append(reading.clone()) {
                inner.stats.readings_dropped.fetch_add(1, Ordering::Relaxed);
                warn!(device = %device.id, error = %e, "reading dropped, buffer full");
            }
            inner.live.publish(reading);
        }

        // Tick boundary: cycle_start + poll_interval, or immediately after
        // an overrun.
        let elapsed = cycle_start.elapsed();
        if elapsed >= inner.config.poll_interval {
            inner.stats.slow_cycles.fetch_add(1, Ordering::Relaxed);
            continue;
        }
        let sleep = inner.config.poll_interval - elapsed;
        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            changed = state_rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }
    }
}

async fn poll_device(
    handle: &BusHandle,
    device: &Device,
    deadline: Duration,
) -> Result<Reading, (ModbusError, Option<String>)> {
    let request = build_read_request(
        device.slave_id,
        device.function_code.code(),
        device.start_register,
        device.register_count,
    );
    let expected_len = read_reply_len(device.register_count);

    let bytes = handle
        .submit(Transaction {
            kind: TxnKind::Poll,
            slave_id: device.slave_id,
            request,
            expected_len,
            deadline,
        })
        .await
        .map_err(|e| (e, None))?;

    let raw_hex = format_raw_hex(&bytes);

    let payload = parse_read_response(
        &bytes,
        device.slave_id,
        device.function_code.code(),
        2 * device.register_count as usize,
    )
    .map_err(|e| (e, Some(raw_hex.clone())))?;

    let decoded =
        decode_temperature(&payload, device.layout).map_err(|e| (e, Some(raw_hex.clone())))?;

    Ok(Reading::ok(device, decoded.value, decoded.ambient, raw_hex))
}

/// Deadline for one device: the remainder of the cycle, bounded below by
/// the minimum device timeout and above by the Modbus timeout.
fn device_deadline(remaining: Duration, min: Duration, max: Duration) -> Duration {
    remaining.min(max).max(min)
}

/// Status for a failed attempt: a timeout reads `Stale` once the last
/// successful read is older than the stale window (or never happened);
/// every other failure is `Err`.
fn failure_status(
    error: &ModbusError,
    last_ok_age: Option<Duration>,
    stale_window: Duration,
) -> ReadingStatus {
    if !error.is_timeout() {
        return ReadingStatus::Err;
    }
    match last_ok_age {
        Some(age) if age <= stale_window => ReadingStatus::Err,
        _ => ReadingStatus::Stale,
    }
}

// =============================================================================
// Tests
// =============================================================================
