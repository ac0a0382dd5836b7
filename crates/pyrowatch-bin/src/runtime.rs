// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Service runtime orchestration.
//!
//! Wires the components in dependency order, runs until shutdown, then
//! tears them down in reverse:
//!
//! 1. database pool + schema
//! 2. registry / reading store
//! 3. write-back buffer + flusher
//! 4. polling scheduler (one loop per bus)
//! 5. parameter service, retention task
//! 6. API server
//!
//! On shutdown the scheduler stops taking ticks and lets in-flight
//! transactions finish, the buffer performs its final swap-and-flush, and
//! only then does the pool close.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use pyrowatch_api::{ApiServer, AppState};
use pyrowatch_buffer::{BufferConfig, StoreSink, WriteBackBuffer};
use pyrowatch_config::ServiceConfig;
use pyrowatch_core::bus::ReadingBus;
use pyrowatch_poller::{ParameterService, PollingScheduler, SchedulerConfig, SerialFactory};
use pyrowatch_store::{DeviceRegistry, ReadingStore};

use crate::error::{BinError, BinResult};
use crate::shutdown::ShutdownCoordinator;

/// How often the retention horizon is applied.
const RETENTION_SWEEP_INTERVAL: Duration = Duration::from_secs(3600);

/// Settle delay between a parameter write and its verification read.
const PARAM_SETTLE_DELAY: Duration = Duration::from_secs(1);

// =============================================================================
// ServiceRuntime
// =============================================================================

/// The assembled service.
pub struct ServiceRuntime {
    config: Arc<ServiceConfig>,
    shutdown: ShutdownCoordinator,
}

impl ServiceRuntime {
    /// Creates a runtime over a loaded configuration.
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config: Arc::new(config),
            shutdown: ShutdownCoordinator::new(),
        }
    }

    /// Runs the service until SIGINT/SIGTERM.
    pub async fn run(self) -> BinResult<()> {
        info!("starting PYROWATCH v{}", crate::VERSION);

        // Storage.
        let pool = pyrowatch_store::connect(&self.config.database_url).await?;
        let registry = DeviceRegistry::new(pool.clone());
        let readings = ReadingStore::new(pool.clone());

        // Live fan-out and write-back path.
        let live = Arc::new(ReadingBus::default());
        let buffer = WriteBackBuffer::new(
            StoreSink::new(readings.clone()),
            BufferConfig::from_settings(self.config.buffer_threshold, self.config.buffer_max_hold),
        );
        let flusher = buffer.start();

        // Scheduler and parameter service.
        let scheduler = PollingScheduler::new(
            registry.clone(),
            buffer.clone(),
            live.clone(),
            Arc::new(SerialFactory),
            SchedulerConfig {
                poll_interval: self.config.poll_interval,
                modbus_timeout: self.config.modbus_timeout,
                stale_window: self.config.stale_window(),
                ..SchedulerConfig::default()
            },
        );
        scheduler.start().await?;

        let params = ParameterService::new(
            scheduler.clone(),
            self.config.modbus_timeout,
            PARAM_SETTLE_DELAY,
        );

        // Reading retention.
        let retention = tokio::spawn(retention_loop(
            readings.clone(),
            self.config.retention_days,
            self.shutdown.clone(),
        ));

        // API server.
        let state = AppState::new(
            self.config.clone(),
            registry,
            readings,
            scheduler.clone(),
            params,
            live,
        );
        let server = ApiServer::new(state);

        let _signal_listener = self.shutdown.spawn_signal_listener();

        info!(addr = %self.config.bind_addr, "PYROWATCH is ready");
        let served = server
            .run_with_shutdown(self.config.bind_addr, self.shutdown.signal_future())
            .await;

        // Teardown in reverse order.
        info!("shutting down");
        self.shutdown.initiate();
        scheduler.shutdown().await;
        buffer.shutdown();
        let _ = tokio::time::timeout(Duration::from_secs(10), flusher).await;
        let _ = tokio::time::timeout(Duration::from_secs(1), retention).await;
        pool.close().await;

        served.map_err(|e| BinError::Api(e.to_string()))?;
        info!("PYROWATCH shutdown complete");
        Ok(())
    }
}

// =============================================================================
// Retention task
// =============================================================================

/// Applies the retention horizon periodically until shutdown.
async fn retention_loop(
    readings: ReadingStore,
    retention_days: u32,
    shutdown: ShutdownCoordinator,
) {
    let mut shutdown_rx = shutdown.subscribe();
    let mut sweep = tokio::time::interval(RETENTION_SWEEP_INTERVAL);

    loop {
        tokio::select! {
            _ = sweep.tick() => {
                let cutoff = Utc::now() - chrono::Duration::days(i64::from(retention_days));
                match readings.delete_older_than(cutoff).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, retention_days, "retention sweep"),
                    Err(e) => warn!(error = %e, "retention sweep failed"),
                }
            }
            _ = shutdown_rx.recv() => return,
        }
    }
}
