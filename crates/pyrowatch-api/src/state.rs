// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Application state shared across handlers.

use std::sync::Arc;

use tokio::sync::Mutex;

use pyrowatch_buffer::StoreSink;
use pyrowatch_config::ServiceConfig;
use pyrowatch_core::bus::ReadingBus;
use pyrowatch_poller::{ParameterService, PauseLease, PollingScheduler};
use pyrowatch_store::{DeviceRegistry, ReadingStore};

/// The production scheduler type (flushing into the SQL store).
pub type Scheduler = PollingScheduler<StoreSink>;

/// The production parameter service type.
pub type Params = ParameterService<StoreSink>;

// =============================================================================
// AppState
// =============================================================================

/// State container passed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// Process configuration.
    pub config: Arc<ServiceConfig>,
    /// Device registry.
    pub registry: DeviceRegistry,
    /// Reading store.
    pub readings: ReadingStore,
    /// Polling scheduler.
    pub scheduler: Scheduler,
    /// Parameter service.
    pub params: Params,
    /// Live reading bus for the websocket stream.
    pub live: Arc<ReadingBus>,
    /// The lease held by an operator-initiated `/polling/pause`.
    pub operator_lease: Arc<Mutex<Option<PauseLease>>>,
}

impl AppState {
    /// Assembles the state from its parts.
    pub fn new(
        config: Arc<ServiceConfig>,
        registry: DeviceRegistry,
        readings: ReadingStore,
        scheduler: Scheduler,
        params: Params,
        live: Arc<ReadingBus>,
    ) -> Self {
        Self {
            config,
            registry,
            readings,
            scheduler,
            params,
            live,
            operator_lease: Arc::new(Mutex::new(None)),
        }
    }
}
