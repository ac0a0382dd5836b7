// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Graceful shutdown coordination.
//!
//! One coordinator per process: OS signals (SIGTERM, SIGINT / Ctrl+C) and
//! programmatic shutdown both fan out to every subscribed component.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::info;

/// Coordinates graceful shutdown across components.
#[derive(Clone)]
pub struct ShutdownCoordinator {
    sender: broadcast::Sender<()>,
    initiated: Arc<AtomicBool>,
}

impl ShutdownCoordinator {
    /// Creates a new coordinator.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        Self {
            sender,
            initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Subscribes to shutdown notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.sender.subscribe()
    }

    /// Returns a future that resolves when shutdown is initiated.
    ///
    /// Suitable for `axum::serve(...).with_graceful_shutdown(...)`.
    pub fn signal_future(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let initiated = self.initiated.clone();
        let mut receiver = self.sender.subscribe();
        async move {
            if initiated.load(Ordering::SeqCst) {
                return;
            }
            let _ = receiver.recv().await;
        }
    }

    /// Initiates shutdown. Idempotent.
    pub fn initiate(&self) {
        if self
            .initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            info!("shutdown initiated");
            let _ = self.sender.send(());
        }
    }

    /// Returns `true` once shutdown has been initiated.
    pub fn is_initiated(&self) -> bool {
        self.initiated.load(Ordering::SeqCst)
    }

    /// Spawns a task that initiates shutdown on SIGTERM/SIGINT.
    pub fn spawn_signal_listener(&self) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            wait_for_os_signal().await;
            coordinator.initiate();
        })
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
async fn wait_for_os_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).expect("SIGTERM handler");
    let mut sigint = signal(SignalKind::interrupt()).expect("SIGINT handler");

    tokio::select! {
        _ = sigterm.recv() => info!("SIGTERM received"),
        _ = sigint.recv() => info!("SIGINT received"),
    }
}

#[cfg(not(unix))]
async fn wait_for_os_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Ctrl+C received");
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_initiate_wakes_subscribers() {
        let coordinator = ShutdownCoordinator::new();
        let mut rx = coordinator.subscribe();

        assert!(!coordinator.is_initiated());
        coordinator.initiate();
        assert!(coordinator.is_initiated());

        tokio::time::timeout(Duration::from_millis(100), rx.recv())
            .await
            .expect("subscriber should be woken")
            .expect("message should arrive");
    }

    #[tokio::test]
    async fn test_initiate_is_idempotent() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate();
        coordinator.initiate();
        assert!(coordinator.is_initiated());
    }

    #[tokio::test]
    async fn test_signal_future_resolves_after_initiate() {
        let coordinator = ShutdownCoordinator::new();
        let future = coordinator.signal_future();
        coordinator.initiate();

        tokio::time::timeout(Duration::from_millis(100), future)
            .await
            .expect("future should resolve");
    }

    #[tokio::test]
    async fn test_signal_future_resolves_when_already_initiated() {
        let coordinator = ShutdownCoordinator::new();
        coordinator.initiate();

        tokio::time::timeout(Duration::from_millis(100), coordinator.signal_future())
            .await
            .expect("future should resolve immediately");
    }
}
