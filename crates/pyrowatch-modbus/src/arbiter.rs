// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Per-bus transaction arbiter.
//!
//! One [`BusArbiter`] worker owns one serial transport. Callers submit
//! transactions through a cloneable [`BusHandle`]; the worker executes them
//! strictly in arrival order, so the bytes of two transactions can never
//! overlap on the wire and the transport's inter-frame gap is always
//! respected between them.
//!
//! Submissions are tagged [`TxnKind::Poll`] (scheduler) or
//! [`TxnKind::Control`] (parameter service). The arbiter does not reorder or
//! preempt — the control path relies on the scheduler's cooperative pause to
//! keep polls off the queue while a parameter bracket runs.
//!
//! A caller that goes away (e.g. a cancelled HTTP request) merely drops its
//! reply receiver; the transaction still completes on the wire and its
//! result is discarded.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::{ModbusError, ModbusResult};
use crate::transport::RtuTransport;

/// Depth of the pending-transaction queue per bus.
const QUEUE_DEPTH: usize = 32;

// =============================================================================
// Transaction
// =============================================================================

/// Who submitted a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxnKind {
    /// Scheduler polling traffic.
    Poll,
    /// Parameter-service traffic, submitted under a polling pause.
    Control,
}

/// One request/response exchange to run on the bus.
#[derive(Debug, Clone)]
pub struct Transaction {
    /// Submission tag.
    pub kind: TxnKind,
    /// Target unit address (for logging).
    pub slave_id: u8,
    /// Request frame, CRC included.
    pub request: Vec<u8>,
    /// Expected reply length in bytes.
    pub expected_len: usize,
    /// Per-transaction deadline.
    pub deadline: Duration,
}

struct Envelope {
    txn: Transaction,
    reply: oneshot::Sender<ModbusResult<Vec<u8>>>,
}

// =============================================================================
// BusArbiter
// =============================================================================

/// Spawns the per-bus arbiter worker.
pub struct BusArbiter;

impl BusArbiter {
    /// Spawns a worker that owns `transport` and returns the submit handle.
    ///
    /// The worker exits when every handle has been dropped.
    pub fn spawn(transport: Box<dyn RtuTransport>) -> BusHandle {
        let (tx, rx) = mpsc::channel::<Envelope>(QUEUE_DEPTH);
        let stats = Arc::new(AtomicArbiterStats::default());
        let label = transport.display_name();

        tokio::spawn(Self::run(transport, rx, stats.clone()));

        BusHandle { tx, stats, label }
    }

    async fn run(
        mut transport: Box<dyn RtuTransport>,
        mut rx: mpsc::Receiver<Envelope>,
        stats: Arc<AtomicArbiterStats>,
    ) {
        let label = transport.display_name();
        tracing::debug!(bus = %label, "bus arbiter started");

        while let Some(envelope) = rx.recv().await {
            let Envelope { txn, reply } = envelope;

            let result = transport
                .transaction(&txn.request, txn.expected_len, txn.deadline)
                .await;

            match txn.kind {
                TxnKind::Poll => stats.polls.fetch_add(1, Ordering::Relaxed),
                TxnKind::Control => stats.controls.fetch_add(1, Ordering::Relaxed),
            };
            match &result {
                Ok(_) => {}
                Err(e) if e.is_timeout() => {
                    stats.timeouts.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(bus = %label, slave_id = txn.slave_id, "transaction timed out");
                }
                Err(e) => {
                    stats.errors.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(bus = %label, slave_id = txn.slave_id, error = %e, "transaction failed");
                }
            }

            // The submitter may have gone away; the bus stays consistent
            // either way.
            let _ = reply.send(result);
        }

        tracing::debug!(bus = %label, "bus arbiter stopped");
    }
}

// =============================================================================
// BusHandle
// =============================================================================

/// Cloneable handle for submitting transactions to one bus.
#[derive(Clone)]
pub struct BusHandle {
    tx: mpsc::Sender<Envelope>,
    stats: Arc<AtomicArbiterStats>,
    label: String,
}

impl BusHandle {
    /// Submits a transaction and waits for its result.
    ///
    /// Blocks the caller until the exchange has completed on the wire or its
    /// deadline expired; execution order is FIFO among submissions.
    pub async fn submit(&self, txn: Transaction) -> ModbusResult<Vec<u8>> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                txn,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ModbusError::BusClosed)?;

        reply_rx.await.map_err(|_| ModbusError::BusClosed)?
    }

    /// Bus identity for logging.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns a statistics snapshot.
    pub fn stats(&self) -> ArbiterStats {
        ArbiterStats {
            polls: self.stats.polls.load(Ordering::Relaxed),
            controls: self.stats.controls.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            errors: self.stats.errors.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for BusHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusHandle")
            .field("bus", &self.label)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct AtomicArbiterStats {
    polls: AtomicU64,
    controls: AtomicU64,
    timeouts: AtomicU64,
    errors: AtomicU64,
}

/// Statistics for one bus arbiter.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ArbiterStats {
    /// Completed poll transactions.
    pub polls: u64,
    /// Completed control transactions.
    pub controls: u64,
    /// Transactions that hit their deadline.
    pub timeouts: u64,
    /// Transactions that failed for any other reason.
    pub errors: u64,
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Transport that records request order and replies from a script.
    struct ScriptedTransport {
        requests: Arc<Mutex<Vec<Vec<u8>>>>,
        replies: Arc<Mutex<Vec<ModbusResult<Vec<u8>>>>>,
        delay: Duration,
    }

    #[async_trait]
    impl RtuTransport for ScriptedTransport {
        async fn transaction(
            &mut self,
            request: &[u8],
            _expected_len: usize,
            timeout: Duration,
        ) -> ModbusResult<Vec<u8>> {
            tokio::time::sleep(self.delay).await;
            self.requests.lock().unwrap().push(request.to_vec());
            let mut replies = self.replies.lock().unwrap();
            if replies.is_empty() {
                Err(ModbusError::Timeout { timeout })
            } else {
                replies.remove(0)
            }
        }

        fn display_name(&self) -> String {
            "scripted".to_string()
        }
    }

    fn scripted(
        replies: Vec<ModbusResult<Vec<u8>>>,
        delay: Duration,
    ) -> (BusHandle, Arc<Mutex<Vec<Vec<u8>>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handle = BusArbiter::spawn(Box::new(ScriptedTransport {
            requests: requests.clone(),
            replies: Arc::new(Mutex::new(replies)),
            delay,
        }));
        (handle, requests)
    }

    fn poll_txn(slave_id: u8) -> Transaction {
        Transaction {
            kind: TxnKind::Poll,
            slave_id,
            request: vec![slave_id, 0x03, 0, 0, 0, 1, 0, 0],
            expected_len: 7,
            deadline: Duration::from_millis(200),
        }
    }

    #[tokio::test]
    async fn test_submit_returns_reply() {
        let (handle, _) = scripted(vec![Ok(vec![0x01, 0x03, 0x02])], Duration::ZERO);
        let reply = handle.submit(poll_txn(1)).await.unwrap();
        assert_eq!(reply, vec![0x01, 0x03, 0x02]);
        assert_eq!(handle.stats().polls, 1);
    }

    #[tokio::test]
    async fn test_submissions_execute_fifo() {
        let (handle, requests) = scripted(
            (0..8).map(|_| Ok(vec![0u8])).collect(),
            Duration::from_millis(5),
        );

        let mut tasks = Vec::new();
        for slave_id in 1..=8u8 {
            let handle = handle.clone();
            tasks.push(tokio::spawn(async move {
                handle.submit(poll_txn(slave_id)).await
            }));
            // Give each submit a strict arrival order.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let seen: Vec<u8> = requests.lock().unwrap().iter().map(|r| r[0]).collect();
        assert_eq!(seen, (1..=8).collect::<Vec<u8>>());
    }

    #[tokio::test]
    async fn test_timeout_counted_and_bus_stays_usable() {
        let (handle, _) = scripted(
            vec![
                Err(ModbusError::Timeout {
                    timeout: Duration::from_millis(200),
                }),
                Ok(vec![0xAA]),
            ],
            Duration::ZERO,
        );

        assert!(handle.submit(poll_txn(1)).await.unwrap_err().is_timeout());
        assert_eq!(handle.submit(poll_txn(1)).await.unwrap(), vec![0xAA]);

        let stats = handle.stats();
        assert_eq!(stats.timeouts, 1);
        assert_eq!(stats.polls, 2);
    }

    #[tokio::test]
    async fn test_dropped_caller_does_not_wedge_the_bus() {
        let (handle, requests) = scripted(
            vec![Ok(vec![1]), Ok(vec![2])],
            Duration::from_millis(20),
        );

        let abandoned = {
            let handle = handle.clone();
            tokio::spawn(async move { handle.submit(poll_txn(1)).await })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        abandoned.abort();

        // The abandoned transaction still ran; the next one proceeds.
        let reply = handle.submit(poll_txn(2)).await.unwrap();
        assert_eq!(reply, vec![2]);
        assert_eq!(requests.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_script_reads_as_timeout() {
        let (handle, _) = scripted(vec![], Duration::ZERO);
        let reply = handle.submit(poll_txn(1)).await;
        assert!(matches!(reply, Err(ModbusError::Timeout { .. })));
    }
}
