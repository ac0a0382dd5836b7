// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pyrowatch-buffer
//!
//! The write-back buffer between acquisition and the reading store.
//!
//! Scheduler loops must never stall on database latency, so readings pass
//! through a two-slot ping-pong buffer: one slot is always accepting appends
//! while the other is empty or being drained by the background flusher.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       WriteBackBuffer                        │
//! │                                                              │
//! │  append ──▶ ┌─────────┐  swap at   ┌─────────┐               │
//! │             │ slot A  │ ◀────────▶ │ slot B  │ ──▶ flusher   │
//! │             └─────────┘ THRESHOLD  └─────────┘      │        │
//! │                                                     ▼        │
//! │                                              ReadingSink     │
//! │                                           (ReadingStore)     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Contract (tested in this crate and in the integration suite):
//!
//! - `append` is constant-time; the only lock is held for a push and an
//!   occasional pointer swap.
//! - The active slot swaps at `threshold`; a max-hold timer forces the swap
//!   below threshold so dashboards aren't waiting on batch fill.
//! - While a flush is in flight the formerly-standby slot keeps accepting.
//!   At `2 × threshold` pending appends, `append` fails with
//!   [`BufferError::Full`] — the only point where a decoded reading may be
//!   dropped, and only under sustained store failure.
//! - A failed flush retries with exponential backoff up to a bounded attempt
//!   count; on give-up the batch is dropped and counted. Every reading is
//!   therefore persisted at least once or counted as dropped, never both,
//!   never neither.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod buffer;
pub mod sink;

pub use buffer::{BufferConfig, BufferError, BufferStats, WriteBackBuffer};
pub use sink::{MockSink, ReadingSink, SinkError, StoreSink};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
