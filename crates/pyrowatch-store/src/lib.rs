// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # pyrowatch-store
//!
//! SQL persistence for PYROWATCH.
//!
//! Two stores share one pool:
//!
//! - [`DeviceRegistry`]: CRUD over device configuration, the single source
//!   of truth for the polling scheduler, with a change signal the scheduler
//!   consumes to reload.
//! - [`ReadingStore`]: append-only reading persistence with range queries,
//!   CSV export and the retention bulk-delete primitive.
//!
//! Timestamps are stored as text in a fixed-width UTC format whose
//! lexicographic order equals chronological order; range queries compare
//! directly on the column.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod error;
pub mod readings;
pub mod registry;

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};

pub use error::{StoreError, StoreResult};
pub use readings::{DeviceLatest, LatestSnapshot, ReadingStats, ReadingStore, StatusCounts};
pub use registry::DeviceRegistry;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// Pool bootstrap
// =============================================================================

/// Opens the database pool and applies the schema.
///
/// `database_url` is the dsn from the process configuration. An in-memory
/// dsn gets a single connection so every query sees the same database.
pub async fn connect(database_url: &str) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(StoreError::Database)?
        .create_if_missing(true)
        .foreign_keys(true);

    let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    migrate(&pool).await?;

    tracing::info!(max_connections, "database pool ready");
    Ok(pool)
}

/// Applies the schema. Idempotent.
pub async fn migrate(pool: &SqlitePool) -> StoreResult<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_settings (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            name            TEXT    NOT NULL UNIQUE,
            com_port        TEXT    NOT NULL,
            baud_rate       INTEGER NOT NULL DEFAULT 9600,
            slave_id        INTEGER NOT NULL,
            function_code   INTEGER NOT NULL DEFAULT 3,
            start_register  INTEGER NOT NULL DEFAULT 0,
            register_count  INTEGER NOT NULL DEFAULT 2,
            layout          TEXT    NOT NULL,
            enabled         INTEGER NOT NULL DEFAULT 1,
            show_in_graph   INTEGER NOT NULL DEFAULT 0,
            graph_y_min     REAL    NOT NULL DEFAULT 0,
            graph_y_max     REAL    NOT NULL DEFAULT 100,
            created_at      TEXT    NOT NULL,
            updated_at      TEXT    NOT NULL,
            UNIQUE (com_port, slave_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_readings (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            device_id       INTEGER NOT NULL
                            REFERENCES device_settings(id) ON DELETE CASCADE,
            device_name     TEXT    NOT NULL,
            ts_utc          TEXT    NOT NULL,
            value           REAL,
            ambient_temp    REAL,
            status          TEXT    NOT NULL,
            raw_hex         TEXT,
            error_message   TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_readings_device_ts
         ON device_readings(device_id, ts_utc)",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_readings_ts ON device_readings(ts_utc)")
        .execute(pool)
        .await?;

    Ok(())
}
