// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Device registry.
//!
//! Durable CRUD over device configuration. Every mutation bumps a
//! generation counter on a watch channel; the polling scheduler observes it
//! and reloads its device snapshots at the next cycle boundary.
//!
//! Two uniqueness rules hold: the device name is globally unique, and the
//! slave id is unique within a bus (per com port). Both surface as
//! conflicts.

use chrono::Utc;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tokio::sync::watch;

use pyrowatch_core::timefmt;
use pyrowatch_core::types::{
    BaudRate, DecodeLayout, Device, DeviceId, NewDevice, RegisterFunction,
};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// DeviceRegistry
// =============================================================================

/// CRUD over the persistent device records.
#[derive(Clone)]
pub struct DeviceRegistry {
    pool: SqlitePool,
    changes: watch::Sender<u64>,
}

impl DeviceRegistry {
    /// Creates a registry over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        let (changes, _) = watch::channel(0);
        Self { pool, changes }
    }

    /// Subscribes to configuration changes.
    ///
    /// The value is a generation counter; any observed change means the
    /// device set may have changed.
    pub fn subscribe_changes(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    fn notify_changed(&self) {
        self.changes.send_modify(|generation| *generation += 1);
    }

    /// Lists devices, optionally only the enabled ones, ordered by slave id.
    pub async fn list(&self, enabled_only: bool) -> StoreResult<Vec<Device>> {
        let sql = if enabled_only {
            "SELECT * FROM device_settings WHERE enabled = 1 ORDER BY slave_id, id"
        } else {
            "SELECT * FROM device_settings ORDER BY slave_id, id"
        };

        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        rows.iter().map(device_from_row).collect()
    }

    /// Fetches one device.
    pub async fn get(&self, id: DeviceId) -> StoreResult<Device> {
        let row = sqlx::query("SELECT * FROM device_settings WHERE id = ?")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::not_found(format!("device {}", id)))?;

        device_from_row(&row)
    }

    /// Rejects a draft whose slave id is already taken on its bus.
    ///
    /// A slave id must be unique within a bus: two devices answering the
    /// same unit address on one RS-485 segment would race each other's
    /// frames on the wire. `exclude` skips the device being updated.
    async fn ensure_slave_id_free(
        &self,
        draft: &NewDevice,
        exclude: Option<DeviceId>,
    ) -> StoreResult<()> {
        let holder = match exclude {
            Some(id) => {
                sqlx::query(
                    "SELECT name FROM device_settings
                     WHERE com_port = ? AND slave_id = ? AND id != ?",
                )
                .bind(draft.com_port.trim())
                .bind(draft.slave_id as i64)
                .bind(id.value())
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT name FROM device_settings
                     WHERE com_port = ? AND slave_id = ?",
                )
                .bind(draft.com_port.trim())
                .bind(draft.slave_id as i64)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        if let Some(row) = holder {
            let holder_name: String = row.get("name");
            return Err(StoreError::conflict(format!(
                "slave id {} on {} is already used by device '{}'",
                draft.slave_id,
                draft.com_port.trim(),
                holder_name
            )));
        }
        Ok(())
    }

    /// Creates a device from a validated draft.
    pub async fn create(&self, draft: &NewDevice) -> StoreResult<Device> {
        let layout = draft.validate()?;
        self.ensure_slave_id_free(draft, None).await?;
        let now = timefmt::to_db(Utc::now());

        let result = sqlx::query(
            r#"
            INSERT INTO device_settings
                (name, com_port, baud_rate, slave_id, function_code,
                 start_register, register_count, layout, enabled,
                 show_in_graph, graph_y_min, graph_y_max, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(draft.name.trim())
        .bind(draft.com_port.trim())
        .bind(draft.baud_rate.value())
        .bind(draft.slave_id as i64)
        .bind(draft.function_code.code() as i64)
        .bind(draft.start_register as i64)
        .bind(draft.register_count as i64)
        .bind(layout.as_str())
        .bind(draft.enabled)
        .bind(draft.show_in_graph)
        .bind(draft.graph_y_min)
        .bind(draft.graph_y_max)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, draft))?;

        let id = DeviceId::new(result.last_insert_rowid());
        tracing::info!(device = %id, name = %draft.name, "device created");
        self.notify_changed();

        self.get(id).await
    }

    /// Replaces a device's configuration in place.
    ///
    /// The id is the identity; historical readings keep pointing at it.
    pub async fn update(&self, id: DeviceId, draft: &NewDevice) -> StoreResult<Device> {
        let layout = draft.validate()?;
        self.ensure_slave_id_free(draft, Some(id)).await?;
        let now = timefmt::to_db(Utc::now());

        let result = sqlx::query(
            r#"
            UPDATE device_settings SET
                name = ?, com_port = ?, baud_rate = ?, slave_id = ?,
                function_code = ?, start_register = ?, register_count = ?,
                layout = ?, enabled = ?, show_in_graph = ?,
                graph_y_min = ?, graph_y_max = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(draft.name.trim())
        .bind(draft.com_port.trim())
        .bind(draft.baud_rate.value())
        .bind(draft.slave_id as i64)
        .bind(draft.function_code.code() as i64)
        .bind(draft.start_register as i64)
        .bind(draft.register_count as i64)
        .bind(layout.as_str())
        .bind(draft.enabled)
        .bind(draft.show_in_graph)
        .bind(draft.graph_y_min)
        .bind(draft.graph_y_max)
        .bind(&now)
        .bind(id.value())
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, draft))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("device {}", id)));
        }

        tracing::info!(device = %id, "device updated");
        self.notify_changed();

        self.get(id).await
    }

    /// Deletes a device (and, via the schema, its readings).
    pub async fn delete(&self, id: DeviceId) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM device_settings WHERE id = ?")
            .bind(id.value())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(format!("device {}", id)));
        }

        tracing::info!(device = %id, "device deleted");
        self.notify_changed();
        Ok(())
    }

    /// Deletes every device. Returns the number removed.
    pub async fn clear(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM device_settings")
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::warn!(removed, "device registry cleared");
            self.notify_changed();
        }
        Ok(removed)
    }
}

// The schema carries two unique constraints; the slave-id one also has a
// racing-writer backstop here since ensure_slave_id_free runs outside the
// insert's transaction.
fn map_unique(err: sqlx::Error, draft: &NewDevice) -> StoreError {
    if let sqlx::Error::Database(ref db) = err {
        if db.is_unique_violation() {
            if db.message().contains("slave_id") {
                return StoreError::conflict(format!(
                    "slave id {} is already used on {}",
                    draft.slave_id,
                    draft.com_port.trim()
                ));
            }
            return StoreError::conflict(format!(
                "device name '{}' already exists",
                draft.name
            ));
        }
    }
    StoreError::Database(err)
}

fn device_from_row(row: &SqliteRow) -> StoreResult<Device> {
    let layout_raw: String = row.get("layout");
    let layout = DecodeLayout::parse(&layout_raw)
        .ok_or_else(|| StoreError::decode(format!("unknown layout '{}'", layout_raw)))?;

    let baud_raw: i64 = row.get("baud_rate");
    let baud_rate = BaudRate::try_from(baud_raw as u32).map_err(StoreError::decode)?;

    let function_raw: i64 = row.get("function_code");
    let function_code = RegisterFunction::try_from(function_raw as u8).map_err(StoreError::decode)?;

    let created_raw: String = row.get("created_at");
    let updated_raw: String = row.get("updated_at");

    Ok(Device {
        id: DeviceId::new(row.get::<i64, _>("id")),
        name: row.get("name"),
        com_port: row.get("com_port"),
        baud_rate,
        slave_id: row.get::<i64, _>("slave_id") as u8,
        function_code,
        start_register: row.get::<i64, _>("start_register") as u16,
        register_count: row.get::<i64, _>("register_count") as u16,
        layout,
        enabled: row.get("enabled"),
        show_in_graph: row.get("show_in_graph"),
        graph_y_min: row.get("graph_y_min"),
        graph_y_max: row.get("graph_y_max"),
        created_at: timefmt::parse_db(&created_raw)
            .map_err(|e| StoreError::decode(e.to_string()))?,
        updated_at: timefmt::parse_db(&updated_raw)
            .map_err(|e| StoreError::decode(e.to_string()))?,
    })
}

// =============================================================================
// Tests
// =============================================================================
