// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Reading store.
//!
//! Append-only persistence of temperature readings. Batches are written in
//! one transaction so the write-back buffer's retry policy can treat a
//! failed batch as a unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;

use pyrowatch_core::timefmt;
use pyrowatch_core::types::{DeviceId, Reading, ReadingStatus};

use crate::error::{StoreError, StoreResult};

// =============================================================================
// ReadingStore
// =============================================================================

/// Append-only persistence of readings.
#[derive(Clone)]
pub struct ReadingStore {
    pool: SqlitePool,
}

impl ReadingStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Appends a batch of readings in one transaction.
    ///
    /// Fails atomically: either every reading lands or none does.
    pub async fn append_batch(&self, batch: &[Reading]) -> StoreResult<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        for reading in batch {
            sqlx::query(
                r#"
                INSERT INTO device_readings
                    (device_id, device_name, ts_utc, value, ambient_temp,
                     status, raw_hex, error_message)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(reading.device_id.value())
            .bind(&reading.device_name)
            .bind(timefmt::to_db(reading.timestamp))
            .bind(reading.value.map(f64::from))
            .bind(reading.ambient_temp.map(f64::from))
            .bind(reading.status.as_str())
            .bind(&reading.raw_hex)
            .bind(&reading.error_message)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;

        Ok(batch.len() as u64)
    }

    /// Returns every device with its most recent reading (if any).
    pub async fn latest(&self) -> StoreResult<Vec<DeviceLatest>> {
        let devices = sqlx::query(
            "SELECT id, name, slave_id, com_port, baud_rate, enabled
             FROM device_settings ORDER BY slave_id, id",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut result = Vec::with_capacity(devices.len());
        for device in &devices {
            let device_id: i64 = device.get("id");
            let latest = sqlx::query(
                "SELECT * FROM device_readings
                 WHERE device_id = ? ORDER BY ts_utc DESC LIMIT 1",
            )
            .bind(device_id)
            .fetch_optional(&self.pool)
            .await?;

            let latest_reading = match latest {
                Some(row) => {
                    let reading = reading_from_row(&row)?;
                    Some(LatestSnapshot {
                        temperature: reading.value,
                        ambient_temp: reading.ambient_temp,
                        status: reading.status,
                        raw_hex: reading.raw_hex,
                        timestamp: reading.timestamp,
                    })
                }
                None => None,
            };

            result.push(DeviceLatest {
                device_id: DeviceId::new(device_id),
                device_name: device.get("name"),
                slave_id: device.get::<i64, _>("slave_id") as u8,
                com_port: device.get("com_port"),
                baud_rate: device.get::<i64, _>("baud_rate") as u32,
                enabled: device.get("enabled"),
                latest_reading,
            });
        }

        Ok(result)
    }

    /// Returns the most recent readings for a device, newest first.
    pub async fn recent(&self, device_id: DeviceId, limit: i64) -> StoreResult<Vec<Reading>> {
        let rows = sqlx::query(
            "SELECT * FROM device_readings
             WHERE device_id = ? ORDER BY ts_utc DESC LIMIT ?",
        )
        .bind(device_id.value())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(reading_from_row).collect()
    }

    /// Returns readings in `[start, end]` for a device, oldest first.
    pub async fn history(
        &self,
        device_id: DeviceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: Option<i64>,
    ) -> StoreResult<Vec<Reading>> {
        let rows = match limit {
            Some(limit) => {
                sqlx::query(
                    "SELECT * FROM device_readings
                     WHERE device_id = ? AND ts_utc >= ? AND ts_utc <= ?
                     ORDER BY ts_utc ASC LIMIT ?",
                )
                .bind(device_id.value())
                .bind(timefmt::to_db(start))
                .bind(timefmt::to_db(end))
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT * FROM device_readings
                     WHERE device_id = ? AND ts_utc >= ? AND ts_utc <= ?
                     ORDER BY ts_utc ASC",
                )
                .bind(device_id.value())
                .bind(timefmt::to_db(start))
                .bind(timefmt::to_db(end))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(reading_from_row).collect()
    }

    /// Exports a device's readings in `[start, end]` as CSV lines.
    ///
    /// The first line is the header; rows are ordered ascending by timestamp
    /// and numbered from 1. Each line ends with a newline so the lines can
    /// be streamed as chunks.
    pub async fn export_csv(
        &self,
        device_id: DeviceId,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<String>> {
        let readings = self.history(device_id, start, end, None).await?;

        let mut lines = Vec::with_capacity(readings.len() + 1);
        lines.push("sr_no,timestamp,temperature,ambient_temp,status\n".to_string());

        for (index, reading) in readings.iter().enumerate() {
            lines.push(format!(
                "{},{},{},{},{}\n",
                index + 1,
                timefmt::to_csv(reading.timestamp),
                reading.value.map(|v| v.to_string()).unwrap_or_default(),
                reading.ambient_temp.map(|v| v.to_string()).unwrap_or_default(),
                reading.status,
            ));
        }

        Ok(lines)
    }

    /// Returns aggregate reading statistics.
    pub async fn stats(&self) -> StoreResult<ReadingStats> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*)                                        AS total,
                   SUM(CASE WHEN status = 'OK'    THEN 1 ELSE 0 END) AS ok_count,
                   SUM(CASE WHEN status = 'Err'   THEN 1 ELSE 0 END) AS err_count,
                   SUM(CASE WHEN status = 'Stale' THEN 1 ELSE 0 END) AS stale_count,
                   MIN(ts_utc)                                     AS earliest,
                   MAX(ts_utc)                                     AS latest
            FROM device_readings
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let parse_bound = |value: Option<String>| -> StoreResult<Option<DateTime<Utc>>> {
            value
                .map(|raw| timefmt::parse_db(&raw).map_err(|e| StoreError::decode(e.to_string())))
                .transpose()
        };

        Ok(ReadingStats {
            total_readings: row.get::<i64, _>("total") as u64,
            readings_by_status: StatusCounts {
                ok: row.get::<Option<i64>, _>("ok_count").unwrap_or(0) as u64,
                error: row.get::<Option<i64>, _>("err_count").unwrap_or(0) as u64,
                stale: row.get::<Option<i64>, _>("stale_count").unwrap_or(0) as u64,
            },
            earliest: parse_bound(row.get("earliest"))?,
            latest: parse_bound(row.get("latest"))?,
        })
    }

    /// Deletes every reading. Returns the number removed.
    pub async fn delete_all(&self) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM device_readings")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Deletes readings older than `cutoff`. Retention primitive; a periodic
    /// task applies the configured horizon through this.
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query("DELETE FROM device_readings WHERE ts_utc < ?")
            .bind(timefmt::to_db(cutoff))
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected();
        if removed > 0 {
            tracing::info!(removed, cutoff = %timefmt::to_db(cutoff), "old readings deleted");
        }
        Ok(removed)
    }
}

// =============================================================================
// Result shapes
// =============================================================================

/// One device together with its most recent reading.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceLatest {
    /// Device id.
    pub device_id: DeviceId,
    /// Device name.
    pub device_name: String,
    /// Modbus unit address.
    pub slave_id: u8,
    /// Bus port.
    pub com_port: String,
    /// Bus speed.
    pub baud_rate: u32,
    /// Whether the device is being polled.
    pub enabled: bool,
    /// The most recent reading, if one exists.
    pub latest_reading: Option<LatestSnapshot>,
}

/// The reading part of a [`DeviceLatest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatestSnapshot {
    /// Process temperature, absent on failure.
    pub temperature: Option<f32>,
    /// Ambient temperature, when the layout carries one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ambient_temp: Option<f32>,
    /// Status of the attempt.
    pub status: ReadingStatus,
    /// Verbatim response bytes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_hex: Option<String>,
    /// Acquisition instant.
    #[serde(with = "pyrowatch_core::timefmt::serde_micros")]
    pub timestamp: DateTime<Utc>,
}

/// Aggregate statistics over the reading table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingStats {
    /// Total persisted readings.
    pub total_readings: u64,
    /// Per-status counts.
    pub readings_by_status: StatusCounts,
    /// Oldest persisted instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub earliest: Option<DateTime<Utc>>,
    /// Newest persisted instant.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest: Option<DateTime<Utc>>,
}

/// Reading counts by terminal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCounts {
    /// Successful readings.
    pub ok: u64,
    /// Failed readings.
    pub error: u64,
    /// Stale readings.
    pub stale: u64,
}

fn reading_from_row(row: &SqliteRow) -> StoreResult<Reading> {
    let status_raw: String = row.get("status");
    let status = ReadingStatus::parse(&status_raw)
        .ok_or_else(|| StoreError::decode(format!("unknown status '{}'", status_raw)))?;

    let ts_raw: String = row.get("ts_utc");
    let timestamp = timefmt::parse_db(&ts_raw).map_err(|e| StoreError::decode(e.to_string()))?;

    Ok(Reading {
        id: Some(row.get::<i64, _>("id")),
        device_id: DeviceId::new(row.get::<i64, _>("device_id")),
        device_name: row.get("device_name"),
        timestamp,
        value: row.get::<Option<f64>, _>("value").map(|v| v as f32),
        ambient_temp: row.get::<Option<f64>, _>("ambient_temp").map(|v| v as f32),
        status,
        raw_hex: row.get("raw_hex"),
        error_message: row.get("error_message"),
    })
}

// =============================================================================
// Tests
// =============================================================================
