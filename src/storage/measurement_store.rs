//! Append-and-query persistence for normalized measurements

use crate::error::{AirqError, Result};
use crate::storage::{decode_timestamp, encode_timestamp, Database};
use chrono::{DateTime, Utc};
use libsql::{Row, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// One normalized reading bound for storage
///
/// A metric absent from the provider response stays `None`; it is never
/// coerced to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewMeasurement {
    /// Provider-reported timestamp (ingestion time only as fallback)
    pub timestamp: DateTime<Utc>,
    pub pm1: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub nox_index: Option<f64>,
    pub tvoc_index: Option<f64>,
}

/// One stored reading for one device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub id: i64,
    pub device_id: i64,
    pub timestamp: DateTime<Utc>,
    pub pm1: Option<f64>,
    pub pm2_5: Option<f64>,
    pub pm10: Option<f64>,
    pub co2: Option<f64>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub nox_index: Option<f64>,
    pub tvoc_index: Option<f64>,
}

const MEASUREMENT_COLUMNS: &str = "id, device_id, timestamp, pm1, pm2_5, pm10, co2, \
     temperature, humidity, nox_index, tvoc_index";

/// Append-only measurement persistence, queryable by device and time range
#[derive(Clone)]
pub struct MeasurementStore {
    db: Database,
}

impl MeasurementStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist a batch of readings for one device.
    ///
    /// A reading whose `(device_id, timestamp)` already exists is skipped
    /// without failing the batch. Returns the number of rows actually
    /// inserted.
    pub async fn write(&self, device_id: i64, readings: &[NewMeasurement]) -> Result<usize> {
        if readings.is_empty() {
            return Ok(0);
        }

        let conn = self.db.write_conn().await;
        let mut inserted = 0usize;
        for reading in readings {
            let changed = conn
                .execute(
                    "INSERT OR IGNORE INTO measurements \
                         (device_id, timestamp, pm1, pm2_5, pm10, co2, \
                          temperature, humidity, nox_index, tvoc_index) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                    libsql::params![
                        device_id,
                        encode_timestamp(&reading.timestamp),
                        metric_value(reading.pm1),
                        metric_value(reading.pm2_5),
                        metric_value(reading.pm10),
                        metric_value(reading.co2),
                        metric_value(reading.temperature),
                        metric_value(reading.humidity),
                        metric_value(reading.nox_index),
                        metric_value(reading.tvoc_index),
                    ],
                )
                .await
                .map_err(|e| AirqError::database(format!("failed to store measurement: {e}")))?;
            inserted += changed as usize;
        }

        debug!(
            device_id,
            received = readings.len(),
            inserted,
            "stored measurement batch"
        );
        Ok(inserted)
    }

    /// Measurements for one device within `[start, end]` inclusive, ordered
    /// by timestamp ascending. An empty range yields an empty Vec.
    pub async fn query(
        &self,
        device_id: i64,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Measurement>> {
        let conn = self.db.read_conn().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MEASUREMENT_COLUMNS} FROM measurements \
                     WHERE device_id = ?1 AND timestamp >= ?2 AND timestamp <= ?3 \
                     ORDER BY timestamp ASC"
                ),
                libsql::params![device_id, encode_timestamp(&start), encode_timestamp(&end)],
            )
            .await
            .map_err(|e| AirqError::database(format!("measurement query failed: {e}")))?;

        let mut measurements = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AirqError::database(format!("failed to fetch row: {e}")))?
        {
            measurements.push(measurement_from_row(&row)?);
        }
        Ok(measurements)
    }

    /// The most recent measurement for one device, if any
    pub async fn latest(&self, device_id: i64) -> Result<Option<Measurement>> {
        let conn = self.db.read_conn().await;
        let mut rows = conn
            .query(
                &format!(
                    "SELECT {MEASUREMENT_COLUMNS} FROM measurements \
                     WHERE device_id = ?1 ORDER BY timestamp DESC LIMIT 1"
                ),
                libsql::params![device_id],
            )
            .await
            .map_err(|e| AirqError::database(format!("measurement query failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| AirqError::database(format!("failed to fetch row: {e}")))?
        {
            Some(row) => Ok(Some(measurement_from_row(&row)?)),
            None => Ok(None),
        }
    }

    /// Number of stored measurements for one device
    pub async fn count_for_device(&self, device_id: i64) -> Result<u64> {
        let conn = self.db.read_conn().await;
        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM measurements WHERE device_id = ?1",
                libsql::params![device_id],
            )
            .await
            .map_err(|e| AirqError::database(format!("measurement count failed: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| AirqError::database(format!("failed to fetch row: {e}")))?
            .ok_or_else(|| AirqError::database("COUNT(*) returned no row"))?;
        row.get::<i64>(0)
            .map(|n| n as u64)
            .map_err(|e| AirqError::database(format!("failed to read count: {e}")))
    }

    /// Delete all measurements for one device, returning the rows removed.
    ///
    /// Device removal runs the same delete inside its own transaction; this
    /// standalone form clears history while keeping the device registered.
    pub async fn delete_for_device(&self, device_id: i64) -> Result<u64> {
        let conn = self.db.write_conn().await;
        conn.execute(
            "DELETE FROM measurements WHERE device_id = ?1",
            libsql::params![device_id],
        )
        .await
        .map_err(|e| AirqError::database(format!("failed to delete measurements: {e}")))
    }
}

/// Absent metrics are stored as NULL, never coerced to zero
fn metric_value(metric: Option<f64>) -> Value {
    match metric {
        Some(v) => Value::Real(v),
        None => Value::Null,
    }
}

fn measurement_from_row(row: &Row) -> Result<Measurement> {
    let get_metric = |idx: i32| -> Result<Option<f64>> {
        match row
            .get_value(idx)
            .map_err(|e| AirqError::database(format!("failed to read column {idx}: {e}")))?
        {
            Value::Null => Ok(None),
            Value::Real(v) => Ok(Some(v)),
            Value::Integer(v) => Ok(Some(v as f64)),
            other => Err(AirqError::database(format!(
                "unexpected metric type in column {idx}: {other:?}"
            ))),
        }
    };

    let timestamp: String = row
        .get(2)
        .map_err(|e| AirqError::database(format!("failed to read timestamp: {e}")))?;

    Ok(Measurement {
        id: row
            .get(0)
            .map_err(|e| AirqError::database(format!("failed to read id: {e}")))?,
        device_id: row
            .get(1)
            .map_err(|e| AirqError::database(format!("failed to read device_id: {e}")))?,
        timestamp: decode_timestamp(&timestamp)?,
        pm1: get_metric(3)?,
        pm2_5: get_metric(4)?,
        pm10: get_metric(5)?,
        co2: get_metric(6)?,
        temperature: get_metric(7)?,
        humidity: get_metric(8)?,
        nox_index: get_metric(9)?,
        tvoc_index: get_metric(10)?,
    })
}
