//! Persistent storage for devices and measurements
//!
//! Backed by a local SQLite database through libsql. The schema is created on
//! open; the `UNIQUE(device_id, timestamp)` index on measurements is what
//! makes ingestion idempotent.

pub mod measurement_store;

pub use measurement_store::{Measurement, MeasurementStore, NewMeasurement};

use crate::error::{AirqError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::Connection;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS devices (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    provider_kind TEXT NOT NULL,
    credential TEXT NOT NULL,
    location TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS measurements (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    device_id INTEGER NOT NULL REFERENCES devices(id),
    timestamp TEXT NOT NULL,
    pm1 REAL,
    pm2_5 REAL,
    pm10 REAL,
    co2 REAL,
    temperature REAL,
    humidity REAL,
    nox_index REAL,
    tvoc_index REAL,
    UNIQUE(device_id, timestamp)
);

CREATE INDEX IF NOT EXISTS idx_measurements_device_time
    ON measurements(device_id, timestamp);
"#;

/// Handle to the collector database
///
/// Reads share the connection; writes go through a single serializing lane so
/// concurrent device fetches cannot interleave partial inserts.
#[derive(Clone)]
pub struct Database {
    conn: Arc<RwLock<Connection>>,
}

impl Database {
    /// Open (or create) the database at `path` and initialize the schema
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening collector database");
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AirqError::database(format!("failed to open database: {e}")))?;
        Self::from_libsql(&db).await
    }

    /// Open an in-memory database (tests)
    pub async fn open_in_memory() -> Result<Self> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| AirqError::database(format!("failed to open database: {e}")))?;
        Self::from_libsql(&db).await
    }

    async fn from_libsql(db: &libsql::Database) -> Result<Self> {
        let conn = db
            .connect()
            .map_err(|e| AirqError::database(format!("failed to create connection: {e}")))?;

        conn.execute_batch(SCHEMA)
            .await
            .map_err(|e| AirqError::database(format!("failed to initialize schema: {e}")))?;
        debug!("database schema initialized");

        Ok(Self {
            conn: Arc::new(RwLock::new(conn)),
        })
    }

    pub(crate) async fn read_conn(&self) -> RwLockReadGuard<'_, Connection> {
        self.conn.read().await
    }

    pub(crate) async fn write_conn(&self) -> RwLockWriteGuard<'_, Connection> {
        self.conn.write().await
    }
}

/// Encode a UTC timestamp for storage.
///
/// RFC 3339 with second precision; lexicographic order matches chronological
/// order, which the range queries rely on.
pub(crate) fn encode_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub(crate) fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| AirqError::database(format!("malformed stored timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_encoding_round_trips() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap();
        let encoded = encode_timestamp(&ts);
        assert_eq!(encoded, "2024-03-01T08:30:00Z");
        assert_eq!(decode_timestamp(&encoded).unwrap(), ts);
    }

    #[test]
    fn timestamp_encoding_orders_chronologically() {
        let early = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 11, 30, 23, 59, 59).unwrap();
        assert!(encode_timestamp(&early) < encode_timestamp(&late));
    }

    #[tokio::test]
    async fn open_in_memory_creates_the_schema() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.read_conn().await;
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name IN ('devices', 'measurements') ORDER BY name",
                (),
            )
            .await
            .unwrap();

        let mut tables = Vec::new();
        while let Some(row) = rows.next().await.unwrap() {
            tables.push(row.get::<String>(0).unwrap());
        }
        assert_eq!(tables, vec!["devices", "measurements"]);
    }
}
