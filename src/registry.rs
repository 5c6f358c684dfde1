//! Device registry
//!
//! The authoritative record of configured devices: their provider kind,
//! credential, location, and activation state. The scheduler polls whatever
//! this registry reports as active; the CLI mutates it.

use crate::error::{AirqError, Result};
use crate::provider::{ProviderKind, ProviderRegistry};
use crate::storage::{decode_timestamp, encode_timestamp, Database, NewMeasurement};
use chrono::{DateTime, Utc};
use libsql::Row;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// One configured sensor device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub id: i64,
    pub name: String,
    pub provider_kind: ProviderKind,
    /// Opaque API token, passed through to the provider adapter
    pub credential: String,
    /// Provider-side location identifier
    pub location: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// Parameters for creating a device
///
/// The provider kind arrives as a string (CLI input, config files) and is
/// validated against the registered adapters before anything is persisted.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub name: String,
    pub provider_kind: String,
    pub credential: String,
    pub location: String,
}

const DEVICE_COLUMNS: &str = "id, name, provider_kind, credential, location, active, created_at";

/// CRUD operations over device records
#[derive(Clone)]
pub struct DeviceRegistry {
    db: Database,
    providers: Arc<ProviderRegistry>,
}

impl DeviceRegistry {
    pub fn new(db: Database, providers: Arc<ProviderRegistry>) -> Self {
        Self { db, providers }
    }

    /// Create a device in `active` state.
    ///
    /// Rejects unregistered provider kinds before touching storage. With
    /// `validate_now`, the matching adapter probes the live provider first and
    /// a clean rejection fails with `InvalidCredential` without creating a
    /// record.
    pub async fn add(&self, new: NewDevice, validate_now: bool) -> Result<Device> {
        let kind: ProviderKind = new.provider_kind.parse()?;
        let adapter = self.providers.resolve(kind)?;

        if validate_now {
            let usable = adapter.validate(&new.credential, &new.location).await?;
            if !usable {
                warn!(name = %new.name, %kind, "credential validation rejected device");
                return Err(AirqError::invalid_credential(format!(
                    "provider {kind} rejected the credential for location {}",
                    new.location
                )));
            }
        }

        let created_at = Utc::now();
        let conn = self.db.write_conn().await;
        conn.execute(
            "INSERT INTO devices (name, provider_kind, credential, location, active, created_at) \
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            libsql::params![
                new.name.clone(),
                kind.as_str(),
                new.credential.clone(),
                new.location.clone(),
                encode_timestamp(&created_at),
            ],
        )
        .await
        .map_err(|e| AirqError::database(format!("failed to insert device: {e}")))?;
        let id = conn.last_insert_rowid();
        drop(conn);

        info!(device_id = id, name = %new.name, %kind, "device added");
        Ok(Device {
            id,
            name: new.name,
            provider_kind: kind,
            credential: new.credential,
            location: new.location,
            active: true,
            created_at,
        })
    }

    /// Fetch one device by id
    pub async fn get(&self, id: i64) -> Result<Device> {
        let conn = self.db.read_conn().await;
        let mut rows = conn
            .query(
                &format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE id = ?1"),
                libsql::params![id],
            )
            .await
            .map_err(|e| AirqError::database(format!("device query failed: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| AirqError::database(format!("failed to fetch row: {e}")))?
        {
            Some(row) => device_from_row(&row),
            None => Err(AirqError::device_not_found(id)),
        }
    }

    /// All devices in stable insertion (id) order, optionally including
    /// inactive ones
    pub async fn list(&self, include_inactive: bool) -> Result<Vec<Device>> {
        let sql = if include_inactive {
            format!("SELECT {DEVICE_COLUMNS} FROM devices ORDER BY id")
        } else {
            format!("SELECT {DEVICE_COLUMNS} FROM devices WHERE active = 1 ORDER BY id")
        };

        let conn = self.db.read_conn().await;
        let mut rows = conn
            .query(&sql, ())
            .await
            .map_err(|e| AirqError::database(format!("device query failed: {e}")))?;

        let mut devices = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AirqError::database(format!("failed to fetch row: {e}")))?
        {
            devices.push(device_from_row(&row)?);
        }
        Ok(devices)
    }

    /// Mark a device active. Idempotent; unknown ids fail with `NotFound`.
    pub async fn activate(&self, id: i64) -> Result<()> {
        self.set_active(id, true).await
    }

    /// Mark a device inactive, keeping its history. Idempotent; unknown ids
    /// fail with `NotFound`.
    pub async fn deactivate(&self, id: i64) -> Result<()> {
        self.set_active(id, false).await
    }

    async fn set_active(&self, id: i64, active: bool) -> Result<()> {
        let conn = self.db.write_conn().await;
        let changed = conn
            .execute(
                "UPDATE devices SET active = ?1 WHERE id = ?2",
                libsql::params![active as i64, id],
            )
            .await
            .map_err(|e| AirqError::database(format!("failed to update device: {e}")))?;
        if changed == 0 {
            return Err(AirqError::device_not_found(id));
        }
        info!(device_id = id, active, "device activation state changed");
        Ok(())
    }

    /// Delete a device and all its measurements, atomically.
    ///
    /// Irreversible; unknown ids fail with `NotFound` and nothing is deleted.
    pub async fn remove(&self, id: i64) -> Result<()> {
        let conn = self.db.write_conn().await;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| AirqError::database(format!("failed to begin transaction: {e}")))?;

        let measurements = tx
            .execute(
                "DELETE FROM measurements WHERE device_id = ?1",
                libsql::params![id],
            )
            .await
            .map_err(|e| AirqError::database(format!("failed to delete measurements: {e}")))?;
        let devices = tx
            .execute("DELETE FROM devices WHERE id = ?1", libsql::params![id])
            .await
            .map_err(|e| AirqError::database(format!("failed to delete device: {e}")))?;

        if devices == 0 {
            tx.rollback()
                .await
                .map_err(|e| AirqError::database(format!("rollback failed: {e}")))?;
            return Err(AirqError::device_not_found(id));
        }

        tx.commit()
            .await
            .map_err(|e| AirqError::database(format!("commit failed: {e}")))?;
        info!(device_id = id, measurements, "device removed with its history");
        Ok(())
    }

    /// Ids of all active devices, as one consistent snapshot.
    ///
    /// This is what the scheduler polls each cycle; activation changes made
    /// between cycles are reflected without restart.
    pub async fn get_active_ids(&self) -> Result<Vec<i64>> {
        let conn = self.db.read_conn().await;
        let mut rows = conn
            .query("SELECT id FROM devices WHERE active = 1 ORDER BY id", ())
            .await
            .map_err(|e| AirqError::database(format!("device query failed: {e}")))?;

        let mut ids = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AirqError::database(format!("failed to fetch row: {e}")))?
        {
            ids.push(
                row.get::<i64>(0)
                    .map_err(|e| AirqError::database(format!("failed to read id: {e}")))?,
            );
        }
        Ok(ids)
    }

    /// Probe a device's provider with a live fetch (CLI `device test`)
    pub async fn test_device(&self, id: i64) -> Result<Vec<NewMeasurement>> {
        let device = self.get(id).await?;
        let adapter = self.providers.resolve(device.provider_kind)?;
        adapter
            .fetch_latest(&device.credential, &device.location)
            .await
            .map_err(|e| AirqError::fetch(device.provider_kind, id, e.to_string()))
    }
}

fn device_from_row(row: &Row) -> Result<Device> {
    let kind: String = row
        .get(2)
        .map_err(|e| AirqError::database(format!("failed to read provider_kind: {e}")))?;
    let created_at: String = row
        .get(6)
        .map_err(|e| AirqError::database(format!("failed to read created_at: {e}")))?;

    Ok(Device {
        id: row
            .get(0)
            .map_err(|e| AirqError::database(format!("failed to read id: {e}")))?,
        name: row
            .get(1)
            .map_err(|e| AirqError::database(format!("failed to read name: {e}")))?,
        provider_kind: kind
            .parse()
            .map_err(|_| AirqError::database(format!("stored device has unknown kind {kind:?}")))?,
        credential: row
            .get(3)
            .map_err(|e| AirqError::database(format!("failed to read credential: {e}")))?,
        location: row
            .get(4)
            .map_err(|e| AirqError::database(format!("failed to read location: {e}")))?,
        active: row
            .get::<i64>(5)
            .map_err(|e| AirqError::database(format!("failed to read active: {e}")))?
            != 0,
        created_at: decode_timestamp(&created_at)?,
    })
}
