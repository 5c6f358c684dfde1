//! Air-quality data collector
//!
//! Polls remote sensor provider APIs (currently AirGradient) on a fixed
//! interval, normalizes vendor readings into one measurement model, and
//! persists them in a local SQLite database for historical querying.
//!
//! # Architecture
//!
//! - [`provider`]: one [`provider::ProviderAdapter`] per vendor API, resolved
//!   through a [`provider::ProviderRegistry`]
//! - [`registry`]: device lifecycle (add, validate, activate/deactivate,
//!   remove with cascading history deletion)
//! - [`scheduler`]: periodic ingestion cycles with per-device failure
//!   isolation and a bounded worker pool
//! - [`storage`]: idempotent append-and-query persistence keyed by
//!   `(device, timestamp)`

pub mod config;
pub mod error;
pub mod provider;
pub mod registry;
pub mod scheduler;
pub mod storage;

// Re-export main types for convenience
pub use config::CollectorConfig;
pub use error::{AirqError, Result};
pub use provider::{AirGradientAdapter, ProviderAdapter, ProviderKind, ProviderRegistry};
pub use registry::{Device, DeviceRegistry, NewDevice};
pub use scheduler::{CycleReport, CycleStats, IngestionScheduler};
pub use storage::{Database, Measurement, MeasurementStore, NewMeasurement};
