//! Ingestion scheduler
//!
//! Drives one fetch-and-store cycle per active device on a fixed interval.
//! Device failures are isolated: one bad provider never aborts the cycle or
//! the process. There is no cycle-level retry; the next scheduled cycle is
//! the retry mechanism.

use crate::config::CollectorConfig;
use crate::error::{AirqError, Result};
use crate::provider::ProviderRegistry;
use crate::registry::{Device, DeviceRegistry};
use crate::storage::MeasurementStore;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

/// Cumulative statistics across cycles
#[derive(Debug, Clone, Default)]
pub struct CycleStats {
    pub cycles_run: u64,
    pub devices_polled: u64,
    pub readings_stored: u64,
    pub fetch_failures: u64,
    /// Error from the most recent cycle, cleared by a fully successful one
    pub last_error: Option<String>,
}

/// Outcome of a single cycle
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    pub devices_polled: usize,
    pub readings_stored: usize,
    pub failed_devices: Vec<i64>,
}

#[derive(Debug, Default)]
struct SchedulerState {
    running: bool,
    last_cycle: Option<DateTime<Utc>>,
    stats: CycleStats,
}

/// Periodic ingestion driver over all active devices
#[derive(Clone)]
pub struct IngestionScheduler {
    registry: Arc<DeviceRegistry>,
    store: Arc<MeasurementStore>,
    providers: Arc<ProviderRegistry>,
    config: CollectorConfig,
    state: Arc<RwLock<SchedulerState>>,
    shutdown: Arc<Notify>,
    loop_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl IngestionScheduler {
    /// Create a scheduler.
    ///
    /// Fails if no provider adapter is registered at all; that is a startup
    /// misconfiguration, not something a later cycle can recover from.
    pub fn new(
        registry: Arc<DeviceRegistry>,
        store: Arc<MeasurementStore>,
        providers: Arc<ProviderRegistry>,
        config: CollectorConfig,
    ) -> Result<Self> {
        if providers.is_empty() {
            return Err(AirqError::config("no provider adapters registered"));
        }

        Ok(Self {
            registry,
            store,
            providers,
            config,
            state: Arc::new(RwLock::new(SchedulerState::default())),
            shutdown: Arc::new(Notify::new()),
            loop_handle: Arc::new(Mutex::new(None)),
        })
    }

    /// Start the periodic ingestion loop
    pub async fn start(&self) {
        {
            let mut state = self.state.write().await;
            if state.running {
                warn!("ingestion scheduler already running");
                return;
            }
            state.running = true;
        }

        info!(
            interval_secs = self.config.poll_interval.as_secs(),
            workers = self.config.worker_pool_size,
            "starting ingestion scheduler"
        );

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(scheduler.config.poll_interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = scheduler.shutdown.notified() => break,
                }

                if !scheduler.state.read().await.running {
                    break;
                }

                if let Err(e) = scheduler.run_cycle().await {
                    // Registry/storage faults at cycle level; per-device
                    // faults are already handled inside the cycle.
                    error!(error = %e, "ingestion cycle failed");
                    let mut state = scheduler.state.write().await;
                    state.stats.last_error = Some(e.to_string());
                }
            }
            info!("ingestion scheduler stopped");
        });
        *self.loop_handle.lock().await = Some(handle);
    }

    /// Stop the loop. An in-flight cycle finishes; no new cycle starts.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        state.running = false;
        drop(state);
        self.shutdown.notify_one();
    }

    /// Stop the loop and wait for it to wind down, in-flight fetches
    /// included. Called on process shutdown so no write is cut short.
    pub async fn shutdown(&self) {
        self.stop().await;
        if let Some(handle) = self.loop_handle.lock().await.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "ingestion loop ended abnormally");
            }
        }
    }

    /// Whether the periodic loop is active
    pub async fn is_running(&self) -> bool {
        self.state.read().await.running
    }

    /// Cumulative cycle statistics
    pub async fn stats(&self) -> CycleStats {
        self.state.read().await.stats.clone()
    }

    /// Run one fetch-and-store cycle over a snapshot of the active devices.
    ///
    /// A device deactivated after the snapshot still completes its in-flight
    /// fetch; one activated after it joins the next cycle. Per-device
    /// failures are recorded and skipped.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Instant::now();
        let devices = self.registry.list(false).await?;
        if devices.is_empty() {
            debug!("no active devices, skipping cycle");
        }

        let outcomes: Vec<(i64, Result<usize>)> = stream::iter(devices)
            .map(|device| {
                let scheduler = self.clone();
                async move {
                    let id = device.id;
                    (id, scheduler.poll_device(device).await)
                }
            })
            .buffer_unordered(self.config.worker_pool_size.max(1))
            .collect()
            .await;

        let mut report = CycleReport {
            devices_polled: outcomes.len(),
            ..Default::default()
        };
        let mut last_error = None;
        for (device_id, outcome) in outcomes {
            match outcome {
                Ok(stored) => report.readings_stored += stored,
                Err(e) => {
                    warn!(device_id, error = %e, "device fetch failed, skipping until next cycle");
                    report.failed_devices.push(device_id);
                    last_error = Some(e.to_string());
                }
            }
        }

        let mut state = self.state.write().await;
        state.last_cycle = Some(Utc::now());
        state.stats.cycles_run += 1;
        state.stats.devices_polled += report.devices_polled as u64;
        state.stats.readings_stored += report.readings_stored as u64;
        state.stats.fetch_failures += report.failed_devices.len() as u64;
        // None here means every device succeeded, which clears a stale error.
        state.stats.last_error = last_error;
        drop(state);

        debug!(
            polled = report.devices_polled,
            stored = report.readings_stored,
            failed = report.failed_devices.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "ingestion cycle complete"
        );
        Ok(report)
    }

    /// Fetch and store readings for one device
    async fn poll_device(&self, device: Device) -> Result<usize> {
        let adapter = self.providers.resolve(device.provider_kind)?;

        // The HTTP client already enforces fetch_timeout per request. This
        // outer guard catches an adapter stalling outside the request, and
        // gets a margin so a slow provider is reported as the client's
        // transport timeout, not the guard's.
        let readings = tokio::time::timeout(
            self.config.fetch_timeout + Duration::from_secs(1),
            adapter.fetch_latest(&device.credential, &device.location),
        )
        .await
        .map_err(|_| AirqError::fetch(device.provider_kind, device.id, "fetch timed out"))?
        .map_err(|e| AirqError::fetch(device.provider_kind, device.id, e.to_string()))?;

        if readings.is_empty() {
            debug!(device_id = device.id, "no new readings");
            return Ok(0);
        }

        self.store.write(device.id, &readings).await
    }
}
