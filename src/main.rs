//! Air-quality collector - main entry point
//!
//! Thin CLI shell over the collector core: runs the ingestion scheduler and
//! manages the device registry.

use airq_collector::{
    CollectorConfig, Database, DeviceRegistry, IngestionScheduler, MeasurementStore, NewDevice,
    ProviderRegistry,
};
use anyhow::Context;
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Air-quality data collector
#[derive(Parser, Debug)]
#[command(name = "airq-collector")]
#[command(about = "Polls sensor provider APIs and stores normalized air-quality measurements")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = "AIRQ_DATABASE_PATH")]
    database: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the ingestion scheduler until interrupted
    Serve,
    /// Run a single ingestion cycle and exit
    RunOnce,
    /// Initialize the database schema
    InitDb,
    /// Device management
    #[command(subcommand)]
    Device(DeviceCommand),
}

#[derive(Subcommand, Debug)]
enum DeviceCommand {
    /// Add a new device
    Add {
        /// Display name
        #[arg(long)]
        name: String,
        /// Provider kind (e.g. airgradient)
        #[arg(long)]
        provider: String,
        /// Provider API token
        #[arg(long)]
        token: String,
        /// Provider location identifier
        #[arg(long)]
        location: String,
        /// Validate the credential against the live provider before adding
        #[arg(long)]
        validate: bool,
    },
    /// List devices
    List {
        /// Include inactive devices
        #[arg(long)]
        all: bool,
    },
    /// Resume data collection for a device
    Activate { id: i64 },
    /// Stop data collection for a device, keeping its history
    Deactivate { id: i64 },
    /// Remove a device and all its measurements (irreversible)
    Remove {
        id: i64,
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
    /// Probe a device's provider with a live fetch
    Test { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(if cli.debug { "debug" } else { "info" })
        }))
        .init();

    let mut config = CollectorConfig::from_env().context("invalid configuration")?;
    if let Some(path) = cli.database {
        config.database_path = path;
    }

    let db = Database::open(&config.database_path)
        .await
        .context("failed to open database")?;
    let providers = Arc::new(
        ProviderRegistry::with_defaults(config.fetch_timeout)
            .context("failed to build provider registry")?,
    );
    let registry = Arc::new(DeviceRegistry::new(db.clone(), providers.clone()));
    let store = Arc::new(MeasurementStore::new(db));

    match cli.command {
        Command::Serve => {
            let scheduler =
                IngestionScheduler::new(registry, store, providers, config.clone())?;
            scheduler.start().await;
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for shutdown signal")?;
            info!("shutdown signal received");
            scheduler.shutdown().await;
        }
        Command::RunOnce => {
            let scheduler =
                IngestionScheduler::new(registry, store, providers, config.clone())?;
            let report = scheduler.run_cycle().await?;
            println!(
                "Polled {} device(s), stored {} reading(s), {} failure(s)",
                report.devices_polled,
                report.readings_stored,
                report.failed_devices.len()
            );
        }
        Command::InitDb => {
            // Schema creation happens on open.
            println!("Database initialized at {}", config.database_path.display());
        }
        Command::Device(cmd) => run_device_command(&registry, cmd).await?,
    }

    Ok(())
}

async fn run_device_command(registry: &DeviceRegistry, cmd: DeviceCommand) -> anyhow::Result<()> {
    match cmd {
        DeviceCommand::Add {
            name,
            provider,
            token,
            location,
            validate,
        } => {
            let device = registry
                .add(
                    NewDevice {
                        name,
                        provider_kind: provider,
                        credential: token,
                        location,
                    },
                    validate,
                )
                .await?;
            println!("Device '{}' added (ID: {})", device.name, device.id);
        }
        DeviceCommand::List { all } => {
            let devices = registry.list(all).await?;
            if devices.is_empty() {
                println!("No devices configured.");
                return Ok(());
            }
            println!(
                "{:<6} {:<24} {:<12} {:<10} Created",
                "ID", "Name", "Provider", "Status"
            );
            for device in devices {
                println!(
                    "{:<6} {:<24} {:<12} {:<10} {}",
                    device.id,
                    device.name,
                    device.provider_kind,
                    if device.active { "active" } else { "inactive" },
                    device.created_at.format("%Y-%m-%d")
                );
            }
        }
        DeviceCommand::Activate { id } => {
            registry.activate(id).await?;
            println!("Device {id} activated; data collection will resume.");
        }
        DeviceCommand::Deactivate { id } => {
            registry.deactivate(id).await?;
            println!("Device {id} deactivated; historical data preserved.");
        }
        DeviceCommand::Remove { id, yes } => {
            let device = registry.get(id).await?;
            if !yes && !confirm(&format!("Remove device '{}' (ID: {id})?", device.name))? {
                println!("Cancelled.");
                return Ok(());
            }
            registry.remove(id).await?;
            println!("Device '{}' removed.", device.name);
        }
        DeviceCommand::Test { id } => {
            let readings = registry.test_device(id).await?;
            match readings.first() {
                Some(reading) => println!(
                    "Connection successful. Sample: PM2.5={:?} CO2={:?} Temp={:?}",
                    reading.pm2_5, reading.co2, reading.temperature
                ),
                None => println!("Connection successful, no current readings."),
            }
        }
    }
    Ok(())
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    print!("{prompt} [y/N]: ");
    io::stdout().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(answer.trim().eq_ignore_ascii_case("y"))
}
