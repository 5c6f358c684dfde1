//! Shared test infrastructure
//!
//! Wiremock-based AirGradient API stub plus a wired-up collector harness
//! over an in-memory database.

#![allow(dead_code)]

use airq_collector::{
    AirGradientAdapter, CollectorConfig, Database, DeviceRegistry, IngestionScheduler,
    MeasurementStore, NewDevice, ProviderRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Mock AirGradient API for testing without live credentials
pub struct MockAirGradient {
    pub server: MockServer,
}

impl MockAirGradient {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    fn measures_path(location: &str) -> String {
        format!("/locations/{location}/measures/current")
    }

    /// Serve a current-measures body for one location
    pub async fn mock_reading(&self, location: &str, body: Value) {
        Mock::given(method("GET"))
            .and(path(Self::measures_path(location)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.server)
            .await;
    }

    /// Serve a bare status code for one location
    pub async fn mock_status(&self, location: &str, status: u16) {
        Mock::given(method("GET"))
            .and(path(Self::measures_path(location)))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Serve a delayed response, for timeout behavior
    pub async fn mock_slow_reading(&self, location: &str, body: Value, delay: Duration) {
        Mock::given(method("GET"))
            .and(path(Self::measures_path(location)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(body)
                    .set_delay(delay),
            )
            .mount(&self.server)
            .await;
    }
}

/// A vendor-shaped reading body
pub fn reading_body(timestamp: &str, pm02: f64, rco2: f64) -> Value {
    json!({
        "timestamp": timestamp,
        "pm01": 3.0,
        "pm02": pm02,
        "pm10": 15.0,
        "rco2": rco2,
        "atmp": 21.0,
        "rhum": 45.0,
        "noxIndex": 1.0,
        "tvocIndex": 80.0,
    })
}

/// Collector wired against a mock provider and an in-memory database
pub struct TestCollector {
    pub registry: Arc<DeviceRegistry>,
    pub store: Arc<MeasurementStore>,
    pub scheduler: IngestionScheduler,
}

/// Build a collector whose AirGradient adapter points at `provider_uri`
pub async fn collector_against(provider_uri: &str) -> TestCollector {
    let config = CollectorConfig {
        fetch_timeout: Duration::from_millis(500),
        poll_interval: Duration::from_secs(60),
        ..CollectorConfig::default()
    };

    let db = Database::open_in_memory().await.expect("in-memory database");
    let mut providers = ProviderRegistry::new();
    providers.register(Arc::new(
        AirGradientAdapter::with_base_url(provider_uri, config.fetch_timeout)
            .expect("adapter against mock"),
    ));
    let providers = Arc::new(providers);

    let registry = Arc::new(DeviceRegistry::new(db.clone(), providers.clone()));
    let store = Arc::new(MeasurementStore::new(db));
    let scheduler = IngestionScheduler::new(
        registry.clone(),
        store.clone(),
        providers,
        config,
    )
    .expect("scheduler");

    TestCollector {
        registry,
        store,
        scheduler,
    }
}

/// Add a device through the registry without live validation
pub async fn add_device(registry: &DeviceRegistry, name: &str, location: &str) -> i64 {
    registry
        .add(
            NewDevice {
                name: name.to_string(),
                provider_kind: "airgradient".to_string(),
                credential: format!("token-{name}"),
                location: location.to_string(),
            },
            false,
        )
        .await
        .expect("device add")
        .id
}
