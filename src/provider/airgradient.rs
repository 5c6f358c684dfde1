//! AirGradient provider adapter
//!
//! Polls the AirGradient public API for the current measures of one location
//! and maps the vendor field names onto the canonical measurement shape.

use crate::error::{AirqError, Result};
use crate::provider::{ProviderAdapter, ProviderKind};
use crate::storage::NewMeasurement;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default AirGradient public API base
pub const DEFAULT_BASE_URL: &str = "https://api.airgradient.com/public/api/v1";

/// Adapter for AirGradient devices
pub struct AirGradientAdapter {
    client: reqwest::Client,
    base_url: Url,
}

/// Raw reading as returned by the AirGradient "current measures" endpoint
#[derive(Debug, Deserialize)]
struct AirGradientReading {
    timestamp: Option<DateTime<Utc>>,
    pm01: Option<f64>,
    pm02: Option<f64>,
    pm10: Option<f64>,
    rco2: Option<f64>,
    atmp: Option<f64>,
    rhum: Option<f64>,
    #[serde(rename = "noxIndex")]
    nox_index: Option<f64>,
    #[serde(rename = "tvocIndex")]
    tvoc_index: Option<f64>,
}

impl AirGradientAdapter {
    /// Create an adapter against the public AirGradient API with a bounded
    /// request timeout
    pub fn new(fetch_timeout: Duration) -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL, fetch_timeout)
    }

    /// Create an adapter against a custom API base (tests, staging)
    pub fn with_base_url(base_url: &str, fetch_timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| AirqError::config(format!("invalid AirGradient base URL: {e}")))?;
        let client = reqwest::Client::builder()
            .timeout(fetch_timeout)
            .build()
            .map_err(AirqError::Http)?;

        Ok(Self { client, base_url })
    }

    fn measures_url(&self, location: &str) -> Url {
        let path = format!(
            "{}/locations/{}/measures/current",
            self.base_url.path().trim_end_matches('/'),
            location
        );
        let mut url = self.base_url.clone();
        url.set_path(&path);
        url
    }
}

#[async_trait]
impl ProviderAdapter for AirGradientAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::AirGradient
    }

    async fn fetch_latest(&self, credential: &str, location: &str) -> Result<Vec<NewMeasurement>> {
        let url = self.measures_url(location);
        let response = self
            .client
            .get(url)
            .query(&[("token", credential)])
            .send()
            .await?
            .error_for_status()?;

        // A null body is the provider's way of saying "no new data".
        let raw: Option<AirGradientReading> = response.json().await?;
        let Some(raw) = raw else {
            debug!(location, "AirGradient returned no current measures");
            return Ok(Vec::new());
        };

        Ok(vec![normalize(raw)])
    }

    async fn validate(&self, credential: &str, location: &str) -> Result<bool> {
        let url = self.measures_url(location);
        let response = self
            .client
            .get(url)
            .query(&[("token", credential)])
            .send()
            .await
            .map_err(|e| AirqError::validation(format!("AirGradient unreachable: {e}")))?;

        let status = response.status();
        if status.is_success() {
            return Ok(true);
        }
        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
            || status == reqwest::StatusCode::NOT_FOUND
        {
            debug!(location, %status, "AirGradient rejected credential/location");
            return Ok(false);
        }

        Err(AirqError::validation(format!(
            "AirGradient returned unexpected status {status}"
        )))
    }
}

/// Map an AirGradient reading onto the canonical measurement shape.
///
/// Absent metrics stay absent. A missing provider timestamp falls back to
/// ingestion time.
fn normalize(raw: AirGradientReading) -> NewMeasurement {
    NewMeasurement {
        timestamp: raw.timestamp.unwrap_or_else(Utc::now),
        pm1: raw.pm01,
        pm2_5: raw.pm02,
        pm10: raw.pm10,
        co2: raw.rco2,
        temperature: raw.atmp,
        humidity: raw.rhum,
        nox_index: raw.nox_index,
        tvoc_index: raw.tvoc_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn normalize_maps_vendor_field_names() {
        let raw: AirGradientReading = serde_json::from_value(serde_json::json!({
            "timestamp": "2024-03-01T12:00:00Z",
            "pm01": 4.0,
            "pm02": 12.5,
            "pm10": 18.0,
            "rco2": 640.0,
            "atmp": 21.3,
            "rhum": 48.0,
            "noxIndex": 1.0,
            "tvocIndex": 95.0,
        }))
        .unwrap();

        let m = normalize(raw);
        assert_eq!(
            m.timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
        );
        assert_eq!(m.pm1, Some(4.0));
        assert_eq!(m.pm2_5, Some(12.5));
        assert_eq!(m.pm10, Some(18.0));
        assert_eq!(m.co2, Some(640.0));
        assert_eq!(m.temperature, Some(21.3));
        assert_eq!(m.humidity, Some(48.0));
        assert_eq!(m.nox_index, Some(1.0));
        assert_eq!(m.tvoc_index, Some(95.0));
    }

    #[test]
    fn absent_metrics_stay_absent() {
        let raw: AirGradientReading = serde_json::from_value(serde_json::json!({
            "timestamp": "2024-03-01T12:00:00Z",
            "pm02": 9.0,
        }))
        .unwrap();

        let m = normalize(raw);
        assert_eq!(m.pm2_5, Some(9.0));
        assert_eq!(m.co2, None);
        assert_eq!(m.temperature, None);
        assert_eq!(m.nox_index, None);
    }

    #[test]
    fn missing_timestamp_falls_back_to_ingestion_time() {
        let raw: AirGradientReading =
            serde_json::from_value(serde_json::json!({ "pm02": 9.0 })).unwrap();
        let before = Utc::now();
        let m = normalize(raw);
        assert!(m.timestamp >= before);
    }

    #[test]
    fn measures_url_embeds_the_location() {
        let adapter =
            AirGradientAdapter::with_base_url("http://localhost:8080/api/v1", Duration::from_secs(5))
                .unwrap();
        let url = adapter.measures_url("loc-77");
        assert_eq!(url.path(), "/api/v1/locations/loc-77/measures/current");
    }
}
