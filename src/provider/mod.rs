//! Provider adapters for remote sensor APIs
//!
//! Each provider kind implements [`ProviderAdapter`]: fetch the latest
//! readings for a configured location and normalize them into the canonical
//! measurement shape. Unit conversion and field-name mapping happen here and
//! nowhere else; the rest of the pipeline never special-cases a provider.
//!
//! Adding a provider means implementing the trait and registering the
//! implementation under its kind in [`ProviderRegistry`].

pub mod airgradient;

pub use airgradient::AirGradientAdapter;

use crate::error::{AirqError, Result};
use crate::storage::NewMeasurement;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Enumerated provider kinds with a registered adapter implementation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    AirGradient,
}

impl ProviderKind {
    /// Canonical kind string, as stored in the database
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::AirGradient => "airgradient",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = AirqError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "airgradient" => Ok(ProviderKind::AirGradient),
            other => Err(AirqError::unknown_provider(other)),
        }
    }
}

/// Capability set implemented per provider kind
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// The kind this adapter serves
    fn kind(&self) -> ProviderKind;

    /// Fetch the latest readings for a credential/location pair, normalized
    /// into the canonical measurement shape.
    ///
    /// An empty result is valid ("no new data"). Transport failures, non-2xx
    /// responses, and malformed bodies are errors.
    async fn fetch_latest(&self, credential: &str, location: &str) -> Result<Vec<NewMeasurement>>;

    /// Lightweight authenticated probe confirming the credential/location
    /// pair is usable.
    ///
    /// Returns `Ok(false)` for an auth failure or unknown location; errors
    /// are reserved for transport-level faults.
    async fn validate(&self, credential: &str, location: &str) -> Result<bool>;
}

/// Registry mapping provider kinds to adapter implementations
pub struct ProviderRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Create a registry with all built-in adapters, sharing one HTTP client
    /// bounded by `fetch_timeout`
    pub fn with_defaults(fetch_timeout: Duration) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(Arc::new(AirGradientAdapter::new(fetch_timeout)?));
        Ok(registry)
    }

    /// Register an adapter under its kind, replacing any previous one
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.kind(), adapter);
    }

    /// Resolve the adapter for a kind
    pub fn resolve(&self, kind: ProviderKind) -> Result<Arc<dyn ProviderAdapter>> {
        self.adapters
            .get(&kind)
            .cloned()
            .ok_or_else(|| AirqError::unknown_provider(kind.as_str()))
    }

    /// Parse a kind string and resolve its adapter in one step
    pub fn resolve_str(&self, kind: &str) -> Result<Arc<dyn ProviderAdapter>> {
        self.resolve(kind.parse()?)
    }

    /// Whether no adapter is registered at all (startup misconfiguration)
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Registered kinds, for CLI help output
    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
