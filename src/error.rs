//! Error types for the air-quality collector
//!
//! One taxonomy covers the whole pipeline: registry errors surface to the
//! caller, fetch errors stay inside the ingestion cycle that produced them.

use crate::provider::ProviderKind;
use thiserror::Error;

/// Result type alias for collector operations
pub type Result<T> = std::result::Result<T, AirqError>;

/// Error types for collector operations
#[derive(Error, Debug)]
pub enum AirqError {
    /// Provider kind with no registered adapter
    #[error("unknown provider kind: {0}")]
    UnknownProvider(String),

    /// Credential rejected by the provider during validation
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// Unknown device id
    #[error("not found: {0}")]
    NotFound(String),

    /// Transient provider/network fault during a fetch, attributed to the
    /// device being polled
    #[error("fetch failed for device {device_id} ({kind}): {message}")]
    Fetch {
        kind: ProviderKind,
        device_id: i64,
        message: String,
    },

    /// Transport fault during a credential check (distinct from a clean
    /// "invalid" result, which is not an error)
    #[error("credential validation error: {0}")]
    Validation(String),

    /// Database errors
    #[error("database error: {0}")]
    Database(String),

    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AirqError {
    /// Create an unknown-provider error
    pub fn unknown_provider<S: Into<String>>(kind: S) -> Self {
        Self::UnknownProvider(kind.into())
    }

    /// Create an invalid-credential error
    pub fn invalid_credential<S: Into<String>>(msg: S) -> Self {
        Self::InvalidCredential(msg.into())
    }

    /// Create a not-found error for a device id
    pub fn device_not_found(id: i64) -> Self {
        Self::NotFound(format!("device {id}"))
    }

    /// Create a fetch error attributed to one device
    pub fn fetch<S: Into<String>>(kind: ProviderKind, device_id: i64, message: S) -> Self {
        Self::Fetch {
            kind,
            device_id,
            message: message.into(),
        }
    }

    /// Create a validation transport error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a database error
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the next scheduled cycle may succeed where this one failed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            AirqError::Fetch { .. } | AirqError::Validation(_) | AirqError::Http(_)
        )
    }

    /// Whether this error is a malformed request (unknown id or kind) that the
    /// caller should report rather than retry
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            AirqError::UnknownProvider(_)
                | AirqError::InvalidCredential(_)
                | AirqError::NotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_errors_are_transient() {
        let err = AirqError::fetch(ProviderKind::AirGradient, 7, "connection reset");
        assert!(err.is_transient());
        assert!(!err.is_user_error());
    }

    #[test]
    fn registry_errors_are_user_errors() {
        assert!(AirqError::unknown_provider("nosuch").is_user_error());
        assert!(AirqError::device_not_found(42).is_user_error());
        assert!(!AirqError::database("locked").is_user_error());
    }

    #[test]
    fn fetch_error_names_device_and_kind() {
        let msg = AirqError::fetch(ProviderKind::AirGradient, 3, "timeout").to_string();
        assert!(msg.contains("device 3"));
        assert!(msg.contains("airgradient"));
    }
}
