//! # Configuration Validation and Readiness
//!
//! Field rules come from the `validator` derives; this module adds the
//! cross-field rules and reports per-backend readiness.

use crate::config::OrchestratorConfig;
use errors::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Drivers that talk to a local endpoint and need no credential.
const KEYLESS_DRIVERS: &[&str] = &["ollama"];

/// Validate a configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Validation Rules
/// - `default_backend`: non-empty, resolves to a configured backend
/// - `fallback_backends`: every entry resolves to a configured backend
/// - every backend: non-empty driver and model, timeout 1-3600 seconds
/// - `cache.default_ttl_seconds`: 1-2592000
/// - `audit.driver`: "memory" or "tracing"
///
/// A `name:model` entry resolves when `name` is configured.
pub fn validate(config: &OrchestratorConfig) -> Result<(), ConfigurationError> {
    config
        .validate()
        .map_err(|e| ConfigurationError::InvalidValue {
            field: "orchestrator".to_string(),
            reason: e.to_string()
        })?;

    for (name, backend) in &config.backends {
        backend
            .validate()
            .map_err(|e| ConfigurationError::InvalidValue {
                field: format!("backends.{name}"),
                reason: e.to_string()
            })?;
    }

    let names = std::iter::once(&config.default_backend).chain(config.fallback_backends.iter());
    for name in names {
        if config.backend(name).is_none() {
            return Err(ConfigurationError::NotConfigured { name: name.clone() });
        }
    }

    Ok(())
}

/// Readiness of one configured backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendStatus {
    Ready,
    MissingConfiguration,
    MissingApiKey,
    MissingBaseUrl
}

impl BackendStatus {
    pub fn is_ready(self) -> bool {
        self == BackendStatus::Ready
    }
}

impl fmt::Display for BackendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BackendStatus::Ready => "Ready",
            BackendStatus::MissingConfiguration => "Missing configuration",
            BackendStatus::MissingApiKey => "Missing API key",
            BackendStatus::MissingBaseUrl => "Missing base URL"
        };
        f.write_str(label)
    }
}

/// Whether a backend has what its driver needs to be called.
pub fn backend_status(config: &OrchestratorConfig, name: &str) -> BackendStatus {
    let Some(backend) = config.backend(name) else {
        return BackendStatus::MissingConfiguration;
    };

    let present = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());

    if KEYLESS_DRIVERS.contains(&backend.driver.as_str()) {
        if present(&backend.base_url) {
            BackendStatus::Ready
        } else {
            BackendStatus::MissingBaseUrl
        }
    } else if present(&backend.api_key) {
        BackendStatus::Ready
    } else {
        BackendStatus::MissingApiKey
    }
}
