//! # Configuration Structures
//!
//! This module defines the configuration structures for the request
//! orchestration system.
//!
//! All configuration structures:
//! - Use `serde` for serialization/deserialization
//! - Use `validator` for field-level validation
//! - Fall back to the defaults of a stock installation for every omitted field

use orch_core::BackendConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Default timeout for hosted backends.
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

/// Default timeout for locally hosted backends, which are often slow to load.
pub const LOCAL_TIMEOUT_SECONDS: u64 = 300;

/// Main configuration structure for the orchestrator.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Names the backends the registry may resolve, the default attempt sequence,
/// and the cache, memory and audit policies of the engine.
///
/// ## Usage
/// ```rust,no_run
/// use config::OrchestratorConfig;
///
/// let config = OrchestratorConfig::default();
/// println!("Default backend: {}", config.default_backend);
/// ```
///
/// ## Fields
/// - `default_backend`: backend used when a request names none (default: "openai")
/// - `fallback_backends`: tried in order when a request lists no fallbacks
/// - `backends`: symbolic name to connection settings
/// - `cache`: result cache policy
/// - `memory`: conversation memory policy
/// - `audit`: audit log policy
///
/// ## Validation
/// Field rules are checked by `validator`; cross-field rules (names that must
/// resolve to configured backends) by [`crate::validate`].
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct OrchestratorConfig {
    /// Backend used when a request names none
    #[serde(default = "default_backend")]
    #[validate(length(min = 1, max = 255))]
    pub default_backend: String,

    /// Ordered default fallback sequence
    #[serde(default)]
    pub fallback_backends: Vec<String>,

    /// Configured backends by symbolic name
    #[serde(default = "default_backends")]
    pub backends: BTreeMap<String, BackendConfig>,

    /// Result cache policy
    #[serde(default)]
    #[validate(nested)]
    pub cache: CacheConfig,

    /// Conversation memory policy
    #[serde(default)]
    #[validate(nested)]
    pub memory: MemoryConfig,

    /// Audit log policy
    #[serde(default)]
    #[validate(nested)]
    pub audit: AuditConfig
}

fn default_backend() -> String {
    "openai".to_string()
}

/// Backends of a stock installation. Credentials are left empty.
pub fn default_backends() -> BTreeMap<String, BackendConfig> {
    let mut backends = BTreeMap::new();
    backends.insert(
        "openai".to_string(),
        BackendConfig::new("openai", "gpt-4o").with_base_url("https://api.openai.com/v1")
    );
    backends.insert(
        "anthropic".to_string(),
        BackendConfig::new("anthropic", "claude-3-opus-20240229")
            .with_base_url("https://api.anthropic.com/v1")
    );
    backends.insert(
        "ollama".to_string(),
        BackendConfig::new("ollama", "llama3")
            .with_base_url("http://localhost:11434")
            .with_timeout_seconds(LOCAL_TIMEOUT_SECONDS)
    );
    backends
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_backend: default_backend(),
            fallback_backends: Vec::new(),
            backends: default_backends(),
            cache: CacheConfig::default(),
            memory: MemoryConfig::default(),
            audit: AuditConfig::default()
        }
    }
}

impl OrchestratorConfig {
    /// Configuration with no backends, for assembling one programmatically.
    pub fn empty() -> Self {
        Self {
            backends: BTreeMap::new(),
            ..Self::default()
        }
    }

    pub fn with_backend(mut self, name: impl Into<String>, backend: BackendConfig) -> Self {
        self.backends.insert(name.into(), backend);
        self
    }

    pub fn with_default_backend(mut self, name: impl Into<String>) -> Self {
        self.default_backend = name.into();
        self
    }

    pub fn with_fallbacks<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.fallback_backends = names.into_iter().map(Into::into).collect();
        self
    }

    /// Backend settings for a symbolic name, ignoring any `:model` suffix.
    pub fn backend(&self, name: &str) -> Option<&BackendConfig> {
        let id = name.split_once(':').map_or(name, |(id, _)| id);
        self.backends.get(id)
    }
}

/// Result cache configuration.
///
/// # M-CANONICAL-DOCS
///
/// ## Fields
/// - `enabled`: when false, cache policies on requests are ignored (default: true)
/// - `default_ttl_seconds`: TTL used by callers that ask for "the default" (default: 3600)
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_ttl_seconds")]
    #[validate(range(min = 1, max = 2592000))]
    pub default_ttl_seconds: u64
}

fn default_true() -> bool {
    true
}

fn default_ttl_seconds() -> u64 {
    3600
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_seconds: default_ttl_seconds()
        }
    }
}

/// Conversation memory configuration.
///
/// `max_turns = 0` keeps every turn.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct MemoryConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_turns")]
    pub max_turns: usize
}

fn default_max_turns() -> usize {
    50
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_turns: default_max_turns()
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// `memory` keeps rows for querying, `tracing` writes them to the log
    #[serde(default = "default_audit_driver")]
    #[validate(custom(function = "validate_audit_driver"))]
    pub driver: String
}

fn default_audit_driver() -> String {
    "memory".to_string()
}

fn validate_audit_driver(value: &str) -> Result<(), validator::ValidationError> {
    match value {
        "memory" | "tracing" => Ok(()),
        _ => Err(validator::ValidationError::new("Invalid audit driver"))
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            driver: default_audit_driver()
        }
    }
}
