//! # Configuration System
//!
//! Centralized configuration management for the request orchestration system.
//!
//! This crate provides:
//! - Configuration structures for backends, cache, memory and audit policy
//! - Environment variable loading (12-factor app principles)
//! - Configuration file loading (TOML/YAML)
//! - Cross-field validation and backend readiness
//!
//! # Best Practices
//!
//! - Uses `validator` crate for input validation
//! - Follows 12-factor app configuration principles
//! - Provides clear error messages for invalid configuration

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod status;

pub use config::{
    AuditConfig, CacheConfig, MemoryConfig, OrchestratorConfig, DEFAULT_TIMEOUT_SECONDS,
    LOCAL_TIMEOUT_SECONDS
};
pub use file_loader::{load_from_file, load_from_toml, load_from_yaml, ConfigFileError};
pub use loader::load_from_env;
pub use orch_core::BackendConfig;
pub use status::{backend_status, validate, BackendStatus};
pub use validator::Validate;
