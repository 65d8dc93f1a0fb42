//! # Environment Variable Loader
//!
//! Loads configuration from environment variables following 12-factor app
//! principles.
//!
//! # Naming Convention
//! - `AI_*`: Orchestrator-wide settings
//! - `OPENAI_*`: OpenAI backend settings
//! - `ANTHROPIC_*`: Anthropic backend settings
//! - `OLLAMA_*`: Ollama backend settings

use crate::config::{AuditConfig, CacheConfig, MemoryConfig, OrchestratorConfig};
use orch_core::BackendConfig;
use std::env;

/// Load configuration from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Starts from [`OrchestratorConfig::default`] and applies every variable
/// that is set. Unset variables keep their defaults; set but unparseable
/// variables are an error.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Default backend: {}", config.default_backend);
///     Ok(())
/// }
/// ```
///
/// ## Environment Variables
/// ### Orchestrator Settings (`AI_*`)
/// - `AI_DRIVER`: Default backend (default: "openai")
/// - `AI_FALLBACK_DRIVER`: Comma-separated fallback backends (default: none)
/// - `AI_CACHE_ENABLED`: Enable result caching (true/false, default: true)
/// - `AI_CACHE_TTL`: Default cache TTL in seconds (default: 3600)
/// - `AI_MEMORY_ENABLED`: Enable conversation memory (true/false, default: true)
/// - `AI_MEMORY_MAX_MESSAGES`: Turns kept per session, 0 keeps all (default: 50)
/// - `AI_LOGGING_ENABLED`: Enable the audit log (true/false, default: true)
/// - `AI_LOGGING_DRIVER`: Audit driver, "memory" or "tracing" (default:
///   "memory"; "database" and "file" are accepted as aliases)
///
/// ### Backend Settings
/// - `OPENAI_API_KEY`, `OPENAI_MODEL` (default: "gpt-4o"), `OPENAI_BASE_URL`
/// - `ANTHROPIC_API_KEY`, `ANTHROPIC_MODEL` (default: "claude-3-opus-20240229")
/// - `OLLAMA_BASE_URL` (default: "http://localhost:11434"), `OLLAMA_MODEL`
///   (default: "llama3")
pub fn load_from_env() -> Result<OrchestratorConfig, Box<dyn std::error::Error>> {
    let mut config = OrchestratorConfig::default();

    if let Ok(driver) = env::var("AI_DRIVER") {
        config.default_backend = driver;
    }
    if let Ok(fallbacks) = env::var("AI_FALLBACK_DRIVER") {
        config.fallback_backends = split_list(&fallbacks);
    }

    config.cache = load_cache_from_env()?;
    config.memory = load_memory_from_env()?;
    config.audit = load_audit_from_env()?;

    apply_backend_env(&mut config, "openai", "OPENAI");
    apply_backend_env(&mut config, "anthropic", "ANTHROPIC");
    apply_backend_env(&mut config, "ollama", "OLLAMA");

    Ok(config)
}

fn load_cache_from_env() -> Result<CacheConfig, Box<dyn std::error::Error>> {
    let defaults = CacheConfig::default();
    Ok(CacheConfig {
        enabled: parse_env_or("AI_CACHE_ENABLED", defaults.enabled)?,
        default_ttl_seconds: parse_env_or("AI_CACHE_TTL", defaults.default_ttl_seconds)?
    })
}

fn load_memory_from_env() -> Result<MemoryConfig, Box<dyn std::error::Error>> {
    let defaults = MemoryConfig::default();
    Ok(MemoryConfig {
        enabled: parse_env_or("AI_MEMORY_ENABLED", defaults.enabled)?,
        max_turns: parse_env_or("AI_MEMORY_MAX_MESSAGES", defaults.max_turns)?
    })
}

fn load_audit_from_env() -> Result<AuditConfig, Box<dyn std::error::Error>> {
    let defaults = AuditConfig::default();
    let driver = match env::var("AI_LOGGING_DRIVER") {
        Ok(driver) => match driver.to_lowercase().as_str() {
            "database" | "memory" => "memory".to_string(),
            "file" | "tracing" => "tracing".to_string(),
            other => other.to_string()
        },
        Err(_) => defaults.driver
    };
    Ok(AuditConfig {
        enabled: parse_env_or("AI_LOGGING_ENABLED", defaults.enabled)?,
        driver
    })
}

fn apply_backend_env(config: &mut OrchestratorConfig, name: &str, prefix: &str) {
    let api_key = env::var(format!("{prefix}_API_KEY")).ok();
    let model = env::var(format!("{prefix}_MODEL")).ok();
    let base_url = env::var(format!("{prefix}_BASE_URL")).ok();

    if api_key.is_none() && model.is_none() && base_url.is_none() {
        return;
    }

    let backend = config
        .backends
        .entry(name.to_string())
        .or_insert_with(|| BackendConfig::new(name, ""));
    if api_key.is_some() {
        backend.api_key = api_key;
    }
    if let Some(model) = model {
        backend.model = model;
    }
    if base_url.is_some() {
        backend.base_url = base_url;
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T>(key: &str) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static
{
    match env::var(key) {
        Ok(s) => s
            .trim()
            .parse::<T>()
            .map_err(|e| format!("{key}: {e}").into()),
        Err(e) => Err(Box::new(e) as Box<dyn std::error::Error>)
    }
}

fn parse_env_or<T>(key: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static
{
    if env::var_os(key).is_none() {
        return Ok(default);
    }
    parse_env(key)
}
