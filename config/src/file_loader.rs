//! # Configuration File Loading
//!
//! Loads configuration from TOML or YAML files.
//!
//! Supports automatic format detection based on file extension.

use crate::config::OrchestratorConfig;
use std::path::Path;

/// Configuration file loading error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String)
}

fn read(path: &Path) -> Result<String, ConfigFileError> {
    std::fs::read_to_string(path)
        .map_err(|_e| ConfigFileError::FileNotFound(path.display().to_string()))
}

/// Load configuration from TOML file.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_toml;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_toml(Path::new("orchestrator.toml"))?;
///     println!("Default backend: {}", config.default_backend);
///     Ok(())
/// }
/// ```
///
/// ## Error Handling
/// Returns `ConfigFileError` for a missing file or invalid TOML. Omitted
/// fields take their defaults.
pub fn load_from_toml(path: &Path) -> Result<OrchestratorConfig, ConfigFileError> {
    let contents = read(path)?;
    toml::from_str(&contents).map_err(|e| ConfigFileError::TomlParse(e.to_string()))
}

/// Load configuration from YAML file.
///
/// ## Error Handling
/// Returns `ConfigFileError` for a missing file or invalid YAML.
pub fn load_from_yaml(path: &Path) -> Result<OrchestratorConfig, ConfigFileError> {
    let contents = read(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigFileError::YamlParse(e.to_string()))
}

/// Load configuration from file with auto-detection.
///
/// # M-CANONICAL-DOCS
///
/// ## Supported Formats
/// - `.toml`: TOML format
/// - `.yaml`: YAML format
/// - `.yml`: YAML format
pub fn load_from_file(path: &Path) -> Result<OrchestratorConfig, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    match extension.to_lowercase().as_str() {
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orchestrator.toml");

        let toml_content = r#"
default_backend = "anthropic"
fallback_backends = ["openai:gpt-4", "local"]

[backends.anthropic]
driver = "anthropic"
api_key = "sk-ant"
model = "claude-3-sonnet-20240229"

[backends.openai]
driver = "openai"
model = "gpt-4o"

[backends.local]
driver = "ollama"
base_url = "http://gpu-box:11434"
model = "llama3"
timeout_seconds = 300

[cache]
default_ttl_seconds = 600

[memory]
max_turns = 10
"#;
        fs::write(&path, toml_content).unwrap();

        let config = load_from_toml(&path).unwrap();
        assert_eq!(config.default_backend, "anthropic");
        assert_eq!(config.fallback_backends, vec!["openai:gpt-4", "local"]);
        assert_eq!(config.backends.len(), 3);
        assert_eq!(config.backends["local"].timeout_seconds, 300);
        assert_eq!(config.backends["openai"].timeout_seconds, 60);
        assert_eq!(config.cache.default_ttl_seconds, 600);
        assert!(config.cache.enabled);
        assert_eq!(config.memory.max_turns, 10);
        assert_eq!(config.audit.driver, "memory");
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orchestrator.yml");

        let yaml_content = r#"
default_backend: openai
backends:
  openai:
    driver: openai
    api_key: sk-test
    model: gpt-4o-mini
audit:
  driver: tracing
"#;
        fs::write(&path, yaml_content).unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.backends["openai"].model, "gpt-4o-mini");
        assert_eq!(config.audit.driver, "tracing");
        assert!(config.fallback_backends.is_empty());
    }

    #[test]
    fn test_load_from_file_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orchestrator.json");
        fs::write(&path, "{}").unwrap();

        let result = load_from_file(&path);
        assert!(matches!(result, Err(ConfigFileError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_load_from_file_no_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("orchestrator");
        fs::write(&path, "").unwrap();

        let result = load_from_file(&path);
        assert!(matches!(result, Err(ConfigFileError::NoExtension)));
    }

    #[test]
    fn test_load_from_toml_missing_file() {
        let result = load_from_toml(Path::new("/nonexistent/orchestrator.toml"));
        assert!(matches!(result, Err(ConfigFileError::FileNotFound(_))));
    }
}
