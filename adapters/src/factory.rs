//! Driver factories turning [`BackendConfig`] entries into adapters.

use crate::anthropic::AnthropicBackend;
use crate::ollama::OllamaBackend;
use crate::openai::OpenAiBackend;
use errors::ConfigurationError;
use orch_core::{BackendAdapter, BackendConfig, BackendFactory};
use std::sync::Arc;

fn require_api_key(name: &str, config: &BackendConfig) -> Result<(), ConfigurationError> {
    match config.api_key.as_deref() {
        Some(key) if !key.trim().is_empty() => Ok(()),
        _ => Err(ConfigurationError::MissingField {
            name: name.to_string(),
            field: "api_key".to_string()
        })
    }
}

fn client_error(name: &str, reason: String) -> ConfigurationError {
    ConfigurationError::InvalidValue {
        field: format!("backends.{name}"),
        reason
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiFactory;

impl BackendFactory for OpenAiFactory {
    fn driver(&self) -> &str {
        "openai"
    }

    fn build(
        &self,
        name: &str,
        config: &BackendConfig,
        model_override: Option<&str>
    ) -> Result<Arc<dyn BackendAdapter>, ConfigurationError> {
        require_api_key(name, config)?;
        let model = model_override.unwrap_or(&config.model);
        let backend = OpenAiBackend::from_config(name, config, model)
            .map_err(|e| client_error(name, e))?;
        Ok(Arc::new(backend))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicFactory;

impl BackendFactory for AnthropicFactory {
    fn driver(&self) -> &str {
        "anthropic"
    }

    fn build(
        &self,
        name: &str,
        config: &BackendConfig,
        model_override: Option<&str>
    ) -> Result<Arc<dyn BackendAdapter>, ConfigurationError> {
        require_api_key(name, config)?;
        let model = model_override.unwrap_or(&config.model);
        let backend = AnthropicBackend::from_config(name, config, model)
            .map_err(|e| client_error(name, e))?;
        Ok(Arc::new(backend))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OllamaFactory;

impl BackendFactory for OllamaFactory {
    fn driver(&self) -> &str {
        "ollama"
    }

    fn build(
        &self,
        name: &str,
        config: &BackendConfig,
        model_override: Option<&str>
    ) -> Result<Arc<dyn BackendAdapter>, ConfigurationError> {
        if config.base_url.as_deref().is_none_or(|url| url.trim().is_empty()) {
            return Err(ConfigurationError::MissingField {
                name: name.to_string(),
                field: "base_url".to_string()
            });
        }
        let model = model_override.unwrap_or(&config.model);
        let backend = OllamaBackend::from_config(name, config, model)
            .map_err(|e| client_error(name, e))?;
        Ok(Arc::new(backend))
    }
}

/// Factories for every driver shipped with this crate.
pub fn builtin_factories() -> Vec<Arc<dyn BackendFactory>> {
    vec![
        Arc::new(OpenAiFactory),
        Arc::new(AnthropicFactory),
        Arc::new(OllamaFactory),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_api_key_is_reported() {
        let config = BackendConfig::new("openai", "gpt-4o");
        let err = OpenAiFactory.build("openai", &config, None).err().unwrap();
        assert_eq!(
            err,
            ConfigurationError::MissingField {
                name: "openai".to_string(),
                field: "api_key".to_string()
            }
        );
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let config = BackendConfig::new("anthropic", "claude-3-haiku").with_api_key("  ");
        assert!(AnthropicFactory.build("anthropic", &config, None).is_err());
    }

    #[test]
    fn test_model_override_applies_to_instance() {
        let config = BackendConfig::new("openai", "gpt-4o").with_api_key("sk-test");
        let adapter = OpenAiFactory.build("openai", &config, Some("gpt-4-turbo")).unwrap();
        assert_eq!(adapter.model_name(), "gpt-4-turbo");
        assert_eq!(adapter.backend_name(), "openai");

        let default = OpenAiFactory.build("openai", &config, None).unwrap();
        assert_eq!(default.model_name(), "gpt-4o");
    }

    #[test]
    fn test_ollama_needs_base_url_not_key() {
        let without_url = BackendConfig::new("ollama", "llama3");
        assert!(matches!(
            OllamaFactory.build("local", &without_url, None),
            Err(ConfigurationError::MissingField { ref field, .. }) if field == "base_url"
        ));

        let config = without_url.with_base_url("http://localhost:11434");
        let adapter = OllamaFactory.build("local", &config, None).unwrap();
        assert_eq!(adapter.backend_name(), "local");
        assert_eq!(adapter.cost(orch_core::RequestKind::Chat, &orch_core::TokenUsage::new(10, 10)), 0.0);
    }

    #[test]
    fn test_builtin_drivers() {
        let drivers: Vec<String> = builtin_factories()
            .iter()
            .map(|f| f.driver().to_string())
            .collect();
        assert_eq!(drivers, vec!["openai", "anthropic", "ollama"]);
    }
}
