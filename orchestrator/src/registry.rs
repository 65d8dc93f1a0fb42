//! Backend Registry: symbolic names to adapter instances.

use config::{BackendStatus, OrchestratorConfig, backend_status};
use dashmap::DashMap;
use errors::ConfigurationError;
use orch_core::{BackendAdapter, BackendFactory};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Split `"name:model"` into the backend id and an optional model override.
///
/// Only the first `:` separates; an empty override counts as none.
pub fn parse_backend_name(name: &str) -> (&str, Option<&str>) {
    match name.split_once(':') {
        Some((id, model)) if !model.is_empty() => (id, Some(model)),
        Some((id, _)) => (id, None),
        None => (name, None)
    }
}

/// Readiness of one configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendStatusEntry {
    pub name: String,
    pub driver: String,
    pub model: String,
    pub status: BackendStatus,
    pub is_default: bool,
    pub is_fallback: bool
}

/// Resolves symbolic backend names against configuration and driver
/// factories, caching built adapters per full name.
///
/// A model override yields a separate instance; configuration is never
/// mutated.
pub struct BackendRegistry {
    config: OrchestratorConfig,
    factories: HashMap<String, Arc<dyn BackendFactory>>,
    registered: DashMap<String, Arc<dyn BackendAdapter>>,
    instances: DashMap<String, Arc<dyn BackendAdapter>>
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.config.backends.keys().collect::<Vec<_>>())
            .field("drivers", &self.factories.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl BackendRegistry {
    /// Registry with the built-in `openai`, `anthropic` and `ollama` drivers.
    pub fn new(config: OrchestratorConfig) -> Self {
        adapters::builtin_factories()
            .into_iter()
            .fold(Self::without_drivers(config), Self::with_factory)
    }

    pub fn without_drivers(config: OrchestratorConfig) -> Self {
        Self {
            config,
            factories: HashMap::new(),
            registered: DashMap::new(),
            instances: DashMap::new()
        }
    }

    /// Add or replace the factory for its driver.
    pub fn with_factory(mut self, factory: Arc<dyn BackendFactory>) -> Self {
        self.factories.insert(factory.driver().to_string(), factory);
        self
    }

    /// Serve `name` with a pre-built adapter, bypassing configuration.
    ///
    /// Registered under a plain id, the adapter also answers `id:model`
    /// names; it cannot change its own model, so the override is ignored.
    pub fn register(&self, name: impl Into<String>, adapter: Arc<dyn BackendAdapter>) {
        let name = name.into();
        self.instances.retain(|key, _| parse_backend_name(key).0 != name);
        self.registered.insert(name, adapter);
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn default_backend(&self) -> &str {
        &self.config.default_backend
    }

    pub fn fallback_backends(&self) -> &[String] {
        &self.config.fallback_backends
    }

    /// # M-CANONICAL-DOCS
    ///
    /// ## Purpose
    /// Turn a symbolic name into a callable adapter.
    ///
    /// ## Behavior
    /// - Pre-registered adapters win over configuration
    /// - Unknown ids and unknown drivers are configuration errors, which
    ///   fail the same way every time
    /// - Built adapters are reused for the same full name
    pub fn resolve(&self, name: &str) -> Result<Arc<dyn BackendAdapter>, ConfigurationError> {
        if let Some(adapter) = self.registered.get(name) {
            return Ok(Arc::clone(adapter.value()));
        }
        if let Some(adapter) = self.instances.get(name) {
            return Ok(Arc::clone(adapter.value()));
        }

        let (id, model_override) = parse_backend_name(name);
        if let Some(adapter) = self.registered.get(id) {
            debug!(backend = name, "Model override ignored for pre-registered backend");
            return Ok(Arc::clone(adapter.value()));
        }

        let backend = self
            .config
            .backends
            .get(id)
            .ok_or_else(|| ConfigurationError::NotConfigured {
                name: id.to_string()
            })?;
        let factory =
            self.factories
                .get(&backend.driver)
                .ok_or_else(|| ConfigurationError::UnsupportedDriver {
                    driver: backend.driver.clone()
                })?;

        let adapter = factory.build(id, backend, model_override)?;
        debug!(
            backend = name,
            driver = %backend.driver,
            model = adapter.model_name(),
            "Built backend adapter"
        );
        self.instances
            .insert(name.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    /// Every configured backend with readiness and its role in the default
    /// sequence, sorted by name.
    pub fn status(&self) -> Vec<BackendStatusEntry> {
        let fallback_ids: Vec<&str> = self
            .config
            .fallback_backends
            .iter()
            .map(|n| parse_backend_name(n).0)
            .collect();
        let default_id = parse_backend_name(&self.config.default_backend).0;

        self.config
            .backends
            .iter()
            .map(|(name, backend)| BackendStatusEntry {
                name: name.clone(),
                driver: backend.driver.clone(),
                model: backend.model.clone(),
                status: backend_status(&self.config, name),
                is_default: name == default_id,
                is_fallback: fallback_ids.contains(&name.as_str())
            })
            .collect()
    }
}
