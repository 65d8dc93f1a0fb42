#![allow(dead_code)]

use adapters::{ScriptedBackend, ScriptedFactory};
use config::OrchestratorConfig;
use orch_core::BackendConfig;
use orchestrator::{BackendRegistry, Orchestrator};
use std::sync::Arc;

/// Configuration with one `scripted` backend per name; the first is the default.
pub fn config(names: &[&str]) -> OrchestratorConfig {
    let config = names.iter().fold(OrchestratorConfig::empty(), |config, name| {
        config.with_backend(*name, BackendConfig::new("scripted", "scripted-model"))
    });
    config.with_default_backend(names.first().copied().unwrap_or_default())
}

pub fn build(config: OrchestratorConfig, backends: &[ScriptedBackend]) -> Orchestrator {
    let factory = backends
        .iter()
        .fold(ScriptedFactory::new(), |factory, backend| factory.with_backend(backend.clone()));
    let registry = BackendRegistry::new(config).with_factory(Arc::new(factory));
    Orchestrator::from_registry(registry).unwrap()
}

/// Engine over scripted backends replying `"ok"`, with cache, memory and an
/// in-process audit log.
pub fn harness(names: &[&str]) -> (Orchestrator, Vec<ScriptedBackend>) {
    testing::init_tracing();
    let backends: Vec<ScriptedBackend> = names.iter().map(|n| ScriptedBackend::new(*n)).collect();
    (build(config(names), &backends), backends)
}
