use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Metrics emitted by the orchestration engine.
///
/// Injected into the engine rather than called through free functions, so
/// embedders can disable or replace it. Metric names are stable.
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorTelemetry {
    enabled: bool
}

impl Default for OrchestratorTelemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorTelemetry {
    pub fn new() -> Self {
        Self { enabled: true }
    }

    /// Telemetry that records nothing.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn record_attempt_success(&self, backend: &str, duration: Duration, cached: bool) {
        if !self.enabled {
            return;
        }
        let labels = [
            ("backend", backend.to_string()),
            ("status", "success".to_string()),
            ("cached", cached.to_string())
        ];
        counter!("ai_attempts_total", &labels).increment(1);
        histogram!("ai_request_duration_seconds", "backend" => backend.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_attempt_failure(&self, backend: &str, duration: Duration) {
        if !self.enabled {
            return;
        }
        let labels = [
            ("backend", backend.to_string()),
            ("status", "failure".to_string()),
            ("cached", "false".to_string())
        ];
        counter!("ai_attempts_total", &labels).increment(1);
        histogram!("ai_request_duration_seconds", "backend" => backend.to_string())
            .record(duration.as_secs_f64());
    }

    /// The engine moved past `from` to the next backend in the sequence.
    pub fn record_fallback(&self, from: &str) {
        if !self.enabled {
            return;
        }
        counter!("ai_fallbacks_total", "from" => from.to_string()).increment(1);
    }

    pub fn record_exhausted(&self, attempts: usize) {
        if !self.enabled {
            return;
        }
        counter!("ai_exhausted_total").increment(1);
        histogram!("ai_exhausted_attempts").record(attempts as f64);
    }

    pub fn record_cache_hit(&self, backend: &str) {
        if !self.enabled {
            return;
        }
        counter!("ai_cache_hits_total", "backend" => backend.to_string()).increment(1);
    }

    pub fn record_cache_store(&self, backend: &str) {
        if !self.enabled {
            return;
        }
        counter!("ai_cache_stores_total", "backend" => backend.to_string()).increment(1);
    }

    pub fn record_cache_size(&self, registered_keys: usize) {
        if !self.enabled {
            return;
        }
        gauge!("ai_cache_registered_keys").set(registered_keys as f64);
    }

    pub fn record_usage(&self, backend: &str, total_tokens: u64, cost: f64) {
        if !self.enabled {
            return;
        }
        counter!("ai_tokens_total", "backend" => backend.to_string()).increment(total_tokens);
        histogram!("ai_request_cost_usd", "backend" => backend.to_string()).record(cost);
    }

    pub fn record_structured_repair(&self, backend: &str) {
        if !self.enabled {
            return;
        }
        counter!("ai_structured_output_repairs_total", "backend" => backend.to_string())
            .increment(1);
    }

    pub fn record_structured_failure(&self, backend: &str, reason: &str) {
        if !self.enabled {
            return;
        }
        let labels = [
            ("backend", backend.to_string()),
            ("reason", reason.to_string())
        ];
        counter!("ai_structured_output_failures_total", &labels).increment(1);
    }

    pub fn record_side_effect_failure(&self, effect: &str) {
        if !self.enabled {
            return;
        }
        counter!("ai_side_effect_failures_total", "effect" => effect.to_string()).increment(1);
    }
}
