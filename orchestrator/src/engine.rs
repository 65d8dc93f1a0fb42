//! Orchestration Engine: attempt sequencing, caching, structured output,
//! memory and accounting.

use crate::outcome::{OrchestrationOutcome, StreamOutcome};
use crate::payload::{assemble, dispatch, original_input, stream_turns};
use crate::registry::{BackendRegistry, BackendStatusEntry};
use crate::session::MemorySession;
use crate::structured::{JsonObject, correction_prompt, extract_object, validate};
use chrono::Utc;
use config::OrchestratorConfig;
use errors::{
    BackendFailure, ConfigurationError, OrchestrationError, OrchestrationResult, StorageError,
    StructuredOutputError
};
use memory::InMemoryConversationStore;
use observability::{OrchestratorTelemetry, UsageQuery, UsageReport};
use orch_core::{
    AttemptRecord, AuditEntry, AuditSink, BackendAdapter, BackendResult, ChatTurn, ChunkSink,
    ConversationStore, ExpectedSchema, RequestDescription, RequestKind, RequestPayload, Role
};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};
use storage::{CacheStats, InMemoryAuditLog, ResultCache, TracingAuditSink};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest input or output text kept by the `tracing` audit driver.
const TRACING_AUDIT_FIELD_CHARS: usize = 2000;

/// Why one attempt did not produce a result.
enum AttemptFailure {
    /// Recorded, then the next backend is tried.
    Backend(String),
    /// Ends the call: the backend answered but not in the requested shape.
    Structured(StructuredOutputError)
}

struct AttemptSuccess {
    result: BackendResult,
    model: String,
    cost: f64,
    cached: bool,
    structured: Option<JsonObject>
}

struct Structured {
    data: JsonObject,
    repair_cost: Option<f64>,
    /// Raw text of the correction reply, when one was needed.
    repaired_text: Option<String>
}

/// Turns request descriptions into backend attempts.
///
/// Cache, conversation memory and audit sink are optional collaborators;
/// without them the matching request policies are ignored.
pub struct Orchestrator {
    registry: Arc<BackendRegistry>,
    cache: Option<ResultCache>,
    memory: Option<Arc<dyn ConversationStore>>,
    audit: Option<Arc<dyn AuditSink>>,
    audit_log: Option<Arc<InMemoryAuditLog>>,
    telemetry: OrchestratorTelemetry,
    default_cache_ttl: Duration
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.registry)
            .field("cache", &self.cache.is_some())
            .field("memory", &self.memory.is_some())
            .field("audit", &self.audit.is_some())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Engine with no cache, memory or audit sink.
    pub fn new(registry: BackendRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
            cache: None,
            memory: None,
            audit: None,
            audit_log: None,
            telemetry: OrchestratorTelemetry::new(),
            default_cache_ttl: Duration::from_secs(3600)
        }
    }

    /// Validate `config` and wire the built-in drivers and in-process stores.
    pub fn from_config(config: OrchestratorConfig) -> Result<Self, ConfigurationError> {
        config::validate(&config)?;
        Self::from_registry(BackendRegistry::new(config))
    }

    /// Wire cache, memory and audit policy from the registry's configuration.
    ///
    /// # M-CANONICAL-DOCS
    ///
    /// ## Behavior
    /// - `cache.enabled`: in-memory result cache
    /// - `memory.enabled`: in-memory conversation store with `max_turns`
    /// - `audit.enabled`: `memory` keeps rows for usage reports, `tracing`
    ///   logs them on the `ai_audit` target
    pub fn from_registry(registry: BackendRegistry) -> Result<Self, ConfigurationError> {
        let config = registry.config().clone();
        let mut orchestrator = Self::new(registry);
        orchestrator.default_cache_ttl = Duration::from_secs(config.cache.default_ttl_seconds);

        if config.cache.enabled {
            orchestrator = orchestrator.with_cache(ResultCache::in_memory());
        }
        if config.memory.enabled {
            orchestrator = orchestrator
                .with_memory(Arc::new(InMemoryConversationStore::from_config(&config.memory)));
        }
        if config.audit.enabled {
            orchestrator = match config.audit.driver.as_str() {
                "memory" => orchestrator.with_audit_log(Arc::new(InMemoryAuditLog::new())),
                "tracing" => orchestrator.with_audit(Arc::new(
                    TracingAuditSink::new().with_max_field_chars(TRACING_AUDIT_FIELD_CHARS)
                )),
                other => {
                    return Err(ConfigurationError::InvalidValue {
                        field: "audit.driver".to_string(),
                        reason: format!("unknown audit driver '{other}'")
                    });
                }
            };
        }
        Ok(orchestrator)
    }

    pub fn with_cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn ConversationStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_audit(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self.audit_log = None;
        self
    }

    /// Audit into an in-process log that also backs [`Self::usage`].
    pub fn with_audit_log(mut self, log: Arc<InMemoryAuditLog>) -> Self {
        self.audit = Some(Arc::clone(&log) as Arc<dyn AuditSink>);
        self.audit_log = Some(log);
        self
    }

    pub fn with_telemetry(mut self, telemetry: OrchestratorTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.registry
    }

    pub fn status(&self) -> Vec<BackendStatusEntry> {
        self.registry.status()
    }

    /// TTL configured as the cache default, for callers choosing one.
    pub fn default_cache_ttl(&self) -> Duration {
        self.default_cache_ttl
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, StorageError> {
        match &self.cache {
            Some(cache) => {
                let stats = cache.stats().await?;
                self.telemetry.record_cache_size(stats.registered_keys);
                Ok(stats)
            }
            None => Ok(CacheStats::default())
        }
    }

    /// Remove every cached result. Returns how many entries were removed.
    pub async fn flush_cache(&self) -> Result<usize, StorageError> {
        match &self.cache {
            Some(cache) => {
                let removed = cache.flush().await?;
                self.telemetry.record_cache_size(0);
                info!(removed, "Result cache flushed");
                Ok(removed)
            }
            None => Ok(0)
        }
    }

    pub fn audit_log(&self) -> Option<&Arc<InMemoryAuditLog>> {
        self.audit_log.as_ref()
    }

    /// Usage over the in-process audit log, when that is the audit driver.
    pub fn usage(&self, query: &UsageQuery) -> Option<UsageReport> {
        self.audit_log
            .as_ref()
            .map(|log| query.report(&log.entries()))
    }

    /// Request constructors bound to one conversation session.
    pub fn remember(&self, session: impl Into<String>) -> MemorySession {
        MemorySession::new(session, self.memory.clone())
    }

    /// Primary (or the default backend) followed by the request's fallbacks,
    /// or the configured ones when the request names none. Duplicates and
    /// blank names are dropped, keeping first occurrences.
    pub fn attempt_sequence(&self, request: &RequestDescription) -> Vec<String> {
        let primary = request
            .primary_backend()
            .unwrap_or(self.registry.default_backend());
        let fallbacks = if request.fallback_backends().is_empty() {
            self.registry.fallback_backends()
        } else {
            request.fallback_backends()
        };

        let mut sequence: Vec<String> = Vec::with_capacity(fallbacks.len() + 1);
        for name in std::iter::once(primary).chain(fallbacks.iter().map(String::as_str)) {
            let name = name.trim();
            if !name.is_empty() && !sequence.iter().any(|n| n == name) {
                sequence.push(name.to_string());
            }
        }
        sequence
    }

    pub async fn execute(
        &self,
        request: impl Into<RequestDescription>
    ) -> OrchestrationResult<OrchestrationOutcome> {
        self.execute_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// # M-CANONICAL-DOCS
    ///
    /// ## Purpose
    /// Run one request against its backend sequence until a backend succeeds.
    ///
    /// ## Behavior
    /// - Backends are tried strictly in order, each at most once
    /// - Resolution and backend errors are recorded and the next backend is tried
    /// - A structured-output failure ends the call without fallback
    /// - Cancelling `cancel` stops the sequence, abandoning any in-flight call
    /// - Audit, cache and memory write failures are logged, never returned
    pub async fn execute_with_cancel(
        &self,
        request: impl Into<RequestDescription>,
        cancel: &CancellationToken
    ) -> OrchestrationResult<OrchestrationOutcome> {
        let request = request.into();
        let sequence = self.attempt_sequence(&request);
        if sequence.is_empty() {
            return Err(OrchestrationError::NoBackendsAttempted);
        }

        let schema = self.schema_for(&request);
        let history = self.load_history(&request).await;
        let assembled = assemble(request.payload(), &history, schema);

        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(sequence.len());
        let mut failures: Vec<BackendFailure> = Vec::new();

        for (index, name) in sequence.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(OrchestrationError::Cancelled {
                    attempts: attempts.len()
                });
            }
            if index > 0 {
                let previous = &sequence[index - 1];
                self.telemetry.record_fallback(previous);
                warn!(from = %previous, to = %name, "Falling back to next backend");
            }
            debug!(backend = %name, attempt = index + 1, kind = %request.kind(), "Attempting backend");

            let started = Instant::now();
            let step = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!(backend = %name, attempt = index + 1, "Request cancelled");
                    return Err(OrchestrationError::Cancelled {
                        attempts: attempts.len() + 1
                    });
                }
                step = self.attempt(name, &request, &assembled, schema) => step,
            };
            let elapsed = started.elapsed();

            match step {
                Ok(success) => {
                    attempts.push(AttemptRecord::success(name, success.cached, elapsed));
                    self.telemetry
                        .record_attempt_success(name, elapsed, success.cached);
                    info!(
                        backend = %name,
                        model = %success.model,
                        attempt = index + 1,
                        cached = success.cached,
                        cost = success.cost,
                        "Request succeeded"
                    );
                    return Ok(OrchestrationOutcome {
                        result: success.result,
                        backend: name.clone(),
                        model: success.model,
                        attempts,
                        cost: success.cost,
                        cached: success.cached,
                        structured: success.structured
                    });
                }
                Err(AttemptFailure::Backend(message)) => {
                    warn!(backend = %name, attempt = index + 1, error = %message, "Backend attempt failed");
                    self.telemetry.record_attempt_failure(name, elapsed);
                    attempts.push(AttemptRecord::failure(name, message.clone(), elapsed));
                    failures.push(BackendFailure {
                        backend: name.clone(),
                        message
                    });
                }
                Err(AttemptFailure::Structured(source)) => {
                    error!(backend = %name, error = %source, "Structured output rejected");
                    return Err(OrchestrationError::StructuredOutput {
                        backend: name.clone(),
                        source
                    });
                }
            }
        }

        self.telemetry.record_exhausted(failures.len());
        let err = OrchestrationError::AllBackendsFailed { failures };
        error!(error = %err, "Backend sequence exhausted");
        Err(err)
    }

    /// Stream a prompt or chat answer into `sink`.
    ///
    /// Follows the same sequencing and failure aggregation as
    /// [`Self::execute`] but never reads or writes the cache. Chunks already
    /// delivered by a backend that then fails are not retracted.
    pub async fn stream(
        &self,
        request: impl Into<RequestDescription>,
        sink: &mut ChunkSink<'_>
    ) -> OrchestrationResult<StreamOutcome> {
        let request = request.into();
        if stream_turns(request.payload()).is_none() {
            return Err(OrchestrationError::InvalidRequest {
                reason: format!("{} requests cannot be streamed", request.kind())
            });
        }
        let sequence = self.attempt_sequence(&request);
        if sequence.is_empty() {
            return Err(OrchestrationError::NoBackendsAttempted);
        }
        if request.expected_schema().is_some() {
            debug!("Expected schema is not enforced on streamed requests");
        }

        let history = self.load_history(&request).await;
        let assembled = assemble(request.payload(), &history, None);
        let turns = stream_turns(&assembled).unwrap_or_default();

        let mut attempts = Vec::with_capacity(sequence.len());
        let mut failures = Vec::new();

        for (index, name) in sequence.iter().enumerate() {
            if index > 0 {
                let previous = &sequence[index - 1];
                self.telemetry.record_fallback(previous);
                warn!(from = %previous, to = %name, "Falling back to next backend");
            }
            let started = Instant::now();
            let streamed = match self.registry.resolve(name) {
                Ok(adapter) => {
                    let streamed = adapter
                        .stream_chat(&turns, &mut *sink, request.options())
                        .await;
                    streamed
                        .map(|result| (adapter, result))
                        .map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string())
            };
            let elapsed = started.elapsed();

            match streamed {
                Ok((adapter, result)) => {
                    let model = model_of(adapter.as_ref(), &result);
                    let cost = adapter.cost(request.kind(), &result.usage);
                    self.telemetry
                        .record_usage(name, result.usage.total_tokens, cost);
                    self.write_audit(audit_entry(
                        &request,
                        name,
                        &model,
                        original_input(&assembled),
                        &result,
                        cost,
                        false,
                        elapsed
                    ))
                    .await;
                    self.remember_exchange(&request, name, &model, result.text())
                        .await;

                    attempts.push(AttemptRecord::success(name, false, elapsed));
                    self.telemetry.record_attempt_success(name, elapsed, false);
                    info!(backend = %name, model = %model, attempt = index + 1, "Stream completed");
                    return Ok(StreamOutcome {
                        result,
                        backend: name.clone(),
                        model,
                        attempts,
                        cost
                    });
                }
                Err(message) => {
                    warn!(backend = %name, attempt = index + 1, error = %message, "Stream attempt failed");
                    self.telemetry.record_attempt_failure(name, elapsed);
                    attempts.push(AttemptRecord::failure(name, message.clone(), elapsed));
                    failures.push(BackendFailure {
                        backend: name.clone(),
                        message
                    });
                }
            }
        }

        self.telemetry.record_exhausted(failures.len());
        let err = OrchestrationError::AllBackendsFailed { failures };
        error!(error = %err, "Backend sequence exhausted");
        Err(err)
    }

    fn schema_for<'r>(&self, request: &'r RequestDescription) -> Option<&'r ExpectedSchema> {
        let schema = request.expected_schema().filter(|s| !s.is_empty())?;
        if request.kind().supports_schema() {
            Some(schema)
        } else {
            debug!(kind = %request.kind(), "Expected schema ignored for this request kind");
            None
        }
    }

    fn cache_key(&self, name: &str, request: &RequestDescription) -> Option<(String, Duration)> {
        let ttl = request.cache_ttl()?;
        self.cache.as_ref()?;
        match ResultCache::fingerprint(name, request.payload(), request.options()) {
            Ok(key) => Some((key, ttl)),
            Err(e) => {
                warn!(backend = name, error = %e, "Cannot fingerprint request, skipping cache");
                None
            }
        }
    }

    async fn attempt(
        &self,
        name: &str,
        request: &RequestDescription,
        assembled: &RequestPayload,
        schema: Option<&ExpectedSchema>
    ) -> Result<AttemptSuccess, AttemptFailure> {
        let adapter = self
            .registry
            .resolve(name)
            .map_err(|e| AttemptFailure::Backend(e.to_string()))?;
        let cache_key = self.cache_key(name, request);

        if let (Some(cache), Some((key, _))) = (&self.cache, &cache_key) {
            let started = Instant::now();
            if let Some(result) = cache.fetch(key).await {
                self.telemetry.record_cache_hit(name);
                debug!(backend = name, cache_key = %key, "Serving cached result");
                let model = model_of(adapter.as_ref(), &result);
                self.write_audit(audit_entry(
                    request,
                    name,
                    &model,
                    original_input(assembled),
                    &result,
                    0.0,
                    true,
                    started.elapsed()
                ))
                .await;

                let structured = match schema {
                    Some(schema) => Some(
                        self.structure(adapter.as_ref(), name, request, &result, schema)
                            .await?
                    ),
                    None => None
                };
                let repair_cost = structured.as_ref().and_then(|s| s.repair_cost);
                return Ok(AttemptSuccess {
                    result,
                    model,
                    cost: repair_cost.unwrap_or(0.0),
                    cached: true,
                    structured: structured.map(|s| s.data)
                });
            }
        }

        let started = Instant::now();
        let result = dispatch(adapter.as_ref(), assembled, request.options())
            .await
            .map_err(|e| AttemptFailure::Backend(e.to_string()))?;
        let elapsed = started.elapsed();

        let model = model_of(adapter.as_ref(), &result);
        let cost = adapter.cost(request.kind(), &result.usage);
        self.telemetry
            .record_usage(name, result.usage.total_tokens, cost);
        self.write_audit(audit_entry(
            request,
            name,
            &model,
            original_input(assembled),
            &result,
            cost,
            false,
            elapsed
        ))
        .await;

        let structured = match schema {
            Some(schema) => Some(
                self.structure(adapter.as_ref(), name, request, &result, schema)
                    .await?
            ),
            None => None
        };
        let repair_cost = structured.as_ref().and_then(|s| s.repair_cost);

        // Only results that parse on their own are worth replaying.
        if let (Some(cache), Some((key, ttl)), None) = (&self.cache, &cache_key, repair_cost) {
            match cache.store(key, &result, *ttl).await {
                Ok(()) => self.telemetry.record_cache_store(name),
                Err(e) => {
                    warn!(backend = name, cache_key = %key, error = %e, "Failed to cache result");
                    self.telemetry.record_side_effect_failure("cache");
                }
            }
        }
        // A repaired answer is what the caller got back, so it is the one kept.
        let answer = structured
            .as_ref()
            .and_then(|s| s.repaired_text.as_deref())
            .or(result.text());
        self.remember_exchange(request, name, &model, answer)
            .await;

        Ok(AttemptSuccess {
            result,
            model,
            cost: cost + repair_cost.unwrap_or(0.0),
            cached: false,
            structured: structured.map(|s| s.data)
        })
    }

    /// Extract and validate, with one `complete` repair when nothing parses.
    async fn structure(
        &self,
        adapter: &dyn BackendAdapter,
        name: &str,
        request: &RequestDescription,
        result: &BackendResult,
        schema: &ExpectedSchema
    ) -> Result<Structured, AttemptFailure> {
        let (data, repair_cost, repaired_text) = match extract_object(result.text().unwrap_or_default()) {
            Some(data) => (data, None, None),
            None => {
                self.telemetry.record_structured_repair(name);
                warn!(backend = name, "Response is not JSON, requesting a correction");
                let prompt = correction_prompt(schema, &original_input(request.payload()));

                let started = Instant::now();
                let repaired = match adapter.complete(&prompt, request.options()).await {
                    Ok(repaired) => repaired,
                    Err(e) => {
                        warn!(backend = name, error = %e, "Correction request failed");
                        return Err(self.unobtainable(name));
                    }
                };
                let model = model_of(adapter, &repaired);
                let cost = adapter.cost(RequestKind::TextCompletion, &repaired.usage);
                self.telemetry
                    .record_usage(name, repaired.usage.total_tokens, cost);
                self.write_audit(audit_entry(
                    request,
                    name,
                    &model,
                    prompt,
                    &repaired,
                    cost,
                    false,
                    started.elapsed()
                ))
                .await;

                let text = repaired.text().unwrap_or_default();
                match extract_object(text) {
                    Some(data) => (data, Some(cost), Some(text.to_string())),
                    None => return Err(self.unobtainable(name))
                }
            }
        };

        if let Err(e) = validate(&data, schema) {
            let reason = match &e {
                StructuredOutputError::MissingField { .. } => "missing_field",
                StructuredOutputError::TypeMismatch { .. } => "type_mismatch",
                StructuredOutputError::Unobtainable { .. } => "unobtainable"
            };
            self.telemetry.record_structured_failure(name, reason);
            return Err(AttemptFailure::Structured(e));
        }
        Ok(Structured {
            data,
            repair_cost,
            repaired_text
        })
    }

    fn unobtainable(&self, name: &str) -> AttemptFailure {
        self.telemetry
            .record_structured_failure(name, "unobtainable");
        AttemptFailure::Structured(StructuredOutputError::Unobtainable {
            backend: name.to_string()
        })
    }

    async fn load_history(&self, request: &RequestDescription) -> Vec<ChatTurn> {
        let (Some(store), Some(session)) = (&self.memory, request.memory_session()) else {
            return Vec::new();
        };
        if !request.kind().feeds_memory() {
            return Vec::new();
        }
        match store.history(session).await {
            Ok(history) => {
                debug!(session, turns = history.len(), "Loaded conversation history");
                history
            }
            Err(e) => {
                warn!(session, error = %e, "Failed to load conversation history");
                self.telemetry.record_side_effect_failure("memory");
                Vec::new()
            }
        }
    }

    /// Append the caller's latest content and the answer to the session.
    async fn remember_exchange(
        &self,
        request: &RequestDescription,
        backend: &str,
        model: &str,
        answer: Option<&str>
    ) {
        let (Some(store), Some(session)) = (&self.memory, request.memory_session()) else {
            return;
        };
        if !request.kind().feeds_memory() {
            return;
        }
        let metadata = json!({ "backend": backend, "model": model });

        let turns = [
            (Role::User, request.payload().latest_user_content()),
            (Role::Assistant, answer)
        ];
        for (role, content) in turns {
            let Some(content) = content else {
                continue;
            };
            if let Err(e) = store
                .append(session, role, content, Some(metadata.clone()))
                .await
            {
                warn!(session, role = %role, error = %e, "Failed to append conversation turn");
                self.telemetry.record_side_effect_failure("memory");
            }
        }
    }

    async fn write_audit(&self, entry: AuditEntry) {
        let Some(sink) = &self.audit else {
            return;
        };
        let backend = entry.backend.clone();
        if let Err(e) = sink.record(entry).await {
            warn!(backend = %backend, error = %e, "Failed to write audit row");
            self.telemetry.record_side_effect_failure("audit");
        }
    }
}

fn model_of(adapter: &dyn BackendAdapter, result: &BackendResult) -> String {
    result
        .model
        .clone()
        .unwrap_or_else(|| adapter.model_name().to_string())
}

fn audit_entry(
    request: &RequestDescription,
    backend: &str,
    model: &str,
    input: String,
    result: &BackendResult,
    cost: f64,
    cached: bool,
    duration: Duration
) -> AuditEntry {
    AuditEntry {
        timestamp: Utc::now(),
        user_id: request.user_id().map(str::to_string),
        backend: backend.to_string(),
        model: model.to_string(),
        kind: request.kind(),
        input,
        output: result.summary(),
        total_tokens: if cached { 0 } else { result.usage.total_tokens },
        cost,
        cached,
        duration_ms: duration.as_millis() as u64
    }
}
