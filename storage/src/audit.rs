use async_trait::async_trait;
use errors::StorageError;
use orch_core::{AuditEntry, AuditSink};
use parking_lot::RwLock;
use tracing::info;

/// Audit log kept in process memory, queryable for usage reports.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every row, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn record(&self, entry: AuditEntry) -> Result<(), StorageError> {
        self.entries.write().push(entry);
        Ok(())
    }
}

/// Writes audit rows as structured `tracing` events on the `ai_audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink {
    max_field_chars: Option<usize>
}

impl TracingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shorten logged input and output to `max_chars` characters.
    pub fn with_max_field_chars(mut self, max_chars: usize) -> Self {
        self.max_field_chars = Some(max_chars);
        self
    }

    fn shorten(&self, text: &str) -> String {
        match self.max_field_chars {
            Some(max) => utils::truncate_for_log(text, max),
            None => text.to_string()
        }
    }
}

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), StorageError> {
        info!(
            target: "ai_audit",
            timestamp = %entry.timestamp.to_rfc3339(),
            user_id = entry.user_id.as_deref().unwrap_or("-"),
            backend = %entry.backend,
            model = %entry.model,
            kind = %entry.kind,
            input = %self.shorten(&entry.input),
            output = %self.shorten(&entry.output),
            total_tokens = entry.total_tokens,
            cost = entry.cost,
            cached = entry.cached,
            duration_ms = entry.duration_ms,
            "AI request"
        );
        Ok(())
    }
}
