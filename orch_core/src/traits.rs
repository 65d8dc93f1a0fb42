use crate::pricing::PriceTable;
use crate::types::{
    AuditEntry, BackendConfig, BackendResult, CacheCounter, ChatTurn, ConversationTurn,
    EmbeddingInput, RequestKind, RequestOptions, Role, TokenUsage,
};
use async_trait::async_trait;
use errors::{BackendError, ConfigurationError, StorageError};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Receives streamed chunks in arrival order.
pub type ChunkSink<'a> = dyn FnMut(&str) + Send + 'a;

/// One vendor backend behind the common capability contract.
///
/// Only `complete` and `chat` are mandatory. The other operations default to
/// an explicit [`BackendError::Unsupported`] so the engine can record the
/// attempt and move on to the next backend.
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    /// Symbolic name this instance was registered under.
    fn backend_name(&self) -> &str;

    /// Model in effect for calls on this instance.
    fn model_name(&self) -> &str;

    fn price_table(&self) -> &PriceTable;

    /// Cost in USD of one successful call.
    fn cost(&self, kind: RequestKind, usage: &TokenUsage) -> f64 {
        self.price_table().cost(self.model_name(), kind, usage)
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &RequestOptions,
    ) -> Result<BackendResult, BackendError>;

    async fn chat(
        &self,
        turns: &[ChatTurn],
        options: &RequestOptions,
    ) -> Result<BackendResult, BackendError>;

    /// Stream a chat answer into `sink`, returning the accumulated result.
    ///
    /// Backends without native streaming deliver the whole answer as a single
    /// chunk.
    async fn stream_chat(
        &self,
        turns: &[ChatTurn],
        sink: &mut ChunkSink<'_>,
        options: &RequestOptions,
    ) -> Result<BackendResult, BackendError> {
        let result = self.chat(turns, options).await?;
        if let Some(text) = result.text() {
            sink(text);
        }
        Ok(result)
    }

    async fn generate_image(
        &self,
        _prompt: &str,
        _options: &RequestOptions,
    ) -> Result<BackendResult, BackendError> {
        Err(BackendError::unsupported(self.backend_name(), "image generation"))
    }

    async fn embed_text(
        &self,
        _input: &EmbeddingInput,
        _options: &RequestOptions,
    ) -> Result<BackendResult, BackendError> {
        Err(BackendError::unsupported(self.backend_name(), "embeddings"))
    }

    async fn transcribe_audio(
        &self,
        _audio_path: &Path,
        _options: &RequestOptions,
    ) -> Result<BackendResult, BackendError> {
        Err(BackendError::unsupported(self.backend_name(), "audio transcription"))
    }

    async fn text_to_speech(
        &self,
        _text: &str,
        _options: &RequestOptions,
    ) -> Result<BackendResult, BackendError> {
        Err(BackendError::unsupported(self.backend_name(), "text to speech"))
    }
}

/// Builds adapters for one driver from configuration.
pub trait BackendFactory: Send + Sync {
    fn driver(&self) -> &str;

    /// `model_override` replaces `config.model` for the returned instance only.
    fn build(
        &self,
        name: &str,
        config: &BackendConfig,
        model_override: Option<&str>,
    ) -> Result<Arc<dyn BackendAdapter>, ConfigurationError>;
}

/// Key/value storage behind the result cache.
///
/// Besides plain entries, a store keeps the registry of issued keys and the
/// hit/store counters so flushing never needs a key scan.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> Result<(), StorageError>;

    /// Returns whether an entry was removed.
    async fn forget(&self, key: &str) -> Result<bool, StorageError>;

    async fn register_key(&self, key: &str) -> Result<(), StorageError>;

    async fn registered_keys(&self) -> Result<Vec<String>, StorageError>;

    async fn clear_registry(&self) -> Result<(), StorageError>;

    /// Atomically increments and returns the new value.
    async fn increment_counter(&self, counter: CacheCounter) -> Result<u64, StorageError>;

    async fn counter(&self, counter: CacheCounter) -> Result<u64, StorageError>;

    async fn reset_counters(&self) -> Result<(), StorageError>;
}

/// Ordered per-session conversation history.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Oldest-first turns of a session; empty when unseen or disabled.
    async fn history(&self, session: &str) -> Result<Vec<ChatTurn>, StorageError>;

    /// Stored rows, including sequence numbers.
    async fn turns(&self, session: &str) -> Result<Vec<ConversationTurn>, StorageError>;

    /// Append one turn and apply the retention window.
    async fn append(
        &self,
        session: &str,
        role: Role,
        content: &str,
        metadata: Option<serde_json::Value>,
    ) -> Result<Option<ConversationTurn>, StorageError>;

    async fn forget_session(&self, session: &str) -> Result<usize, StorageError>;
}

/// Write-only destination for audit rows.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), StorageError>;
}
