use errors::StorageError;
use orch_core::{ChatTurn, ConversationStore, RequestBuilder, RequestDescription};
use std::sync::Arc;

/// Requests bound to one conversation session.
#[derive(Clone)]
pub struct MemorySession {
    key: String,
    store: Option<Arc<dyn ConversationStore>>
}

impl std::fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemorySession")
            .field("key", &self.key)
            .field("enabled", &self.store.is_some())
            .finish()
    }
}

impl MemorySession {
    pub(crate) fn new(key: impl Into<String>, store: Option<Arc<dyn ConversationStore>>) -> Self {
        Self {
            key: key.into(),
            store
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn prompt(&self, prompt: impl Into<String>) -> RequestBuilder {
        RequestDescription::prompt(prompt).with_memory(self.key.clone())
    }

    pub fn chat(&self, turns: Vec<ChatTurn>) -> RequestBuilder {
        RequestDescription::chat(turns).with_memory(self.key.clone())
    }

    /// Oldest first; empty when memory is disabled.
    pub async fn history(&self) -> Result<Vec<ChatTurn>, StorageError> {
        match &self.store {
            Some(store) => store.history(&self.key).await,
            None => Ok(Vec::new())
        }
    }

    /// Drop every stored turn of this session.
    pub async fn forget(&self) -> Result<usize, StorageError> {
        match &self.store {
            Some(store) => store.forget_session(&self.key).await,
            None => Ok(0)
        }
    }
}
