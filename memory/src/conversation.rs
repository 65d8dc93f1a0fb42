use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use errors::StorageError;
use orch_core::{ChatTurn, ConversationStore, ConversationTurn, Role};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// In-process conversation store.
///
/// Each session is guarded by its own map shard entry; there is no lock
/// across sessions. Sequence numbers are drawn while the session entry is
/// held, so they increase strictly in append order within a session and
/// never collide across the store.
#[derive(Debug)]
pub struct InMemoryConversationStore {
    sessions: DashMap<String, VecDeque<ConversationTurn>>,
    next_sequence: AtomicU64,
    enabled: bool,
    max_turns: usize
}

impl Default for InMemoryConversationStore {
    fn default() -> Self {
        Self::from_config(&config::MemoryConfig::default())
    }
}

impl InMemoryConversationStore {
    /// `max_turns = 0` keeps every turn.
    pub fn new(max_turns: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            next_sequence: AtomicU64::new(1),
            enabled: true,
            max_turns
        }
    }

    pub fn from_config(config: &config::MemoryConfig) -> Self {
        Self::new(config.max_turns).with_enabled(config.enabled)
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn trim(&self, turns: &mut VecDeque<ConversationTurn>) -> usize {
        if self.max_turns == 0 {
            return 0;
        }
        let excess = turns.len().saturating_sub(self.max_turns);
        turns.drain(..excess);
        excess
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn history(&self, session: &str) -> Result<Vec<ChatTurn>, StorageError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        Ok(self
            .sessions
            .get(session)
            .map(|turns| turns.iter().map(ConversationTurn::as_chat_turn).collect())
            .unwrap_or_default())
    }

    async fn turns(&self, session: &str) -> Result<Vec<ConversationTurn>, StorageError> {
        if !self.enabled {
            return Ok(Vec::new());
        }
        Ok(self
            .sessions
            .get(session)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn append(
        &self,
        session: &str,
        role: Role,
        content: &str,
        metadata: Option<serde_json::Value>
    ) -> Result<Option<ConversationTurn>, StorageError> {
        if !self.enabled {
            return Ok(None);
        }

        let mut entry = self.sessions.entry(session.to_string()).or_default();
        let turn = ConversationTurn {
            session_key: session.to_string(),
            role,
            content: content.to_string(),
            metadata,
            sequence: self.next_sequence.fetch_add(1, Ordering::SeqCst),
            created_at: Utc::now()
        };
        entry.push_back(turn.clone());

        let evicted = self.trim(&mut entry);
        if evicted > 0 {
            debug!(session, evicted, "Trimmed conversation history");
        }

        Ok(Some(turn))
    }

    async fn forget_session(&self, session: &str) -> Result<usize, StorageError> {
        Ok(self
            .sessions
            .remove(session)
            .map(|(_, turns)| turns.len())
            .unwrap_or(0))
    }
}
