//! # Conversation Memory
//!
//! Per-session conversation history used to give backends context from
//! earlier calls.
//!
//! This crate provides:
//! - An in-process [`ConversationStore`](orch_core::ConversationStore) with
//!   oldest-first trimming
//! - Rendering of history into chat payloads and single-prompt preambles
//!
//! # Best Practices
//!
//! - Sequence numbers are assigned by the store at append time, never by callers
//! - Locking is scoped to one session; unrelated sessions never contend

pub mod context;
pub mod conversation;

pub use context::{chat_with_history, prompt_with_history, render_transcript};
pub use conversation::InMemoryConversationStore;
