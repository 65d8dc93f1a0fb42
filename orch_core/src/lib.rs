//! # Orchestrator Core
//!
//! Shared data model and capability traits for the request orchestration
//! system.
//!
//! This crate provides:
//! - Request descriptions and their fluent builder
//! - Backend results, attempt records, conversation turns, audit rows
//! - The backend adapter contract and the cache, conversation and audit store
//!   traits the engine is wired against
//! - Per-model price tables
//!
//! # Best Practices
//!
//! - Request kinds are a tagged union matched once at dispatch
//! - Unsupported backend operations return an explicit error, never a generic one
//! - Comprehensive error handling with `thiserror` (see the `errors` crate)

pub mod pricing;
pub mod request;
pub mod traits;
pub mod types;

pub use pricing::{ModelPrice, PriceTable};
pub use request::{RequestBuilder, RequestDescription};
pub use traits::{
    AuditSink, BackendAdapter, BackendFactory, CacheStore, ChunkSink, ConversationStore
};
pub use types::{
    AttemptOutcome, AttemptRecord, AuditEntry, BackendConfig, BackendOutput, BackendResult,
    CacheCounter, ChatTurn, ConversationTurn, EmbeddingInput, ExpectedSchema, FieldConstraint,
    FieldType, GeneratedImage, RequestKind, RequestOptions, RequestPayload, Role, SpeechOutput,
    TokenUsage, CACHE_KEY_REGISTRY
};
