//! # Storage
//!
//! Shared stores used by the orchestration engine.
//!
//! This crate provides:
//! - The [`ResultCache`] service: fingerprinting, key registry, hit/store
//!   counters and bulk flush over any [`CacheStore`](orch_core::CacheStore)
//! - Cache stores kept in process memory or in Redis
//! - Audit sinks kept in process memory or written to `tracing`

pub mod audit;
pub mod cache;
pub mod redis;

pub use audit::{InMemoryAuditLog, TracingAuditSink};
pub use cache::{CacheStats, InMemoryCacheStore, ResultCache};
pub use self::redis::RedisCacheStore;
