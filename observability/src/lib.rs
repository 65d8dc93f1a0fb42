//! # Observability
//!
//! Metrics and usage reporting for the request orchestration system:
//! - `metrics` counters and histograms for attempts, fallbacks, cache
//!   activity, tokens, cost and structured-output repairs
//! - Usage reports over audit rows, by user, backend and time window

pub mod telemetry;
pub mod usage;

pub use telemetry::OrchestratorTelemetry;
pub use usage::{BackendUsage, TimeWindow, UsageQuery, UsageReport};
