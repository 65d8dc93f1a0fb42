//! Shared test fixtures for the orchestrator workspace.
//!
//! Provides a single, shared Redis testcontainer per test process, unique id
//! helpers, and a one-time tracing subscriber for test output. Fixtures return
//! `None` when Docker is unavailable so callers can skip.

mod fixtures;

pub use fixtures::*;
