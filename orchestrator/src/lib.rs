//! # Orchestrator
//!
//! The request orchestration engine: turns a declarative request description
//! into an ordered sequence of backend attempts.
//!
//! This crate provides:
//! - [`BackendRegistry`]: `name[:model]` resolution against configuration and
//!   driver factories
//! - [`Orchestrator`]: attempt sequencing with caching, structured output
//!   repair, conversation memory, audit rows and failure aggregation
//! - Streaming with the same sequencing rules
//!
//! # Best Practices
//!
//! - Fallbacks are strictly sequential; one backend is never tried twice in a call
//! - Configuration errors are recorded as failed attempts, not retried
//! - Side-effect failures (audit, cache, memory) never mask a successful result
//! - A structured-output failure never falls back: the backend did answer
//!
//! # Example
//!
//! ```no_run
//! use orchestrator::{Orchestrator, RequestDescription};
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = Orchestrator::from_config(config::load_from_env()?)?;
//! let outcome = orchestrator
//!     .execute(
//!         RequestDescription::prompt("Summarize the Rust ownership model")
//!             .using("openai")
//!             .fallback("anthropic")
//!             .cache(Duration::from_secs(600))
//!     )
//!     .await?;
//! println!("{}", outcome.text().unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod outcome;
pub mod payload;
pub mod registry;
pub mod session;
pub mod structured;

pub use engine::Orchestrator;
pub use orch_core::{ExpectedSchema, RequestBuilder, RequestDescription};
pub use outcome::{OrchestrationOutcome, StreamOutcome};
pub use registry::{BackendRegistry, BackendStatusEntry, parse_backend_name};
pub use session::MemorySession;
pub use structured::{extract_object, validate as validate_structured};
pub use tokio_util::sync::CancellationToken;
