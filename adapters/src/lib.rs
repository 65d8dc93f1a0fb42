//! # Backend Adapters
//!
//! Vendor backends behind the [`orch_core::BackendAdapter`] contract, and the
//! driver factories that build them from configuration.
//!
//! - `openai`: chat, streaming, images, embeddings, transcription and speech
//! - `anthropic`: chat and streaming
//! - `ollama`: chat, streaming and embeddings against a local server
//! - `mock`: scripted backend for tests and offline wiring
//!
//! # Best Practices
//!
//! - Vendor errors keep the vendor's message so failure aggregates stay useful
//! - Every client carries a bounded timeout taken from configuration
//! - Operations a vendor cannot perform report `Unsupported` instead of
//!   approximating

mod http;

pub mod anthropic;
pub mod factory;
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod pricing;

pub use anthropic::AnthropicBackend;
pub use factory::{AnthropicFactory, OllamaFactory, OpenAiFactory, builtin_factories};
pub use mock::{RecordedCall, ScriptedBackend, ScriptedFactory, ScriptedOutcome};
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
