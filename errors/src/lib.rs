//! # Orchestrator Errors
//!
//! Error taxonomy for the request orchestration system.
//!
//! - Uses `thiserror` for structured error definitions
//! - Named fields in every message so log lines stay greppable
//! - Classification helpers (`is_retryable`, `is_unsupported`) for callers
//!   deciding whether to surface or swallow a failure

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported by a single backend adapter call.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{operation} is unsupported by this backend ({backend})")]
    Unsupported { backend: String, operation: String },

    #[error("Request to {backend} failed: {reason}")]
    Transport { backend: String, reason: String },

    #[error("{backend} returned HTTP {status}: {body}")]
    Status {
        backend: String,
        status: u16,
        body: String
    },

    #[error("{backend} did not answer within {timeout_ms}ms")]
    Timeout { backend: String, timeout_ms: u64 },

    #[error("Invalid response from {backend}: {reason}")]
    InvalidResponse { backend: String, reason: String },

    #[error("{message}")]
    Other { message: String }
}

impl BackendError {
    pub fn unsupported(backend: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            backend: backend.into(),
            operation: operation.into()
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into()
        }
    }

    /// Whether a caller could reasonably try the same backend again later.
    ///
    /// The orchestration engine never retries the same backend within one
    /// call; this is informational for logs and callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            BackendError::Transport { .. } | BackendError::Timeout { .. } => true,
            BackendError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, BackendError::Unsupported { .. })
    }
}

/// Configuration problems detected while resolving a backend name.
///
/// These are never retried: the same name fails the same way every time.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Backend '{name}' is not configured")]
    NotConfigured { name: String },

    #[error("Driver '{driver}' is not supported")]
    UnsupportedDriver { driver: String },

    #[error("Backend '{name}' is missing {field}")]
    MissingField { name: String, field: String },

    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue { field: String, reason: String }
}

/// Failures from the cache, audit log, and conversation stores.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection to {backend} failed: {reason}")]
    ConnectionError { backend: String, reason: String },

    #[error("Query on {backend} failed: {reason}")]
    QueryError { backend: String, reason: String },

    #[error("Serialization error: {error_type} - {reason}")]
    SerializationError { error_type: String, reason: String }
}

/// Failures turning a successful backend response into a schema-shaped value.
///
/// Never triggers fallback to another backend: the network call succeeded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StructuredOutputError {
    #[error("Could not obtain structured output from {backend}")]
    Unobtainable { backend: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Field '{field}' must be {expected}, got {actual}")]
    TypeMismatch {
        field: String,
        expected: String,
        actual: String
    }
}

/// One failed backend in an exhausted attempt sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendFailure {
    pub backend: String,
    pub message: String
}

fn render_failures(failures: &[BackendFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{}: {}", f.backend, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors surfaced to callers of the orchestration engine.
#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error("All backends failed: {}", render_failures(.failures))]
    AllBackendsFailed { failures: Vec<BackendFailure> },

    #[error("No backends attempted")]
    NoBackendsAttempted,

    #[error("Structured output from {backend} rejected: {source}")]
    StructuredOutput {
        backend: String,
        #[source]
        source: StructuredOutputError
    },

    #[error("Request cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: usize },

    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String }
}

impl OrchestrationError {
    pub fn failures(&self) -> &[BackendFailure] {
        match self {
            OrchestrationError::AllBackendsFailed { failures } => failures,
            _ => &[]
        }
    }

    pub fn is_structured_output(&self) -> bool {
        matches!(self, OrchestrationError::StructuredOutput { .. })
    }
}

pub type OrchestrationResult<T> = Result<T, OrchestrationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregated_message_keeps_attempt_order() {
        let err = OrchestrationError::AllBackendsFailed {
            failures: vec![
                BackendFailure {
                    backend: "A".to_string(),
                    message: "unauthorized".to_string()
                },
                BackendFailure {
                    backend: "B".to_string(),
                    message: "rate limited".to_string()
                },
            ]
        };

        let message = err.to_string();
        let a = message.find("A: unauthorized").unwrap();
        let b = message.find("B: rate limited").unwrap();
        assert!(a < b);
        assert_eq!(err.failures().len(), 2);
    }

    #[test]
    fn test_retryable_classification() {
        let rate_limited = BackendError::Status {
            backend: "openai".to_string(),
            status: 429,
            body: String::new()
        };
        let bad_request = BackendError::Status {
            backend: "openai".to_string(),
            status: 400,
            body: String::new()
        };

        assert!(rate_limited.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(!BackendError::unsupported("anthropic", "image generation").is_retryable());
    }

    #[test]
    fn test_unsupported_message_is_explicit() {
        let err = BackendError::unsupported("anthropic", "image generation");
        assert_eq!(
            err.to_string(),
            "image generation is unsupported by this backend (anthropic)"
        );
        assert!(err.is_unsupported());
    }

    #[test]
    fn test_type_mismatch_names_field_and_types() {
        let err = StructuredOutputError::TypeMismatch {
            field: "name".to_string(),
            expected: "string".to_string(),
            actual: "integer".to_string()
        };
        assert_eq!(err.to_string(), "Field 'name' must be string, got integer");
    }
}
