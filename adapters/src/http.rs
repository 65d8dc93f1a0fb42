//! HTTP plumbing shared by the built-in backends.

use errors::BackendError;
use orch_core::RequestOptions;
use serde_json::Value;
use std::time::Duration;

/// Option keys consumed by the orchestrator or an adapter itself and never
/// forwarded to a vendor API.
const RESERVED_OPTIONS: &[&str] = &["model", "output_path", "voice", "size", "n", "language"];

pub(crate) fn build_client(backend: &str, timeout: Duration) -> Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| format!("failed to build HTTP client for {backend}: {e}"))
}

/// Translate a transport failure into the backend error taxonomy.
pub(crate) fn transport_error(backend: &str, timeout: Duration, e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout {
            backend: backend.to_string(),
            timeout_ms: timeout.as_millis() as u64
        }
    } else {
        BackendError::Transport {
            backend: backend.to_string(),
            reason: e.to_string()
        }
    }
}

/// Fail on non-2xx statuses, keeping the vendor's error message.
pub(crate) async fn check_status(
    backend: &str,
    timeout: Duration,
    response: reqwest::Response
) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(backend, timeout, e))?;
    Err(BackendError::Status {
        backend: backend.to_string(),
        status: status.as_u16(),
        body: error_message(&body)
    })
}

pub(crate) async fn read_json(
    backend: &str,
    timeout: Duration,
    response: reqwest::Response
) -> Result<Value, BackendError> {
    let response = check_status(backend, timeout, response).await?;
    response
        .json::<Value>()
        .await
        .map_err(|e| invalid_response(backend, e.to_string()))
}

pub(crate) fn invalid_response(backend: &str, reason: impl Into<String>) -> BackendError {
    BackendError::InvalidResponse {
        backend: backend.to_string(),
        reason: reason.into()
    }
}

/// `error.message`, `error` or `message` from a JSON error body, else the
/// raw body shortened.
pub(crate) fn error_message(body: &str) -> String {
    if let Ok(json) = serde_json::from_str::<Value>(body) {
        let candidates = [
            json.pointer("/error/message"),
            json.get("error"),
            json.get("message")
        ];
        for candidate in candidates.into_iter().flatten() {
            if let Some(text) = candidate.as_str() {
                return text.to_string();
            }
        }
    }
    utils::truncate_for_log(body.trim(), 500)
}

/// Copy caller options into a request body, skipping reserved keys.
pub(crate) fn merge_options(body: &mut Value, options: &RequestOptions) {
    if let Value::Object(map) = body {
        for (key, value) in options {
            if !RESERVED_OPTIONS.contains(&key.as_str()) {
                map.insert(key.clone(), value.clone());
            }
        }
    }
}

pub(crate) fn option_str<'a>(options: &'a RequestOptions, key: &str) -> Option<&'a str> {
    options.get(key).and_then(Value::as_str)
}

pub(crate) fn u64_at(value: &Value, pointer: &str) -> u64 {
    value.pointer(pointer).and_then(Value::as_u64).unwrap_or(0)
}

/// Splits a byte stream into complete lines across chunk boundaries.
#[derive(Debug, Default)]
pub(crate) struct LineBuffer {
    pending: Vec<u8>
}

impl LineBuffer {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line);
            let text = text.trim_end_matches(['\r', '\n']);
            if !text.is_empty() {
                lines.push(text.to_string());
            }
        }
        lines
    }

    /// Whatever is left once the stream ends without a trailing newline.
    pub(crate) fn finish(self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending).trim().to_string();
        (!text.is_empty()).then_some(text)
    }
}
