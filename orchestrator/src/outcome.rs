use crate::structured::JsonObject;
use orch_core::{AttemptRecord, BackendResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Successful result of one engine call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestrationOutcome {
    pub result: BackendResult,
    /// Symbolic name of the backend that answered, override included.
    pub backend: String,
    pub model: String,
    /// Every attempt in order, the last one successful.
    pub attempts: Vec<AttemptRecord>,
    /// USD, including any structured-output repair call.
    pub cost: f64,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<JsonObject>
}

impl OrchestrationOutcome {
    /// Text content or transcript.
    pub fn text(&self) -> Option<&str> {
        self.result.text()
    }

    /// The validated object when a schema was requested; otherwise the
    /// content parsed as JSON, or `{"content": text}`.
    pub fn structured(&self) -> Value {
        if let Some(data) = &self.structured {
            return Value::Object(data.clone());
        }
        let text = self.text().unwrap_or_default();
        serde_json::from_str(text).unwrap_or_else(|_| serde_json::json!({ "content": text }))
    }

    pub fn failed_attempts(&self) -> usize {
        self.attempts.iter().filter(|a| !a.is_success()).count()
    }
}

/// Successful result of a streamed call. The chunks already went to the sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub result: BackendResult,
    pub backend: String,
    pub model: String,
    pub attempts: Vec<AttemptRecord>,
    pub cost: f64
}

impl StreamOutcome {
    pub fn text(&self) -> &str {
        self.result.text().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn outcome(text: &str) -> OrchestrationOutcome {
        OrchestrationOutcome {
            result: BackendResult::from_text(text),
            backend: "a".to_string(),
            model: "m".to_string(),
            attempts: Vec::new(),
            cost: 0.0,
            cached: false,
            structured: None
        }
    }

    #[test]
    fn test_structured_projection_fallbacks() {
        assert_eq!(outcome(r#"{"a": 1}"#).structured(), json!({"a": 1}));
        assert_eq!(outcome("plain words").structured(), json!({"content": "plain words"}));
    }
}
