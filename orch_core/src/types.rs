use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use strum::{Display, EnumString};
use validator::Validate;

/// Opaque backend-specific parameters (temperature, voice, output path, ...).
pub type RequestOptions = serde_json::Map<String, Value>;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
    System,
    User,
    Assistant
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String
}

impl ChatTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into()
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RequestKind {
    TextCompletion,
    Chat,
    Image,
    Embedding,
    Transcription,
    Speech
}

impl RequestKind {
    /// Only prompt and chat requests read from and write to conversation memory.
    pub fn feeds_memory(self) -> bool {
        matches!(self, RequestKind::TextCompletion | RequestKind::Chat)
    }

    pub fn supports_schema(self) -> bool {
        matches!(self, RequestKind::TextCompletion | RequestKind::Chat)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EmbeddingInput {
    Single(String),
    Batch(Vec<String>)
}

impl EmbeddingInput {
    pub fn texts(&self) -> Vec<&str> {
        match self {
            EmbeddingInput::Single(text) => vec![text.as_str()],
            EmbeddingInput::Batch(texts) => texts.iter().map(String::as_str).collect()
        }
    }
}

/// What the caller wants done. The variant is the request kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum RequestPayload {
    #[serde(rename = "text-completion")]
    Prompt { prompt: String },
    Chat { turns: Vec<ChatTurn> },
    Image { prompt: String },
    Embedding { input: EmbeddingInput },
    Transcription { audio_path: PathBuf },
    Speech { text: String }
}

impl RequestPayload {
    pub fn kind(&self) -> RequestKind {
        match self {
            RequestPayload::Prompt { .. } => RequestKind::TextCompletion,
            RequestPayload::Chat { .. } => RequestKind::Chat,
            RequestPayload::Image { .. } => RequestKind::Image,
            RequestPayload::Embedding { .. } => RequestKind::Embedding,
            RequestPayload::Transcription { .. } => RequestKind::Transcription,
            RequestPayload::Speech { .. } => RequestKind::Speech
        }
    }

    /// The caller's latest user-authored content, as appended to memory.
    pub fn latest_user_content(&self) -> Option<&str> {
        match self {
            RequestPayload::Prompt { prompt } => Some(prompt),
            RequestPayload::Chat { turns } => turns
                .iter()
                .rev()
                .find(|t| t.role == Role::User)
                .map(|t| t.content.as_str()),
            _ => None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Array,
    Numeric,
    Integer,
    /// Unrecognized constraint; presence may still be enforced.
    Any
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Array => "array",
            FieldType::Numeric => "numeric",
            FieldType::Integer => "integer",
            FieldType::Any => "any"
        }
    }
}

/// Parsed form of a schema constraint string such as `"required|string"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldConstraint {
    pub required: bool,
    pub field_type: FieldType,
    raw: String
}

impl FieldConstraint {
    pub fn parse(s: &str) -> Self {
        let mut required = false;
        let mut field_type = FieldType::Any;
        for part in s.split('|').map(str::trim) {
            match part.to_ascii_lowercase().as_str() {
                "required" => required = true,
                "string" => field_type = FieldType::String,
                "array" => field_type = FieldType::Array,
                "numeric" => field_type = FieldType::Numeric,
                "integer" => field_type = FieldType::Integer,
                _ => {}
            }
        }
        Self {
            required,
            field_type,
            raw: s.to_string()
        }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

impl FromStr for FieldConstraint {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

/// Field name to constraint mapping the response must satisfy.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExpectedSchema {
    fields: BTreeMap<String, FieldConstraint>
}

impl ExpectedSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, constraint: &str) -> Self {
        self.fields
            .insert(name.into(), FieldConstraint::parse(constraint));
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldConstraint)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The schema as the caller wrote it, for prompt instructions.
    pub fn to_json(&self) -> Value {
        let map = self
            .fields
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.raw.clone())))
            .collect();
        Value::Object(map)
    }
}

impl<K: Into<String>, V: AsRef<str>> FromIterator<(K, V)> for ExpectedSchema {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        iter.into_iter()
            .fold(Self::new(), |schema, (k, v)| schema.field(k, v.as_ref()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64
}

impl TokenUsage {
    pub fn new(input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            input_tokens,
            output_tokens,
            total_tokens: input_tokens + output_tokens
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedImage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub b64_json: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_prompt: Option<String>
}

/// Synthesized speech: raw audio or the path it was written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeechOutput {
    Bytes(Vec<u8>),
    Path(PathBuf)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BackendOutput {
    Text { content: String },
    Images { images: Vec<GeneratedImage> },
    Embeddings { embeddings: Vec<Vec<f32>> },
    Transcript { text: String },
    Audio { audio: SpeechOutput }
}

/// Normalized result of any backend operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendResult {
    pub output: BackendOutput,
    #[serde(default)]
    pub usage: TokenUsage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>
}

impl BackendResult {
    pub fn new(output: BackendOutput) -> Self {
        Self {
            output,
            usage: TokenUsage::default(),
            model: None
        }
    }

    pub fn from_text(content: impl Into<String>) -> Self {
        Self::new(BackendOutput::Text {
            content: content.into()
        })
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Text content for completions and chats, or the transcript.
    pub fn text(&self) -> Option<&str> {
        match &self.output {
            BackendOutput::Text { content } => Some(content),
            BackendOutput::Transcript { text } => Some(text),
            _ => None
        }
    }

    /// Short description of the output for audit rows.
    pub fn summary(&self) -> String {
        match &self.output {
            BackendOutput::Text { content } => content.clone(),
            BackendOutput::Transcript { text } => text.clone(),
            BackendOutput::Images { images } => format!("{} image(s)", images.len()),
            BackendOutput::Embeddings { embeddings } => {
                format!("{} embedding(s)", embeddings.len())
            }
            BackendOutput::Audio {
                audio: SpeechOutput::Path(path)
            } => path.display().to_string(),
            BackendOutput::Audio {
                audio: SpeechOutput::Bytes(bytes)
            } => format!("{} bytes of audio", bytes.len())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure
}

/// One try against one backend within a single engine call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub backend: String,
    pub outcome: AttemptOutcome,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_ms: u64
}

impl AttemptRecord {
    pub fn success(backend: impl Into<String>, cached: bool, duration: Duration) -> Self {
        Self {
            backend: backend.into(),
            outcome: AttemptOutcome::Success,
            cached,
            error: None,
            duration_ms: duration.as_millis() as u64
        }
    }

    pub fn failure(backend: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            backend: backend.into(),
            outcome: AttemptOutcome::Failure,
            cached: false,
            error: Some(error.into()),
            duration_ms: duration.as_millis() as u64
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome == AttemptOutcome::Success
    }
}

/// A stored conversation turn. `sequence` is assigned by the store at append
/// time and never reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub session_key: String,
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub sequence: u64,
    pub created_at: DateTime<Utc>
}

impl ConversationTurn {
    pub fn as_chat_turn(&self) -> ChatTurn {
        ChatTurn::new(self.role, self.content.clone())
    }
}

/// One audit log row per completed attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub backend: String,
    pub model: String,
    pub kind: RequestKind,
    pub input: String,
    pub output: String,
    pub total_tokens: u64,
    pub cost: f64,
    pub cached: bool,
    pub duration_ms: u64
}

/// Counters kept by the result cache next to its key registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheCounter {
    Hits,
    Stores
}

impl CacheCounter {
    pub const ALL: [CacheCounter; 2] = [CacheCounter::Hits, CacheCounter::Stores];

    /// Storage key of the counter in shared cache backends.
    pub fn key(self) -> &'static str {
        match self {
            CacheCounter::Hits => "ai:metrics.cache_hits",
            CacheCounter::Stores => "ai:metrics.cache_stores"
        }
    }
}

/// Storage key of the set holding every issued cache key.
pub const CACHE_KEY_REGISTRY: &str = "ai:cache.keys";

fn default_timeout_seconds() -> u64 {
    60
}

/// Connection settings for one configured backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct BackendConfig {
    /// Adapter implementation to use (`openai`, `anthropic`, `ollama`, ...)
    #[validate(length(min = 1, max = 64))]
    pub driver: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Default model; a `name:model` override replaces it for one call.
    #[validate(length(min = 1, max = 255))]
    pub model: String,

    /// Bounded wait for one backend call.
    #[serde(default = "default_timeout_seconds")]
    #[validate(range(min = 1, max = 3600))]
    pub timeout_seconds: u64
}

impl BackendConfig {
    pub fn new(driver: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            driver: driver.into(),
            api_key: None,
            base_url: None,
            model: model.into(),
            timeout_seconds: default_timeout_seconds()
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_timeout_seconds(mut self, timeout_seconds: u64) -> Self {
        self.timeout_seconds = timeout_seconds;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_constraint_parsing() {
        let required: FieldConstraint = "required|string".parse().unwrap();
        assert!(required.required);
        assert_eq!(required.field_type, FieldType::String);
        assert_eq!(required.raw(), "required|string");

        let optional: FieldConstraint = "integer".parse().unwrap();
        assert!(!optional.required);
        assert_eq!(optional.field_type, FieldType::Integer);

        let unknown: FieldConstraint = "required|date".parse().unwrap();
        assert!(unknown.required);
        assert_eq!(unknown.field_type, FieldType::Any);
    }

    #[test]
    fn test_schema_json_keeps_raw_constraints() {
        let schema: ExpectedSchema = [("name", "required|string"), ("age", "integer")]
            .into_iter()
            .collect();
        assert_eq!(
            schema.to_json(),
            json!({"age": "integer", "name": "required|string"})
        );
    }

    #[test]
    fn test_latest_user_content_for_chat() {
        let payload = RequestPayload::Chat {
            turns: vec![
                ChatTurn::system("be brief"),
                ChatTurn::user("first"),
                ChatTurn::assistant("ok"),
                ChatTurn::user("second"),
            ]
        };
        assert_eq!(payload.latest_user_content(), Some("second"));
        assert_eq!(payload.kind(), RequestKind::Chat);
    }

    #[test]
    fn test_backend_result_roundtrips_through_cache_encoding() {
        let result = BackendResult::from_text("hello")
            .with_usage(TokenUsage::new(3, 4))
            .with_model("gpt-4o");
        let encoded = serde_json::to_string(&result).unwrap();
        let decoded: BackendResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, result);
        assert_eq!(decoded.usage.total_tokens, 7);
    }

    #[test]
    fn test_role_parsing_is_case_insensitive() {
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!(Role::System.to_string(), "system");
    }
}
