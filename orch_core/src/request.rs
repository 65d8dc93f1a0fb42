//! Request descriptions and the fluent builder that produces them.

use crate::types::{
    ChatTurn, EmbeddingInput, ExpectedSchema, RequestKind, RequestOptions, RequestPayload
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable description of one logical call.
///
/// Built through [`RequestBuilder`]; once built it cannot change, and the
/// fallback list never contains the primary backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescription {
    payload: RequestPayload,
    primary_backend: Option<String>,
    fallback_backends: Vec<String>,
    cache_ttl: Option<Duration>,
    expected_schema: Option<ExpectedSchema>,
    memory_session: Option<String>,
    options: RequestOptions,
    user_id: Option<String>
}

impl RequestDescription {
    pub fn prompt(prompt: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(RequestPayload::Prompt {
            prompt: prompt.into()
        })
    }

    /// Prompt with `{key}` placeholders filled from `variables`.
    pub fn prompt_template(template: &str, variables: &BTreeMap<String, Value>) -> RequestBuilder {
        Self::prompt(utils::render_template(template, variables))
    }

    pub fn chat(turns: Vec<ChatTurn>) -> RequestBuilder {
        RequestBuilder::new(RequestPayload::Chat { turns })
    }

    pub fn image(prompt: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(RequestPayload::Image {
            prompt: prompt.into()
        })
    }

    pub fn embed(input: EmbeddingInput) -> RequestBuilder {
        RequestBuilder::new(RequestPayload::Embedding { input })
    }

    pub fn transcribe(audio_path: impl Into<PathBuf>) -> RequestBuilder {
        RequestBuilder::new(RequestPayload::Transcription {
            audio_path: audio_path.into()
        })
    }

    pub fn speak(text: impl Into<String>) -> RequestBuilder {
        RequestBuilder::new(RequestPayload::Speech { text: text.into() })
    }

    pub fn kind(&self) -> RequestKind {
        self.payload.kind()
    }

    pub fn payload(&self) -> &RequestPayload {
        &self.payload
    }

    pub fn primary_backend(&self) -> Option<&str> {
        self.primary_backend.as_deref()
    }

    pub fn fallback_backends(&self) -> &[String] {
        &self.fallback_backends
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl
    }

    pub fn expected_schema(&self) -> Option<&ExpectedSchema> {
        self.expected_schema.as_ref()
    }

    pub fn memory_session(&self) -> Option<&str> {
        self.memory_session.as_deref()
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }
}

/// Fluent builder for [`RequestDescription`].
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    payload: RequestPayload,
    primary_backend: Option<String>,
    fallback_backends: Vec<String>,
    cache_ttl: Option<Duration>,
    expected_schema: Option<ExpectedSchema>,
    memory_session: Option<String>,
    options: RequestOptions,
    user_id: Option<String>
}

impl RequestBuilder {
    fn new(payload: RequestPayload) -> Self {
        Self {
            payload,
            primary_backend: None,
            fallback_backends: Vec::new(),
            cache_ttl: None,
            expected_schema: None,
            memory_session: None,
            options: RequestOptions::new(),
            user_id: None
        }
    }

    /// Primary backend, optionally as `name:model`.
    pub fn using(mut self, backend: impl Into<String>) -> Self {
        self.primary_backend = Some(backend.into());
        self
    }

    /// Append one fallback backend. Repeats are ignored.
    pub fn fallback(mut self, backend: impl Into<String>) -> Self {
        let backend = backend.into();
        if !self.fallback_backends.contains(&backend) {
            self.fallback_backends.push(backend);
        }
        self
    }

    pub fn fallbacks<I, S>(self, backends: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        backends.into_iter().fold(self, |b, name| b.fallback(name))
    }

    pub fn cache(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    pub fn expect(mut self, schema: ExpectedSchema) -> Self {
        self.expected_schema = Some(schema);
        self
    }

    pub fn with_memory(mut self, session: impl Into<String>) -> Self {
        self.memory_session = Some(session.into());
        self
    }

    /// Merge options; later keys win.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options.extend(options);
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    pub fn as_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn build(self) -> RequestDescription {
        let fallback_backends = match &self.primary_backend {
            Some(primary) => self
                .fallback_backends
                .into_iter()
                .filter(|name| name != primary)
                .collect(),
            None => self.fallback_backends
        };

        RequestDescription {
            payload: self.payload,
            primary_backend: self.primary_backend,
            fallback_backends,
            cache_ttl: self.cache_ttl,
            expected_schema: self.expected_schema,
            memory_session: self.memory_session,
            options: self.options,
            user_id: self.user_id
        }
    }
}

impl From<RequestBuilder> for RequestDescription {
    fn from(builder: RequestBuilder) -> Self {
        builder.build()
    }
}
