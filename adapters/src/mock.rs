//! Scripted in-process backend for tests and offline wiring.

use async_trait::async_trait;
use errors::{BackendError, ConfigurationError};
use orch_core::{
    BackendAdapter, BackendConfig, BackendFactory, BackendOutput, BackendResult, ChatTurn,
    ChunkSink, EmbeddingInput, GeneratedImage, PriceTable, RequestOptions, SpeechOutput,
    TokenUsage
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// What a scripted backend does on its next call.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Reply(BackendResult),
    /// Fails with exactly this message.
    Fail(String),
    Unsupported
}

impl ScriptedOutcome {
    pub fn text(content: impl Into<String>) -> Self {
        Self::Reply(BackendResult::from_text(content).with_usage(TokenUsage::new(10, 20)))
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail(message.into())
    }
}

/// A call observed by a scripted backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub operation: &'static str,
    pub model: String,
    pub prompt: Option<String>,
    pub turns: Vec<ChatTurn>,
    pub options: RequestOptions
}

#[derive(Debug)]
struct ScriptState {
    queue: Mutex<VecDeque<ScriptedOutcome>>,
    fallback: Mutex<ScriptedOutcome>,
    calls: Mutex<Vec<RecordedCall>>
}

/// Backend answering from a script of outcomes, then a default outcome.
///
/// Clones share the script and the call log, so a clone built for a model
/// override still reports to the original.
#[derive(Debug, Clone)]
pub struct ScriptedBackend {
    name: String,
    model: String,
    prices: PriceTable,
    stream_chunks: Option<Vec<String>>,
    latency: Option<Duration>,
    state: Arc<ScriptState>
}

impl ScriptedBackend {
    /// Replies `"ok"` to everything until scripted otherwise.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_default(name, ScriptedOutcome::text("ok"))
    }

    pub fn with_default(name: impl Into<String>, outcome: ScriptedOutcome) -> Self {
        Self {
            name: name.into(),
            model: "scripted-model".to_string(),
            prices: PriceTable::free(),
            stream_chunks: None,
            latency: None,
            state: Arc::new(ScriptState {
                queue: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(outcome),
                calls: Mutex::new(Vec::new())
            })
        }
    }

    pub fn replying(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_default(name, ScriptedOutcome::text(content))
    }

    pub fn failing(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_default(name, ScriptedOutcome::fail(message))
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }

    /// Chunks delivered by `stream_chat` instead of the scripted text.
    pub fn with_stream_chunks<I, S>(mut self, chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>
    {
        self.stream_chunks = Some(chunks.into_iter().map(Into::into).collect());
        self
    }

    /// Sleep before answering, for timeout and cancellation tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Clone sharing this backend's script, answering as `model`.
    pub fn for_model(&self, model: &str) -> Self {
        self.clone().with_model(model)
    }

    /// Queue outcomes consumed one per call, before the default applies.
    pub fn push(&self, outcome: ScriptedOutcome) -> &Self {
        self.state.queue.lock().push_back(outcome);
        self
    }

    pub fn set_default(&self, outcome: ScriptedOutcome) {
        *self.state.fallback.lock() = outcome;
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.calls.lock().len()
    }

    pub fn calls_to(&self, operation: &str) -> usize {
        self.state
            .calls
            .lock()
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.state.calls.lock().last().cloned()
    }

    async fn answer(
        &self,
        operation: &'static str,
        prompt: Option<&str>,
        turns: &[ChatTurn],
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        self.state.calls.lock().push(RecordedCall {
            operation,
            model: self.model.clone(),
            prompt: prompt.map(str::to_string),
            turns: turns.to_vec(),
            options: options.clone()
        });
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let outcome = self
            .state
            .queue
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.state.fallback.lock().clone());
        match outcome {
            ScriptedOutcome::Reply(result) => {
                if result.model.is_some() {
                    Ok(result)
                } else {
                    Ok(result.with_model(self.model.clone()))
                }
            }
            ScriptedOutcome::Fail(message) => Err(BackendError::other(message)),
            ScriptedOutcome::Unsupported => Err(BackendError::unsupported(&self.name, operation))
        }
    }

    /// Non-text operations answer with a plausible output of their own shape
    /// when the script holds plain text.
    fn reshape(result: BackendResult, shape: impl FnOnce(String) -> BackendOutput) -> BackendResult {
        match result.output {
            BackendOutput::Text { content } => BackendResult {
                output: shape(content),
                ..result
            },
            _ => result
        }
    }
}

#[async_trait]
impl BackendAdapter for ScriptedBackend {
    fn backend_name(&self) -> &str {
        &self.name
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn price_table(&self) -> &PriceTable {
        &self.prices
    }

    async fn complete(
        &self,
        prompt: &str,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        self.answer("complete", Some(prompt), &[], options).await
    }

    async fn chat(
        &self,
        turns: &[ChatTurn],
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        self.answer("chat", None, turns, options).await
    }

    async fn stream_chat(
        &self,
        turns: &[ChatTurn],
        sink: &mut ChunkSink<'_>,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let result = self.answer("stream_chat", None, turns, options).await?;
        match &self.stream_chunks {
            Some(chunks) => {
                for chunk in chunks {
                    sink(chunk);
                }
                Ok(BackendResult {
                    output: BackendOutput::Text {
                        content: chunks.concat()
                    },
                    ..result
                })
            }
            None => {
                if let Some(text) = result.text() {
                    sink(text);
                }
                Ok(result)
            }
        }
    }

    async fn generate_image(
        &self,
        prompt: &str,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let result = self.answer("generate_image", Some(prompt), &[], options).await?;
        Ok(Self::reshape(result, |url| BackendOutput::Images {
            images: vec![GeneratedImage {
                url: Some(url),
                b64_json: None,
                revised_prompt: None
            }]
        }))
    }

    async fn embed_text(
        &self,
        input: &EmbeddingInput,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let joined = input.texts().join("\n");
        let result = self.answer("embed_text", Some(&joined), &[], options).await?;
        let count = input.texts().len();
        Ok(Self::reshape(result, |_| BackendOutput::Embeddings {
            embeddings: vec![vec![0.0; 3]; count]
        }))
    }

    async fn transcribe_audio(
        &self,
        audio_path: &Path,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let path = audio_path.display().to_string();
        let result = self.answer("transcribe_audio", Some(&path), &[], options).await?;
        Ok(Self::reshape(result, |text| BackendOutput::Transcript { text }))
    }

    async fn text_to_speech(
        &self,
        text: &str,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let result = self.answer("text_to_speech", Some(text), &[], options).await?;
        Ok(Self::reshape(result, |content| BackendOutput::Audio {
            audio: SpeechOutput::Bytes(content.into_bytes())
        }))
    }
}

/// Factory for the `scripted` driver, serving pre-built backends by name.
#[derive(Debug, Default, Clone)]
pub struct ScriptedFactory {
    backends: HashMap<String, ScriptedBackend>
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_backend(mut self, backend: ScriptedBackend) -> Self {
        self.backends.insert(backend.name.clone(), backend);
        self
    }
}

impl BackendFactory for ScriptedFactory {
    fn driver(&self) -> &str {
        "scripted"
    }

    fn build(
        &self,
        name: &str,
        config: &BackendConfig,
        model_override: Option<&str>
    ) -> Result<Arc<dyn BackendAdapter>, ConfigurationError> {
        let backend = self
            .backends
            .get(name)
            .ok_or_else(|| ConfigurationError::NotConfigured {
                name: name.to_string()
            })?;
        let model = model_override.unwrap_or(&config.model);
        Ok(Arc::new(backend.for_model(model)))
    }
}
