use crate::http::{
    LineBuffer, build_client, check_status, invalid_response, merge_options, option_str,
    read_json, transport_error, u64_at
};
use crate::pricing::ollama_prices;
use async_trait::async_trait;
use errors::BackendError;
use futures_util::StreamExt;
use orch_core::{
    BackendAdapter, BackendConfig, BackendOutput, BackendResult, ChatTurn, ChunkSink,
    EmbeddingInput, PriceTable, RequestOptions, TokenUsage
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Local models answer slowly on commodity hardware.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Backend for a local Ollama server. No API key, zero cost.
pub struct OllamaBackend {
    name: String,
    model: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    prices: PriceTable
}

impl OllamaBackend {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Result<Self, String> {
        Self::with_base_url(name, model, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    pub fn with_base_url(
        name: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
        timeout: Duration
    ) -> Result<Self, String> {
        let name = name.into();
        let client = build_client(&name, timeout)?;
        Ok(Self {
            name,
            model: model.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
            prices: ollama_prices()
        })
    }

    pub fn from_config(name: &str, config: &BackendConfig, model: &str) -> Result<Self, String> {
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self::with_base_url(name, model, base_url, config.timeout())
    }

    fn chat_body(&self, turns: &[ChatTurn], options: &RequestOptions, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": turns,
            "stream": stream,
        });
        merge_options(&mut body, options);
        body
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response, BackendError> {
        self.client
            .post(format!("{}/{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&self.name, self.timeout, e))
    }

    /// Ollama reports counts only on the final message, and not always then.
    fn usage(data: &Value) -> TokenUsage {
        TokenUsage::new(
            u64_at(data, "/prompt_eval_count"),
            u64_at(data, "/eval_count")
        )
    }
}

#[async_trait]
impl BackendAdapter for OllamaBackend {
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
        self.chat(&[ChatTurn::user(prompt)], options).await
    }

    async fn chat(
        &self,
        turns: &[ChatTurn],
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let body = self.chat_body(turns, options, false);
        let response = self.post("api/chat", &body).await?;
        let data = read_json(&self.name, self.timeout, response).await?;

        let content = data
            .pointer("/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_response(&self.name, "no message in response"))?;
        let model = data
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.model);

        Ok(BackendResult::from_text(content)
            .with_usage(Self::usage(&data))
            .with_model(model))
    }

    async fn stream_chat(
        &self,
        turns: &[ChatTurn],
        sink: &mut ChunkSink<'_>,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let body = self.chat_body(turns, options, true);
        let response = self.post("api/chat", &body).await?;
        let response = check_status(&self.name, self.timeout, response).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut content = String::new();
        let mut usage = TokenUsage::default();

        let mut handle = |line: &str, content: &mut String, usage: &mut TokenUsage| {
            let Ok(event) = serde_json::from_str::<Value>(line) else {
                debug!(backend = %self.name, "Skipping undecodable stream line");
                return;
            };
            if let Some(delta) = event
                .pointer("/message/content")
                .and_then(Value::as_str)
                .filter(|d| !d.is_empty())
            {
                sink(delta);
                content.push_str(delta);
            }
            if event.get("done").and_then(Value::as_bool) == Some(true) {
                *usage = Self::usage(&event);
            }
        };

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&self.name, self.timeout, e))?;
            for line in lines.push(&chunk) {
                handle(&line, &mut content, &mut usage);
            }
        }
        if let Some(line) = lines.finish() {
            handle(&line, &mut content, &mut usage);
        }

        Ok(BackendResult::from_text(content)
            .with_usage(usage)
            .with_model(self.model.clone()))
    }

    /// One `api/embeddings` call per text; the endpoint takes a single prompt.
    async fn embed_text(
        &self,
        input: &EmbeddingInput,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let model = option_str(options, "model").unwrap_or(&self.model);
        let mut embeddings = Vec::new();

        for text in input.texts() {
            let body = json!({ "model": model, "prompt": text });
            let response = self.post("api/embeddings", &body).await?;
            let data = read_json(&self.name, self.timeout, response).await?;
            let vector = data
                .get("embedding")
                .and_then(Value::as_array)
                .ok_or_else(|| invalid_response(&self.name, "no embedding in response"))?
                .iter()
                .filter_map(Value::as_f64)
                .map(|f| f as f32)
                .collect();
            embeddings.push(vector);
        }

        Ok(BackendResult::new(BackendOutput::Embeddings { embeddings }).with_model(model))
    }
}
