use crate::http::{
    LineBuffer, build_client, check_status, invalid_response, merge_options, option_str,
    read_json, transport_error, u64_at
};
use crate::pricing::openai_prices;
use async_trait::async_trait;
use errors::BackendError;
use futures_util::StreamExt;
use orch_core::{
    BackendAdapter, BackendConfig, BackendOutput, BackendResult, ChatTurn, ChunkSink,
    EmbeddingInput, GeneratedImage, PriceTable, RequestOptions, SpeechOutput, TokenUsage
};
use serde_json::{Value, json};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TEMPERATURE: f64 = 0.7;

/// Backend for the OpenAI REST API and compatible servers.
pub struct OpenAiBackend {
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    prices: PriceTable
}

impl OpenAiBackend {
    pub fn new(
        name: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>
    ) -> Result<Self, String> {
        Self::with_base_url(name, api_key, model, DEFAULT_BASE_URL, Duration::from_secs(60))
    }

    pub fn with_base_url(
        name: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
        timeout: Duration
    ) -> Result<Self, String> {
        let name = name.into();
        let client = build_client(&name, timeout)?;
        Ok(Self {
            name,
            model: model.into(),
            api_key: api_key.into(),
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client,
            prices: openai_prices()
        })
    }

    /// Build from configuration, `model` replacing the configured default.
    pub fn from_config(name: &str, config: &BackendConfig, model: &str) -> Result<Self, String> {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self::with_base_url(name, api_key, model, base_url, config.timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(&self.api_key)
    }

    fn chat_body(&self, turns: &[ChatTurn], options: &RequestOptions, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": turns,
            "temperature": DEFAULT_TEMPERATURE,
        });
        if stream {
            body["stream"] = json!(true);
            body["stream_options"] = json!({ "include_usage": true });
        }
        merge_options(&mut body, options);
        body
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, BackendError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(&self.name, self.timeout, e))?;
        read_json(&self.name, self.timeout, response).await
    }

    fn usage(data: &Value) -> TokenUsage {
        let input = u64_at(data, "/usage/prompt_tokens");
        let output = u64_at(data, "/usage/completion_tokens");
        let mut usage = TokenUsage::new(input, output);
        if let Some(total) = data.pointer("/usage/total_tokens").and_then(Value::as_u64) {
            usage.total_tokens = total;
        }
        usage
    }

    fn model_of(&self, data: &Value) -> String {
        data.get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.model)
            .to_string()
    }
}

#[async_trait]
impl BackendAdapter for OpenAiBackend {
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
        let data = self.send(self.post("chat/completions").json(&body)).await?;

        let content = data
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_response(&self.name, "no choices in response"))?;

        Ok(BackendResult::from_text(content)
            .with_usage(Self::usage(&data))
            .with_model(self.model_of(&data)))
    }

    async fn stream_chat(
        &self,
        turns: &[ChatTurn],
        sink: &mut ChunkSink<'_>,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let body = self.chat_body(turns, options, true);
        let response = self
            .post("chat/completions")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.name, self.timeout, e))?;
        let response = check_status(&self.name, self.timeout, response).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut content = String::new();
        let mut usage = TokenUsage::default();
        let mut model = self.model.clone();

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&self.name, self.timeout, e))?;
            for line in lines.push(&chunk) {
                let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                if data == "[DONE]" {
                    break 'read;
                }
                let Ok(event) = serde_json::from_str::<Value>(data) else {
                    debug!(backend = %self.name, "Skipping undecodable stream event");
                    continue;
                };
                if let Some(delta) = event
                    .pointer("/choices/0/delta/content")
                    .and_then(Value::as_str)
                    .filter(|d| !d.is_empty())
                {
                    sink(delta);
                    content.push_str(delta);
                }
                if event.get("usage").is_some_and(|u| !u.is_null()) {
                    usage = Self::usage(&event);
                }
                if let Some(m) = event.get("model").and_then(Value::as_str) {
                    model = m.to_string();
                }
            }
        }

        Ok(BackendResult::from_text(content)
            .with_usage(usage)
            .with_model(model))
    }

    async fn generate_image(
        &self,
        prompt: &str,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let mut body = json!({
            "model": option_str(options, "model").unwrap_or("dall-e-3"),
            "prompt": prompt,
            "n": options.get("n").and_then(Value::as_u64).unwrap_or(1),
            "size": option_str(options, "size").unwrap_or("1024x1024"),
        });
        merge_options(&mut body, options);
        let data = self.send(self.post("images/generations").json(&body)).await?;

        let images: Vec<GeneratedImage> = data
            .get("data")
            .cloned()
            .map(serde_json::from_value::<Vec<GeneratedImage>>)
            .transpose()
            .map_err(|e| invalid_response(&self.name, e.to_string()))?
            .unwrap_or_default();
        if images.is_empty() {
            return Err(invalid_response(&self.name, "no images in response"));
        }

        Ok(BackendResult::new(BackendOutput::Images { images }))
    }

    async fn embed_text(
        &self,
        input: &EmbeddingInput,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let mut body = json!({
            "model": option_str(options, "model").unwrap_or("text-embedding-3-small"),
            "input": input,
        });
        merge_options(&mut body, options);
        let data = self.send(self.post("embeddings").json(&body)).await?;

        let mut rows: Vec<(u64, Vec<f32>)> = data
            .get("data")
            .and_then(Value::as_array)
            .ok_or_else(|| invalid_response(&self.name, "no embeddings in response"))?
            .iter()
            .map(|row| {
                let index = row.get("index").and_then(Value::as_u64).unwrap_or(0);
                let vector = row
                    .get("embedding")
                    .and_then(Value::as_array)
                    .map(|v| v.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())
                    .unwrap_or_default();
                (index, vector)
            })
            .collect();
        rows.sort_by_key(|(index, _)| *index);

        let tokens = u64_at(&data, "/usage/total_tokens");
        Ok(
            BackendResult::new(BackendOutput::Embeddings {
                embeddings: rows.into_iter().map(|(_, v)| v).collect()
            })
            .with_usage(TokenUsage::new(tokens, 0))
        )
    }

    async fn transcribe_audio(
        &self,
        audio_path: &Path,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let bytes = tokio::fs::read(audio_path).await.map_err(|e| BackendError::Other {
            message: format!("cannot read {}: {e}", audio_path.display())
        })?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let mut form = reqwest::multipart::Form::new()
            .text(
                "model",
                option_str(options, "model").unwrap_or("whisper-1").to_string()
            )
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(file_name));
        if let Some(language) = option_str(options, "language") {
            form = form.text("language", language.to_string());
        }

        let data = self.send(self.post("audio/transcriptions").multipart(form)).await?;
        let text = data
            .get("text")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_response(&self.name, "no text in transcription"))?;

        Ok(BackendResult::new(BackendOutput::Transcript {
            text: text.to_string()
        }))
    }

    async fn text_to_speech(
        &self,
        text: &str,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let body = json!({
            "model": option_str(options, "model").unwrap_or("tts-1"),
            "input": text,
            "voice": option_str(options, "voice").unwrap_or("alloy"),
        });
        let response = self
            .post("audio/speech")
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.name, self.timeout, e))?;
        let response = check_status(&self.name, self.timeout, response).await?;
        let audio = response
            .bytes()
            .await
            .map_err(|e| transport_error(&self.name, self.timeout, e))?;

        let output = match option_str(options, "output_path") {
            Some(path) => {
                tokio::fs::write(path, &audio)
                    .await
                    .map_err(|e| BackendError::Other {
                        message: format!("cannot write {path}: {e}")
                    })?;
                SpeechOutput::Path(path.into())
            }
            None => SpeechOutput::Bytes(audio.to_vec())
        };

        Ok(BackendResult::new(BackendOutput::Audio { audio: output }))
    }
}
