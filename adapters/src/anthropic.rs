use crate::http::{
    LineBuffer, build_client, check_status, invalid_response, merge_options, read_json,
    transport_error, u64_at
};
use crate::pricing::anthropic_prices;
use async_trait::async_trait;
use errors::BackendError;
use futures_util::StreamExt;
use orch_core::{
    BackendAdapter, BackendConfig, BackendResult, ChatTurn, ChunkSink, PriceTable,
    RequestOptions, Role, TokenUsage
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
pub const API_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Backend for the Anthropic Messages API.
///
/// Text only: image, embedding and audio operations report
/// [`BackendError::Unsupported`].
pub struct AnthropicBackend {
    name: String,
    model: String,
    api_key: String,
    base_url: String,
    timeout: Duration,
    client: reqwest::Client,
    prices: PriceTable
}

impl AnthropicBackend {
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
            prices: anthropic_prices()
        })
    }

    pub fn from_config(name: &str, config: &BackendConfig, model: &str) -> Result<Self, String> {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
        Self::with_base_url(name, api_key, model, base_url, config.timeout())
    }

    fn post(&self) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
    }

    /// System turns are lifted into the top-level `system` field; the API
    /// rejects them inside `messages`.
    fn body(&self, turns: &[ChatTurn], options: &RequestOptions, stream: bool) -> Value {
        let system: Vec<&str> = turns
            .iter()
            .filter(|t| t.role == Role::System)
            .map(|t| t.content.as_str())
            .collect();
        let messages: Vec<&ChatTurn> = turns.iter().filter(|t| t.role != Role::System).collect();

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": DEFAULT_MAX_TOKENS,
        });
        if !system.is_empty() {
            body["system"] = json!(system.join("\n\n"));
        }
        if stream {
            body["stream"] = json!(true);
        }
        merge_options(&mut body, options);
        body
    }

    fn usage(usage: &Value) -> TokenUsage {
        TokenUsage::new(
            u64_at(usage, "/input_tokens"),
            u64_at(usage, "/output_tokens")
        )
    }
}

#[async_trait]
impl BackendAdapter for AnthropicBackend {
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
        let body = self.body(turns, options, false);
        let response = self
            .post()
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.name, self.timeout, e))?;
        let data = read_json(&self.name, self.timeout, response).await?;

        let content = data
            .pointer("/content/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid_response(&self.name, "no text content in response"))?;
        let usage = data.get("usage").map(Self::usage).unwrap_or_default();
        let model = data
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(&self.model);

        Ok(BackendResult::from_text(content)
            .with_usage(usage)
            .with_model(model))
    }

    async fn stream_chat(
        &self,
        turns: &[ChatTurn],
        sink: &mut ChunkSink<'_>,
        options: &RequestOptions
    ) -> Result<BackendResult, BackendError> {
        let body = self.body(turns, options, true);
        let response = self
            .post()
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(&self.name, self.timeout, e))?;
        let response = check_status(&self.name, self.timeout, response).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        let mut content = String::new();
        let mut input_tokens = 0;
        let mut output_tokens = 0;
        let mut model = self.model.clone();

        'read: while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| transport_error(&self.name, self.timeout, e))?;
            for line in lines.push(&chunk) {
                let Some(data) = line.strip_prefix("data:").map(str::trim) else {
                    continue;
                };
                let Ok(event) = serde_json::from_str::<Value>(data) else {
                    debug!(backend = %self.name, "Skipping undecodable stream event");
                    continue;
                };
                match event.get("type").and_then(Value::as_str) {
                    Some("message_start") => {
                        input_tokens = u64_at(&event, "/message/usage/input_tokens");
                        if let Some(m) = event.pointer("/message/model").and_then(Value::as_str) {
                            model = m.to_string();
                        }
                    }
                    Some("content_block_delta") => {
                        if let Some(delta) = event
                            .pointer("/delta/text")
                            .and_then(Value::as_str)
                            .filter(|d| !d.is_empty())
                        {
                            sink(delta);
                            content.push_str(delta);
                        }
                    }
                    Some("message_delta") => {
                        output_tokens = u64_at(&event, "/usage/output_tokens");
                    }
                    Some("message_stop") => break 'read,
                    Some("error") => {
                        let reason = event
                            .pointer("/error/message")
                            .and_then(Value::as_str)
                            .unwrap_or("stream error");
                        return Err(invalid_response(&self.name, reason));
                    }
                    _ => {}
                }
            }
        }

        Ok(BackendResult::from_text(content)
            .with_usage(TokenUsage::new(input_tokens, output_tokens))
            .with_model(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_turns_move_to_top_level() {
        let backend = AnthropicBackend::new("anthropic", "key", "claude-3-haiku").unwrap();
        let turns = vec![
            ChatTurn::system("Be brief."),
            ChatTurn::user("Hi"),
            ChatTurn::assistant("Hello"),
            ChatTurn::user("Bye"),
        ];

        let body = backend.body(&turns, &RequestOptions::new(), false);
        assert_eq!(body["system"], "Be brief.");
        assert_eq!(body["messages"].as_array().unwrap().len(), 3);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["max_tokens"], 4096);
    }

    #[test]
    fn test_options_override_max_tokens() {
        let backend = AnthropicBackend::new("anthropic", "key", "claude-3-haiku").unwrap();
        let mut options = RequestOptions::new();
        options.insert("max_tokens".to_string(), json!(256));

        let body = backend.body(&[ChatTurn::user("Hi")], &options, true);
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream"], true);
        assert!(body.get("system").is_none());
    }
}
