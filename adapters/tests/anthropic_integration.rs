use adapters::AnthropicBackend;
use adapters::anthropic::API_VERSION;
use orch_core::{BackendAdapter, ChatTurn, EmbeddingInput, RequestOptions};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend(server: &MockServer) -> AnthropicBackend {
    AnthropicBackend::with_base_url(
        "anthropic",
        "ak-test",
        "claude-3-opus-20240229",
        &server.uri(),
        Duration::from_secs(5)
    )
    .unwrap()
}

#[tokio::test]
async fn test_messages_request_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "ak-test"))
        .and(header("anthropic-version", API_VERSION))
        .and(body_partial_json(json!({
            "system": "Answer in French.",
            "max_tokens": 4096,
            "messages": [{"role": "user", "content": "Hello"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "claude-3-opus-20240229",
            "content": [{"type": "text", "text": "Bonjour"}],
            "usage": {"input_tokens": 1000, "output_tokens": 1000}
        })))
        .mount(&server)
        .await;

    let backend = backend(&server);
    let turns = [ChatTurn::system("Answer in French."), ChatTurn::user("Hello")];
    let result = backend.chat(&turns, &RequestOptions::new()).await.unwrap();

    assert_eq!(result.text(), Some("Bonjour"));
    assert_eq!(result.usage.total_tokens, 2000);
    let cost = backend.cost(orch_core::RequestKind::Chat, &result.usage);
    assert!((cost - 0.09).abs() < 1e-9);
}

#[tokio::test]
async fn test_stream_reads_content_block_deltas() {
    let server = MockServer::start().await;
    let body = concat!(
        "event: message_start\n",
        "data: {\"type\":\"message_start\",\"message\":{\"model\":\"claude-3-opus-20240229\",\"usage\":{\"input_tokens\":7}}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"Bon\"}}\n\n",
        "event: content_block_delta\n",
        "data: {\"type\":\"content_block_delta\",\"delta\":{\"type\":\"text_delta\",\"text\":\"jour\"}}\n\n",
        "event: message_delta\n",
        "data: {\"type\":\"message_delta\",\"usage\":{\"output_tokens\":2}}\n\n",
        "event: message_stop\n",
        "data: {\"type\":\"message_stop\"}\n\n"
    );
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;

    let mut chunks = Vec::new();
    let mut sink = |chunk: &str| chunks.push(chunk.to_string());
    let result = backend(&server)
        .stream_chat(&[ChatTurn::user("Hello")], &mut sink, &RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(chunks, vec!["Bon", "jour"]);
    assert_eq!(result.text(), Some("Bonjour"));
    assert_eq!(result.usage.total_tokens, 9);
}

#[tokio::test]
async fn test_embeddings_are_unsupported() {
    let server = MockServer::start().await;
    let err = backend(&server)
        .embed_text(&EmbeddingInput::Single("x".to_string()), &RequestOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_unsupported());
    assert!(err.to_string().contains("embeddings"));
}
