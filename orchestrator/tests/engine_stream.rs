mod common;

use adapters::{ScriptedBackend, ScriptedOutcome};
use errors::OrchestrationError;
use orchestrator::RequestDescription;
use std::time::Duration;

#[tokio::test]
async fn test_stream_delivers_chunks_and_remembers() {
    let backends = vec![ScriptedBackend::new("a").with_stream_chunks(["Hel", "lo"])];
    let orchestrator = common::build(common::config(&["a"]), &backends);
    let session = orchestrator.remember(testing::unique_session());

    let mut chunks = Vec::new();
    let mut sink = |chunk: &str| chunks.push(chunk.to_string());
    let outcome = orchestrator
        .stream(session.prompt("greet me"), &mut sink)
        .await
        .unwrap();

    assert_eq!(chunks, vec!["Hel", "lo"]);
    assert_eq!(outcome.text(), "Hello");
    let history = session.history().await.unwrap();
    assert_eq!(history[1].content, "Hello");
    assert_eq!(backends[0].calls_to("stream_chat"), 1);
}

#[tokio::test]
async fn test_stream_falls_back_and_aggregates() {
    let (orchestrator, backends) = common::harness(&["a", "b", "c"]);
    backends[0].set_default(ScriptedOutcome::fail("unauthorized"));
    backends[1].set_default(ScriptedOutcome::fail("rate limited"));
    backends[2].set_default(ScriptedOutcome::fail("overloaded"));

    let mut sink = |_: &str| {};
    let err = orchestrator
        .stream(
            RequestDescription::prompt("hi").using("a").fallbacks(["b", "c"]),
            &mut sink
        )
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "All backends failed: a: unauthorized; b: rate limited; c: overloaded"
    );

    backends[2].set_default(ScriptedOutcome::text("fine"));
    let outcome = orchestrator
        .stream(
            RequestDescription::prompt("hi").using("a").fallbacks(["b", "c"]),
            &mut sink
        )
        .await
        .unwrap();
    assert_eq!(outcome.backend, "c");
    assert_eq!(outcome.attempts.len(), 3);
}

#[tokio::test]
async fn test_stream_bypasses_cache() {
    let (orchestrator, backends) = common::harness(&["a"]);
    let mut sink = |_: &str| {};

    for _ in 0..2 {
        orchestrator
            .stream(
                RequestDescription::prompt("hi").cache(Duration::from_secs(60)),
                &mut sink
            )
            .await
            .unwrap();
    }
    assert_eq!(backends[0].calls_to("stream_chat"), 2);
    assert_eq!(orchestrator.cache_stats().await.unwrap().cache_stores, 0);
}

#[tokio::test]
async fn test_non_text_kinds_cannot_stream() {
    let (orchestrator, _) = common::harness(&["a"]);
    let mut sink = |_: &str| {};
    let err = orchestrator
        .stream(RequestDescription::speak("hello"), &mut sink)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::InvalidRequest { .. }));
}
