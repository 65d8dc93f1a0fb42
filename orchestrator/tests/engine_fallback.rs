mod common;

use adapters::{ScriptedBackend, ScriptedOutcome};
use errors::OrchestrationError;
use orch_core::{AttemptOutcome, EmbeddingInput};
use orchestrator::{CancellationToken, RequestDescription};
use proptest::prelude::*;
use std::time::Duration;

#[tokio::test]
async fn test_primary_success_never_touches_fallbacks() {
    let (orchestrator, backends) = common::harness(&["a", "b", "c"]);

    let outcome = orchestrator
        .execute(RequestDescription::prompt("hi").using("a").fallbacks(["b", "c"]))
        .await
        .unwrap();

    assert_eq!(outcome.backend, "a");
    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(backends[1].call_count(), 0);
    assert_eq!(backends[2].call_count(), 0);
}

#[tokio::test]
async fn test_failed_attempts_precede_the_success() {
    let (orchestrator, backends) = common::harness(&["a", "b", "c"]);
    backends[0].set_default(ScriptedOutcome::fail("unauthorized"));
    backends[1].set_default(ScriptedOutcome::fail("rate limited"));

    let outcome = orchestrator
        .execute(RequestDescription::prompt("hi").using("a").fallbacks(["b", "c"]))
        .await
        .unwrap();

    let history: Vec<(&str, AttemptOutcome)> = outcome
        .attempts
        .iter()
        .map(|a| (a.backend.as_str(), a.outcome))
        .collect();
    assert_eq!(
        history,
        vec![
            ("a", AttemptOutcome::Failure),
            ("b", AttemptOutcome::Failure),
            ("c", AttemptOutcome::Success),
        ]
    );
    assert_eq!(outcome.attempts[0].error.as_deref(), Some("unauthorized"));
    assert_eq!(outcome.failed_attempts(), 2);
}

#[tokio::test]
async fn test_exhaustion_lists_failures_in_order() {
    let (orchestrator, backends) = common::harness(&["A", "B"]);
    backends[0].set_default(ScriptedOutcome::fail("unauthorized"));
    backends[1].set_default(ScriptedOutcome::fail("rate limited"));

    let err = orchestrator
        .execute(RequestDescription::prompt("hi").using("A").fallback("B"))
        .await
        .unwrap_err();

    let message = err.to_string();
    let a = message.find("A: unauthorized").unwrap();
    let b = message.find("B: rate limited").unwrap();
    assert!(a < b);
    assert_eq!(err.failures().len(), 2);
}

#[tokio::test]
async fn test_each_backend_tried_at_most_once() {
    let (orchestrator, backends) = common::harness(&["a", "b"]);
    backends[0].set_default(ScriptedOutcome::fail("down"));
    backends[1].set_default(ScriptedOutcome::fail("down"));

    let _ = orchestrator
        .execute(RequestDescription::prompt("hi").using("a").fallbacks(["b", "a", "b"]))
        .await;

    assert_eq!(backends[0].call_count(), 1);
    assert_eq!(backends[1].call_count(), 1);
}

#[tokio::test]
async fn test_unknown_backend_is_recorded_and_skipped() {
    let (orchestrator, backends) = common::harness(&["a"]);

    let outcome = orchestrator
        .execute(RequestDescription::prompt("hi").using("ghost").fallback("a"))
        .await
        .unwrap();

    assert_eq!(outcome.attempts.len(), 2);
    assert_eq!(
        outcome.attempts[0].error.as_deref(),
        Some("Backend 'ghost' is not configured")
    );
    assert_eq!(backends[0].call_count(), 1);
}

#[tokio::test]
async fn test_configured_fallbacks_apply_when_request_has_none() {
    let backends = vec![ScriptedBackend::failing("a", "down"), ScriptedBackend::new("b")];
    let config = common::config(&["a", "b"]).with_fallbacks(["b"]);
    let orchestrator = common::build(config, &backends);

    let outcome = orchestrator
        .execute(RequestDescription::prompt("hi"))
        .await
        .unwrap();
    assert_eq!(outcome.backend, "b");
}

#[tokio::test]
async fn test_empty_sequence_is_distinct_error() {
    let backends = vec![ScriptedBackend::new("a")];
    let config = common::config(&["a"]).with_default_backend("");
    let orchestrator = common::build(config, &backends);

    let err = orchestrator
        .execute(RequestDescription::prompt("hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::NoBackendsAttempted));
}

#[tokio::test]
async fn test_unsupported_operation_falls_back() {
    let (orchestrator, backends) = common::harness(&["text-only", "full"]);
    backends[0].set_default(ScriptedOutcome::Unsupported);

    let outcome = orchestrator
        .execute(
            RequestDescription::embed(EmbeddingInput::Batch(vec!["a".into(), "b".into()]))
                .using("text-only")
                .fallback("full")
        )
        .await
        .unwrap();

    assert_eq!(outcome.backend, "full");
    assert!(
        outcome.attempts[0]
            .error
            .as_deref()
            .unwrap()
            .contains("unsupported by this backend")
    );
    assert_eq!(backends[1].calls_to("embed_text"), 1);
}

#[tokio::test]
async fn test_kind_dispatches_matching_operation() {
    let (orchestrator, backends) = common::harness(&["a"]);

    orchestrator.execute(RequestDescription::image("a cat")).await.unwrap();
    orchestrator.execute(RequestDescription::speak("hello")).await.unwrap();
    orchestrator
        .execute(RequestDescription::transcribe("/tmp/clip.mp3"))
        .await
        .unwrap();

    assert_eq!(backends[0].calls_to("generate_image"), 1);
    assert_eq!(backends[0].calls_to("text_to_speech"), 1);
    assert_eq!(backends[0].calls_to("transcribe_audio"), 1);
}

#[tokio::test]
async fn test_model_override_reaches_backend() {
    let (orchestrator, backends) = common::harness(&["a"]);

    let outcome = orchestrator
        .execute(RequestDescription::prompt("hi").using("a:big-model"))
        .await
        .unwrap();

    assert_eq!(outcome.backend, "a:big-model");
    assert_eq!(outcome.model, "big-model");
    assert_eq!(backends[0].last_call().unwrap().model, "big-model");
}

#[tokio::test]
async fn test_cancellation_stops_the_sequence() {
    let slow = ScriptedBackend::new("slow").with_latency(Duration::from_secs(30));
    let next = ScriptedBackend::new("next");
    let orchestrator = common::build(common::config(&["slow", "next"]), &[slow, next.clone()]);

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        trigger.cancel();
    });

    let err = orchestrator
        .execute_with_cancel(RequestDescription::prompt("hi").fallback("next"), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, OrchestrationError::Cancelled { attempts: 1 }));
    assert_eq!(next.call_count(), 0);
}

#[tokio::test]
async fn test_already_cancelled_makes_no_calls() {
    let (orchestrator, backends) = common::harness(&["a"]);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = orchestrator
        .execute_with_cancel(RequestDescription::prompt("hi"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, OrchestrationError::Cancelled { attempts: 0 }));
    assert_eq!(backends[0].call_count(), 0);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_first_success_ends_sequence(failing in 0usize..4, extra in 0usize..3) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let names: Vec<String> = (0..failing + 1 + extra).map(|i| format!("b{i}")).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let (orchestrator, backends) = common::harness(&refs);
        for backend in backends.iter().take(failing) {
            backend.set_default(ScriptedOutcome::fail("down"));
        }

        let request = RequestDescription::prompt("hi")
            .using(refs[0])
            .fallbacks(refs[1..].iter().copied());
        let outcome = runtime.block_on(orchestrator.execute(request)).unwrap();

        prop_assert_eq!(outcome.attempts.len(), failing + 1);
        prop_assert!(outcome.attempts[..failing].iter().all(|a| !a.is_success()));
        prop_assert!(outcome.attempts[failing].is_success());
        for backend in &backends[failing + 1..] {
            prop_assert_eq!(backend.call_count(), 0);
        }
    }
}
