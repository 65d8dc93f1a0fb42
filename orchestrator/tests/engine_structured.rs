mod common;

use adapters::ScriptedOutcome;
use errors::{OrchestrationError, StructuredOutputError};
use orch_core::{ChatTurn, ExpectedSchema};
use orchestrator::RequestDescription;
use serde_json::json;

fn person() -> ExpectedSchema {
    ExpectedSchema::new()
        .field("name", "required|string")
        .field("age", "integer")
}

#[tokio::test]
async fn test_schema_instruction_and_extraction() {
    let (orchestrator, backends) = common::harness(&["a"]);
    backends[0].push(ScriptedOutcome::text(
        "Here you go: {\"name\": \"Ada\", \"age\": 36} Hope that helps."
    ));

    let outcome = orchestrator
        .execute(RequestDescription::prompt("Describe Ada Lovelace").expect(person()))
        .await
        .unwrap();

    assert_eq!(outcome.structured(), json!({"name": "Ada", "age": 36}));
    let sent = backends[0].last_call().unwrap().prompt.unwrap();
    assert!(sent.starts_with("Describe Ada Lovelace\n\nPlease respond with valid JSON matching this schema: "));
}

#[tokio::test]
async fn test_optional_field_may_be_absent() {
    let (orchestrator, backends) = common::harness(&["a"]);
    backends[0].push(ScriptedOutcome::text(r#"{"name": "Ada"}"#));

    let outcome = orchestrator
        .execute(RequestDescription::prompt("Describe Ada").expect(person()))
        .await
        .unwrap();
    assert_eq!(outcome.structured(), json!({"name": "Ada"}));
}

#[tokio::test]
async fn test_type_mismatch_fails_without_fallback() {
    let (orchestrator, backends) = common::harness(&["a", "b"]);
    backends[0].push(ScriptedOutcome::text(r#"{"name": 5}"#));

    let err = orchestrator
        .execute(
            RequestDescription::prompt("Describe Ada")
                .using("a")
                .fallback("b")
                .expect(person())
        )
        .await
        .unwrap_err();

    match err {
        OrchestrationError::StructuredOutput { backend, source } => {
            assert_eq!(backend, "a");
            assert_eq!(
                source,
                StructuredOutputError::TypeMismatch {
                    field: "name".to_string(),
                    expected: "string".to_string(),
                    actual: "integer".to_string()
                }
            );
        }
        other => panic!("unexpected error: {other}")
    }
    assert_eq!(backends[1].call_count(), 0);
}

#[tokio::test]
async fn test_missing_required_field() {
    let (orchestrator, backends) = common::harness(&["a"]);
    backends[0].push(ScriptedOutcome::text(r#"{"age": 36}"#));

    let err = orchestrator
        .execute(RequestDescription::prompt("Describe Ada").expect(person()))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Missing required field: name"));
}

#[tokio::test]
async fn test_one_repair_with_correction_prompt() {
    let (orchestrator, backends) = common::harness(&["a"]);
    backends[0]
        .push(ScriptedOutcome::text("Ada was a mathematician."))
        .push(ScriptedOutcome::text(r#"{"name": "Ada"}"#));

    let outcome = orchestrator
        .execute(RequestDescription::prompt("Describe Ada").expect(person()))
        .await
        .unwrap();

    assert_eq!(outcome.structured(), json!({"name": "Ada"}));
    assert_eq!(backends[0].calls_to("complete"), 2);
    let repair = backends[0].last_call().unwrap().prompt.unwrap();
    assert!(repair.starts_with("The previous response was not valid JSON."));
    assert!(repair.ends_with("Original prompt: Describe Ada"));
}

#[tokio::test]
async fn test_second_unparseable_answer_is_unobtainable() {
    let (orchestrator, backends) = common::harness(&["a", "b"]);
    backends[0].set_default(ScriptedOutcome::text("still prose"));

    let err = orchestrator
        .execute(
            RequestDescription::prompt("Describe Ada")
                .fallback("b")
                .expect(person())
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        OrchestrationError::StructuredOutput {
            source: StructuredOutputError::Unobtainable { .. },
            ..
        }
    ));
    assert_eq!(backends[0].call_count(), 2);
    assert_eq!(backends[1].call_count(), 0);
}

#[tokio::test]
async fn test_chat_schema_targets_last_user_turn() {
    let (orchestrator, backends) = common::harness(&["a"]);
    backends[0].push(ScriptedOutcome::text(r#"{"name": "Ada"}"#));

    orchestrator
        .execute(
            RequestDescription::chat(vec![ChatTurn::system("Be precise."), ChatTurn::user("Who?")])
                .expect(person())
        )
        .await
        .unwrap();

    let turns = backends[0].last_call().unwrap().turns;
    assert_eq!(turns[0].content, "Be precise.");
    assert!(turns[1].content.starts_with("Who?\n\nPlease respond with valid JSON"));
}

#[tokio::test]
async fn test_repaired_results_are_not_cached() {
    let (orchestrator, backends) = common::harness(&["a"]);
    backends[0]
        .push(ScriptedOutcome::text("prose"))
        .push(ScriptedOutcome::text(r#"{"name": "Ada"}"#));

    let request = || {
        RequestDescription::prompt("Describe Ada")
            .expect(person())
            .cache(std::time::Duration::from_secs(60))
    };
    orchestrator.execute(request()).await.unwrap();
    assert_eq!(orchestrator.cache_stats().await.unwrap().cache_stores, 0);

    backends[0].push(ScriptedOutcome::text(r#"{"name": "Ada", "age": 36}"#));
    orchestrator.execute(request()).await.unwrap();
    let cached = orchestrator.execute(request()).await.unwrap();

    assert!(cached.cached);
    assert_eq!(cached.structured(), json!({"name": "Ada", "age": 36}));
}

#[tokio::test]
async fn test_memory_keeps_repaired_answer() {
    let (orchestrator, backends) = common::harness(&["a"]);
    let session = orchestrator.remember(testing::unique_session());
    backends[0]
        .push(ScriptedOutcome::text("Ada was a mathematician."))
        .push(ScriptedOutcome::text(r#"{"name": "Ada"}"#));

    orchestrator
        .execute(session.prompt("Describe Ada").expect(person()))
        .await
        .unwrap();

    let history = session.history().await.unwrap();
    let contents: Vec<_> = history.iter().map(|t| t.content.as_str()).collect();
    assert_eq!(contents, vec!["Describe Ada", r#"{"name": "Ada"}"#]);
}
