//! Structured output: JSON extraction, repair prompt and schema validation.

use errors::StructuredOutputError;
use orch_core::{ExpectedSchema, FieldType};
use serde_json::{Map, Value};

pub type JsonObject = Map<String, Value>;

/// Every balanced `{...}` span as `(start, end)` byte offsets, ordered by
/// start so enclosing objects come before the ones nested inside them.
///
/// One pass with a stack of open-brace offsets. Quotes only open a string
/// while a brace is open, so stray quotes in surrounding prose are ignored.
fn balanced_spans(content: &str) -> Vec<(usize, usize)> {
    let mut open: Vec<usize> = Vec::new();
    let mut spans = Vec::new();
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in content.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' if !open.is_empty() => in_string = true,
            '{' => open.push(offset),
            '}' => {
                if let Some(start) = open.pop() {
                    spans.push((start, offset + ch.len_utf8()));
                }
            }
            _ => {}
        }
    }
    spans.sort_unstable_by_key(|(start, _)| *start);
    spans
}

/// Pull a JSON object out of free-form model output.
///
/// Tries each balanced `{...}` span left to right, so the outermost object
/// wins over the ones nested inside it, then the whole content.
pub fn extract_object(content: &str) -> Option<JsonObject> {
    for (start, end) in balanced_spans(content) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(&content[start..end]) {
            return Some(map);
        }
    }
    match serde_json::from_str::<Value>(content.trim()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None
    }
}

/// Instruction appended to prompts that expect a schema.
pub fn schema_instruction(schema: &ExpectedSchema) -> String {
    format!(
        "\n\nPlease respond with valid JSON matching this schema: {}",
        schema.to_json()
    )
}

/// Prompt for the single repair attempt after unparseable output.
pub fn correction_prompt(schema: &ExpectedSchema, original_input: &str) -> String {
    format!(
        "The previous response was not valid JSON. Please provide a valid JSON response matching this exact schema: {}\n\nOriginal prompt: {}",
        schema.to_json(),
        original_input
    )
}

/// Observed JSON type, as reported in mismatch errors.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "float",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object"
    }
}

fn matches_type(value: &Value, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String => value.is_string(),
        FieldType::Array => value.is_array() || value.is_object(),
        FieldType::Numeric => match value {
            Value::Number(_) => true,
            Value::String(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
            _ => false
        },
        FieldType::Integer => value.is_i64() || value.is_u64(),
        FieldType::Any => true
    }
}

/// Check presence and type of every declared field.
///
/// Presence is enforced only for `required` fields; type is enforced for every
/// field that is present. `null` counts as absent.
pub fn validate(data: &JsonObject, schema: &ExpectedSchema) -> Result<(), StructuredOutputError> {
    for (field, constraint) in schema.fields() {
        let value = data.get(field).filter(|v| !v.is_null());
        let Some(value) = value else {
            if constraint.required {
                return Err(StructuredOutputError::MissingField {
                    field: field.to_string()
                });
            }
            continue;
        };
        if !matches_type(value, constraint.field_type) {
            return Err(StructuredOutputError::TypeMismatch {
                field: field.to_string(),
                expected: constraint.field_type.as_str().to_string(),
                actual: json_type_name(value).to_string()
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn schema() -> ExpectedSchema {
        ExpectedSchema::new()
            .field("name", "required|string")
            .field("age", "integer")
    }

    fn object(value: Value) -> JsonObject {
        match value {
            Value::Object(map) => map,
            _ => unreachable!()
        }
    }

    #[test]
    fn test_extracts_from_prose_and_fences() {
        let text = "Sure! Here it is:\n```json\n{\"name\": \"Ada\", \"meta\": {\"tags\": [\"x\"]}}\n```\nAnything else?";
        let data = extract_object(text).unwrap();
        assert_eq!(data["name"], "Ada");
        assert_eq!(data["meta"]["tags"][0], "x");
    }

    #[test]
    fn test_braces_inside_strings_are_ignored() {
        let data = extract_object(r#"Result: {"note": "use } carefully", "n": 1}"#).unwrap();
        assert_eq!(data["note"], "use } carefully");
    }

    #[test]
    fn test_skips_unparseable_span() {
        let data = extract_object(r#"{not json} then {"ok": true}"#).unwrap();
        assert_eq!(data["ok"], true);
    }

    #[test]
    fn test_unbalanced_braces_scan_in_linear_time() {
        let started = std::time::Instant::now();
        assert!(extract_object(&"{".repeat(50_000)).is_none());

        let truncated = format!("{}{{\"ok\": true}}", "{\"a\": ".repeat(25_000));
        let data = extract_object(&truncated).unwrap();
        assert_eq!(data["ok"], true);
        assert!(started.elapsed() < std::time::Duration::from_secs(2));
    }

    #[test]
    fn test_outermost_object_wins() {
        let data = extract_object(r#"Answer: {"outer": {"inner": 1}} and {"later": 2}"#).unwrap();
        assert_eq!(data["outer"]["inner"], 1);
        assert!(!data.contains_key("later"));
    }

    #[test]
    fn test_quotes_in_prose_do_not_hide_object() {
        let data = extract_object(r#"A 5" screen, see {"size": 5}"#).unwrap();
        assert_eq!(data["size"], 5);
    }

    #[test]
    fn test_no_object_found() {
        assert!(extract_object("I cannot help with that.").is_none());
        assert!(extract_object("[1, 2, 3]").is_none());
    }

    #[test]
    fn test_optional_absent_field_passes() {
        assert!(validate(&object(json!({"name": "Ada"})), &schema()).is_ok());
    }

    #[test]
    fn test_wrong_type_names_field_and_types() {
        let err = validate(&object(json!({"name": 5})), &schema()).unwrap_err();
        assert_eq!(
            err,
            StructuredOutputError::TypeMismatch {
                field: "name".to_string(),
                expected: "string".to_string(),
                actual: "integer".to_string()
            }
        );
    }

    #[test]
    fn test_null_counts_as_absent() {
        let err = validate(&object(json!({"name": null})), &schema()).unwrap_err();
        assert_eq!(
            err,
            StructuredOutputError::MissingField {
                field: "name".to_string()
            }
        );
        assert!(validate(&object(json!({"name": "Ada", "age": null})), &schema()).is_ok());
    }

    #[test]
    fn test_optional_present_field_is_type_checked() {
        let err = validate(&object(json!({"name": "Ada", "age": "41"})), &schema()).unwrap_err();
        assert!(matches!(err, StructuredOutputError::TypeMismatch { ref field, .. } if field == "age"));
    }

    #[test]
    fn test_numeric_and_array_rules() {
        let schema = ExpectedSchema::new()
            .field("score", "numeric")
            .field("tags", "array");
        assert!(validate(&object(json!({"score": "3.5", "tags": ["a"]})), &schema).is_ok());
        assert!(validate(&object(json!({"score": 2, "tags": {"a": 1}})), &schema).is_ok());
        assert!(validate(&object(json!({"score": "high"})), &schema).is_err());
        assert!(validate(&object(json!({"tags": "a,b"})), &schema).is_err());
    }

    #[test]
    fn test_integer_rejects_float() {
        let schema = ExpectedSchema::new().field("n", "integer");
        let err = validate(&object(json!({"n": 1.5})), &schema).unwrap_err();
        assert!(matches!(err, StructuredOutputError::TypeMismatch { ref actual, .. } if actual == "float"));
    }

    #[test]
    fn test_prompts_embed_schema() {
        let schema = ExpectedSchema::new().field("name", "required|string");
        assert_eq!(
            schema_instruction(&schema),
            "\n\nPlease respond with valid JSON matching this schema: {\"name\":\"required|string\"}"
        );
        assert!(correction_prompt(&schema, "Describe Ada").ends_with("Original prompt: Describe Ada"));
    }

    proptest! {
        #[test]
        fn prop_embedded_object_is_recovered(prefix in "[a-zA-Z ,.!]{0,40}", suffix in "[a-zA-Z ,.!]{0,40}", n in any::<i64>(), s in "[a-z]{0,12}") {
            let inner = json!({"n": n, "nested": {"s": s}});
            let text = format!("{prefix}{inner}{suffix}");
            let data = extract_object(&text).unwrap();
            prop_assert_eq!(Value::Object(data), inner);
        }
    }
}
