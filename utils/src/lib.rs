//! # Orchestrator Utilities
//!
//! Common helpers for request fingerprinting, prompt templates, and
//! id generation.
//!
//! # Best Practices
//!
//! - Uses SHA-2 for fingerprints, never a fast non-cryptographic hash, since
//!   fingerprints double as shared cache keys
//! - Canonicalizes JSON before hashing so map ordering never changes a key

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Number of hex characters of the digest kept in a fingerprint.
pub const FINGERPRINT_HASH_LEN: usize = 32;

/// Serialize a JSON value with object keys sorted at every depth.
#[must_use]
pub fn canonical_json(value: &Value) -> String {
    fn sort(value: &Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<&String, Value> =
                    map.iter().map(|(k, v)| (k, sort(v))).collect();
                let mut out = serde_json::Map::new();
                for (k, v) in sorted {
                    out.insert(k.clone(), v);
                }
                Value::Object(out)
            }
            Value::Array(items) => Value::Array(items.iter().map(sort).collect()),
            other => other.clone()
        }
    }

    sort(value).to_string()
}

/// Deterministic cache fingerprint of `(backend, payload, options)`.
///
/// The backend name is kept readable in the key (`ai:{backend}:{digest}`) so
/// entries can be attributed without decoding them.
///
/// ```
/// use serde_json::json;
/// use utils::request_fingerprint;
///
/// let a = request_fingerprint("openai", &json!("hi"), &json!({"temperature": 0.2})).unwrap();
/// let b = request_fingerprint("openai", &json!("hi"), &json!({"temperature": 0.9})).unwrap();
/// assert!(a.starts_with("ai:openai:"));
/// assert_ne!(a, b);
/// ```
pub fn request_fingerprint<P, O>(
    backend: &str,
    payload: &P,
    options: &O
) -> Result<String, serde_json::Error>
where
    P: Serialize + ?Sized,
    O: Serialize + ?Sized
{
    let payload = canonical_json(&serde_json::to_value(payload)?);
    let options = canonical_json(&serde_json::to_value(options)?);

    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    hasher.update([0x1f]);
    hasher.update(options.as_bytes());
    let digest = hex::encode(hasher.finalize());

    Ok(format!("ai:{}:{}", backend, &digest[..FINGERPRINT_HASH_LEN]))
}

/// Replace `{key}` placeholders with variable values.
///
/// Strings are inserted verbatim, every other JSON value is inserted in its
/// JSON encoding. Unknown placeholders are left untouched.
#[must_use]
pub fn render_template(template: &str, variables: &BTreeMap<String, Value>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        let replacement = match value {
            Value::String(s) => s.clone(),
            other => other.to_string()
        };
        rendered = rendered.replace(&format!("{{{}}}", key), &replacement);
    }
    rendered
}

/// Shorten text for log lines and audit summaries on a char boundary.
#[must_use]
pub fn truncate_for_log(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

/// Generate UUID v4 string
#[must_use]
pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_generate_uuid_uniqueness() {
        let uuid1 = generate_uuid();
        let uuid2 = generate_uuid();
        assert_ne!(uuid1, uuid2);
    }

    #[test]
    fn test_fingerprint_ignores_key_order() {
        let mut first = serde_json::Map::new();
        first.insert("temperature".to_string(), json!(0.2));
        first.insert("voice".to_string(), json!("alloy"));

        let mut second = serde_json::Map::new();
        second.insert("voice".to_string(), json!("alloy"));
        second.insert("temperature".to_string(), json!(0.2));

        let a = request_fingerprint("openai", "hello", &first).unwrap();
        let b = request_fingerprint("openai", "hello", &second).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_fingerprint_separates_backends() {
        let options = json!({});
        let a = request_fingerprint("openai", "hello", &options).unwrap();
        let b = request_fingerprint("openai:gpt-4", "hello", &options).unwrap();
        assert_ne!(a, b);
        assert!(b.starts_with("ai:openai:gpt-4:"));
    }

    #[test]
    fn test_render_template_substitutes_values() {
        let mut vars = BTreeMap::new();
        vars.insert("name".to_string(), json!("Ada"));
        vars.insert("tags".to_string(), json!(["math", "engines"]));

        let rendered = render_template("Hello {name}, topics: {tags} {missing}", &vars);
        assert_eq!(
            rendered,
            "Hello Ada, topics: [\"math\",\"engines\"] {missing}"
        );
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        assert_eq!(truncate_for_log("héllo wörld", 5), "héllo...");
        assert_eq!(truncate_for_log("short", 10), "short");
    }

    proptest! {
        #[test]
        fn prop_fingerprint_is_deterministic(prompt in ".{0,64}", temp in 0u32..100) {
            let options = json!({ "temperature": temp });
            let a = request_fingerprint("openai", &prompt, &options).unwrap();
            let b = request_fingerprint("openai", &prompt, &options).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn prop_fingerprint_differs_when_options_differ(prompt in ".{0,64}", a in 0u32..100, b in 0u32..100) {
            prop_assume!(a != b);
            let left = request_fingerprint("openai", &prompt, &json!({ "temperature": a })).unwrap();
            let right = request_fingerprint("openai", &prompt, &json!({ "temperature": b })).unwrap();
            prop_assert_ne!(left, right);
        }
    }
}
