//! Parses and validates one raw model turn: duplicate-key-rejecting JSON
//! decoding, the top-level `{emotions, thoughts, function_call}` shape check,
//! and the `emotions`/`thoughts` field validators.
//!
//! Ported from `original_source/llm_os/agent.py`'s `dict_raise_on_duplicates`
//! (used as `json5.loads`'s `object_pairs_hook`, so every nesting level is
//! checked, not just the top) and `Agent.step`/`__handle_emotions`/
//! `__handle_thoughts`.

use std::collections::HashSet;
use std::fmt;

use memos_core::{AgentInterface, ProtocolError};
use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde_json::Value;

/// A `serde_json::Value` decoded through a pass that rejects any object with
/// a repeated key at any nesting depth, the Rust equivalent of
/// `dict_raise_on_duplicates` being invoked once per dict literal `json5`
/// encounters while parsing (`serde_json::Map` would otherwise silently keep
/// only the last occurrence of a repeated key).
struct Checked(Value);

impl<'de> Deserialize<'de> for Checked {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CheckedVisitor;

        impl<'de> Visitor<'de> for CheckedVisitor {
            type Value = Checked;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("any valid JSON value")
            }

            fn visit_bool<E>(self, v: bool) -> Result<Self::Value, E> {
                Ok(Checked(Value::Bool(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E> {
                Ok(Checked(Value::from(v)))
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E> {
                Ok(Checked(Value::from(v)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E> {
                Ok(Checked(Value::from(v)))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E> {
                Ok(Checked(Value::String(v.to_string())))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E> {
                Ok(Checked(Value::String(v)))
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E> {
                Ok(Checked(Value::Null))
            }

            fn visit_none<E>(self) -> Result<Self::Value, E> {
                Ok(Checked(Value::Null))
            }

            fn visit_some<D>(self, deserializer: D) -> Result<Self::Value, D::Error>
            where
                D: Deserializer<'de>,
            {
                Deserialize::deserialize(deserializer)
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let mut items = Vec::new();
                while let Some(Checked(item)) = seq.next_element()? {
                    items.push(item);
                }
                Ok(Checked(Value::Array(items)))
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut seen = HashSet::new();
                let mut object = serde_json::Map::new();
                while let Some(key) = map.next_key::<String>()? {
                    if !seen.insert(key.clone()) {
                        return Err(de::Error::custom(format!("duplicate key: {key}")));
                    }
                    let Checked(value) = map.next_value()?;
                    object.insert(key, value);
                }
                Ok(Checked(Value::Object(object)))
            }
        }

        deserializer.deserialize_any(CheckedVisitor)
    }
}

/// Decodes `text` as JSON, failing with [`ProtocolError::DuplicateKey`] if
/// any object (at any depth) repeats a key, or [`ProtocolError::InvalidJson`]
/// for any other parse failure.
pub fn parse_rejecting_duplicates(text: &str) -> Result<Value, ProtocolError> {
    match serde_json::from_str::<Checked>(text) {
        Ok(Checked(value)) => Ok(value),
        Err(err) => {
            let message = err.to_string();
            match message.strip_prefix("duplicate key: ") {
                Some(rest) => {
                    let key = rest.split(" at ").next().unwrap_or(rest).trim().to_string();
                    Err(ProtocolError::DuplicateKey(key))
                }
                None => Err(ProtocolError::InvalidJson(message)),
            }
        }
    }
}

/// The three required top-level fields once validated present.
pub struct ParsedResponse {
    pub emotions: Value,
    pub thoughts: Value,
    pub function_call: Value,
}

pub enum TopLevelOutcome {
    Ok(ParsedResponse),
    UnexpectedKeys(Vec<String>),
    MissingRequired(Vec<String>),
}

const KNOWN_TOP_LEVEL_KEYS: [&str; 3] = ["emotions", "thoughts", "function_call"];

/// Checks `value` is a JSON object whose only keys are `emotions`,
/// `thoughts`, `function_call`, all present and non-null. Mirrors
/// `Agent.step`'s `unidentified_keys` / truthiness check, including its
/// ordering: unexpected keys are reported even when a required field is also
/// missing, never both at once.
pub fn validate_top_level(value: &Value) -> Result<TopLevelOutcome, ProtocolError> {
    let obj = value
        .as_object()
        .ok_or_else(|| ProtocolError::InvalidJson("top-level value is not a JSON object".to_string()))?;

    let unexpected: Vec<String> = obj
        .keys()
        .filter(|k| !KNOWN_TOP_LEVEL_KEYS.contains(&k.as_str()))
        .cloned()
        .collect();

    let emotions = obj.get("emotions").filter(|v| !v.is_null());
    let thoughts = obj.get("thoughts").filter(|v| !v.is_null());
    let function_call = obj.get("function_call").filter(|v| !v.is_null());

    if unexpected.is_empty() {
        if let (Some(emotions), Some(thoughts), Some(function_call)) = (emotions, thoughts, function_call) {
            return Ok(TopLevelOutcome::Ok(ParsedResponse {
                emotions: emotions.clone(),
                thoughts: thoughts.clone(),
                function_call: function_call.clone(),
            }));
        }
    }

    if !unexpected.is_empty() {
        return Ok(TopLevelOutcome::UnexpectedKeys(unexpected));
    }

    let missing: Vec<String> = [
        ("emotions", emotions.is_some()),
        ("thoughts", thoughts.is_some()),
        ("function_call", function_call.is_some()),
    ]
    .into_iter()
    .filter(|(_, present)| !present)
    .map(|(key, _)| key.to_string())
    .collect();

    Ok(TopLevelOutcome::MissingRequired(missing))
}

const EMOTION_SHAPE_ERROR: &str = "All items in your generated object's 'emotions' field must be tuples containing type of emotion (str) and its intensity (float between 1 and 10 inclusive).";

/// Validates and pushes `emotions` to the interface one entry at a time,
/// matching `__handle_emotions`'s three-pass shape/type/range check — every
/// item must fully validate before any is pushed.
pub fn validate_emotions(emotions: &Value, interface: &dyn AgentInterface) -> Result<(), String> {
    let items = emotions
        .as_array()
        .ok_or("Failed to parse emotions: 'emotion' field's value is not a list.".to_string())?;

    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        let pair = item.as_array().filter(|p| p.len() == 2).ok_or_else(|| EMOTION_SHAPE_ERROR.to_string())?;
        let label = pair[0].as_str().ok_or_else(|| EMOTION_SHAPE_ERROR.to_string())?;
        let intensity = pair[1].as_f64().ok_or_else(|| EMOTION_SHAPE_ERROR.to_string())?;
        if !(1.0..=10.0).contains(&intensity) {
            return Err("Intensity of all emotions must be between 1 and 10 inclusive".to_string());
        }
        parsed.push((label.to_string(), intensity));
    }

    for (label, intensity) in &parsed {
        interface.inner_emotion(label, *intensity);
    }
    Ok(())
}

/// Validates and pushes `thoughts` to the interface, matching
/// `__handle_thoughts`.
pub fn validate_thoughts(thoughts: &Value, interface: &dyn AgentInterface) -> Result<(), String> {
    let items = thoughts
        .as_array()
        .ok_or("Failed to parse thoughts: 'thoughts' field's value is not a list.".to_string())?;

    let mut parsed = Vec::with_capacity(items.len());
    for item in items {
        let thought = item
            .as_str()
            .ok_or("All items in your generated object's 'thoughts' field must be strings.".to_string())?;
        parsed.push(thought.to_string());
    }

    for thought in &parsed {
        interface.internal_monologue(thought);
    }
    Ok(())
}

/// The JSON schema a `Structured` inference call pins the model's reply to:
/// `emotions` (an array of `[label, intensity]` pairs), `thoughts` (an array
/// of strings), and `function_call` (`{name, arguments: {..., request_heartbeat?}}`,
/// with `request_heartbeat` nested inside the arguments object rather than a
/// sibling of it — the dispatcher strips it back out before validating the
/// rest of `arguments`).
pub fn response_json_schema() -> Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "emotions": {
                "type": "array",
                "items": {
                    "type": "array",
                    "items": [
                        { "type": "string" },
                        { "type": "number", "minimum": 1, "maximum": 10 }
                    ],
                    "minItems": 2,
                    "maxItems": 2
                }
            },
            "thoughts": {
                "type": "array",
                "items": { "type": "string" }
            },
            "function_call": {
                "type": "object",
                "properties": {
                    "name": { "type": "string" },
                    "arguments": {
                        "type": "object",
                        "properties": {
                            (memos_config::REQUEST_HEARTBEAT_ARG): { "type": "boolean" }
                        }
                    }
                },
                "required": ["name", "arguments"]
            }
        },
        "required": ["emotions", "thoughts", "function_call"]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use memos_core::ServerMessage;

    struct RecordingInterface {
        events: std::sync::Mutex<Vec<ServerMessage>>,
    }
    impl AgentInterface for RecordingInterface {
        fn push(&self, message: ServerMessage) {
            self.events.lock().unwrap().push(message);
        }
    }

    #[test]
    fn parses_well_formed_json() {
        let value = parse_rejecting_duplicates(r#"{"a": 1, "b": [1, 2]}"#).unwrap();
        assert_eq!(value["a"], 1);
    }

    #[test]
    fn rejects_a_top_level_duplicate_key() {
        let err = parse_rejecting_duplicates(r#"{"a": 1, "a": 2}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateKey(ref k) if k == "a"));
    }

    #[test]
    fn rejects_a_nested_duplicate_key() {
        let err = parse_rejecting_duplicates(r#"{"function_call": {"name": "x", "name": "y"}}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::DuplicateKey(ref k) if k == "name"));
    }

    #[test]
    fn malformed_text_is_invalid_json() {
        let err = parse_rejecting_duplicates("not json at all").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidJson(_)));
    }

    #[test]
    fn validate_top_level_accepts_the_three_required_fields() {
        let value = serde_json::json!({"emotions": [], "thoughts": [], "function_call": {}});
        match validate_top_level(&value).unwrap() {
            TopLevelOutcome::Ok(_) => {}
            _ => panic!("expected Ok"),
        }
    }

    #[test]
    fn validate_top_level_reports_unexpected_keys_over_missing_ones() {
        let value = serde_json::json!({"emotions": [], "thoughts": [], "extra": 1});
        match validate_top_level(&value).unwrap() {
            TopLevelOutcome::UnexpectedKeys(keys) => assert_eq!(keys, vec!["extra".to_string()]),
            _ => panic!("expected UnexpectedKeys"),
        }
    }

    #[test]
    fn validate_top_level_reports_missing_required_when_no_unexpected_keys() {
        let value = serde_json::json!({"emotions": [], "thoughts": []});
        match validate_top_level(&value).unwrap() {
            TopLevelOutcome::MissingRequired(keys) => assert_eq!(keys, vec!["function_call".to_string()]),
            _ => panic!("expected MissingRequired"),
        }
    }

    #[test]
    fn validate_emotions_accepts_well_shaped_pairs_and_pushes_them() {
        let interface = RecordingInterface { events: std::sync::Mutex::new(Vec::new()) };
        let value = serde_json::json!([["curiosity", 5.0], ["calm", 2]]);
        validate_emotions(&value, &interface).unwrap();
        assert_eq!(interface.events.lock().unwrap().len(), 2);
    }

    #[test]
    fn validate_emotions_rejects_out_of_range_intensity() {
        let interface = RecordingInterface { events: std::sync::Mutex::new(Vec::new()) };
        let value = serde_json::json!([["curiosity", 11.0]]);
        let err = validate_emotions(&value, &interface).unwrap_err();
        assert_eq!(err, "Intensity of all emotions must be between 1 and 10 inclusive");
    }

    #[test]
    fn validate_thoughts_rejects_non_string_items() {
        let interface = RecordingInterface { events: std::sync::Mutex::new(Vec::new()) };
        let value = serde_json::json!([1, 2]);
        let err = validate_thoughts(&value, &interface).unwrap_err();
        assert!(err.contains("must be strings"));
    }
}
