//! Read-only diagnostics for a stored key.
//!
//! Used to spot values written with an extra layer of JSON encoding, which
//! otherwise surface as cache "hits" that no reader can use.

use serde::Serialize;
use serde_json::Value;

/// Maximum characters of the stored value shown in a preview.
pub const PREVIEW_CHARS: usize = 200;

/// Maximum encoding layers peeled while looking for nested JSON.
const MAX_LAYERS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheInspection {
    pub key: String,
    pub exists: bool,
    /// JSON type of the value as read: "object", "array", "string", ...
    pub value_type: String,
    /// Characters in the serialized value.
    pub length: usize,
    pub preview: String,
    /// The value is a string whose text itself parses as JSON.
    pub looks_like_json: bool,
    /// Extra layers of JSON string encoding wrapped around the payload.
    pub nested_encodings: usize,
}

impl CacheInspection {
    pub fn is_double_encoded(&self) -> bool {
        self.nested_encodings > 0
    }
}

/// Whether text plausibly holds a JSON object or array.
pub fn looks_like_json(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

fn value_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Count how many times a string value decodes into further JSON.
fn count_layers(value: &Value) -> usize {
    let mut layers = 0;
    let mut current = value.clone();
    while layers < MAX_LAYERS {
        let Value::String(text) = &current else { break };
        let trimmed = text.trim();
        if !(looks_like_json(trimmed) || trimmed.starts_with('"')) {
            break;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(inner) => {
                layers += 1;
                current = inner;
            }
            Err(_) => break,
        }
    }
    layers
}

pub(crate) fn describe(key: &str, raw: Option<&Value>) -> CacheInspection {
    let Some(value) = raw else {
        return CacheInspection {
            key: key.to_string(),
            exists: false,
            value_type: "none".into(),
            length: 0,
            preview: String::new(),
            looks_like_json: false,
            nested_encodings: 0,
        };
    };

    let text = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    CacheInspection {
        key: key.to_string(),
        exists: true,
        value_type: value_type(value).into(),
        length: text.chars().count(),
        preview: text.chars().take(PREVIEW_CHARS).collect(),
        looks_like_json: matches!(value, Value::String(s) if looks_like_json(s)),
        nested_encodings: count_layers(value),
    }
}
