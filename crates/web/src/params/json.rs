use serde_json::{Map, Value};
use tracing::debug;

/// Reads `body` as a flat JSON object.
///
/// String values are taken as-is and numbers and booleans as their JSON text.
/// `null`, arrays and nested objects are skipped. Anything that is not a JSON
/// object yields no pairs.
pub(crate) fn flat_pairs(body: &[u8]) -> Vec<(String, String)> {
    if body.trim_ascii().is_empty() {
        return Vec::new();
    }

    match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(object) => object.into_iter().filter_map(|(key, value)| scalar_text(value).map(|text| (key, text))).collect(),
        Err(e) => {
            debug!(cause = %e, "request body is not a json object, ignored for parameters");
            Vec::new()
        }
    }
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Parses `body` as a JSON tree and adds every `extra` key it lacks at the top
/// level, as a string.
///
/// An empty or unparsable body starts from an empty object. A valid body that
/// is not an object is returned untouched.
pub(crate) fn with_extra_keys<'a>(body: &[u8], extra: impl IntoIterator<Item = (&'a String, &'a String)>) -> Value {
    let mut tree = if body.trim_ascii().is_empty() {
        Value::Object(Map::new())
    } else {
        serde_json::from_slice(body).unwrap_or_else(|e| {
            debug!(cause = %e, "request body is not json, starting from an empty object");
            Value::Object(Map::new())
        })
    };

    if let Value::Object(object) = &mut tree {
        for (key, value) in extra {
            object.entry(key.as_str()).or_insert_with(|| Value::String(value.clone()));
        }
    }

    tree
}
