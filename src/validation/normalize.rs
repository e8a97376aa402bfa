//! Shorthand schema expansion.
//!
//! Routes may declare `{ "answer": { "type": "number" } }` instead of the
//! fully-qualified object schema. Schemas built from composition or reference
//! keywords are never rewritten.

use serde_json::{Map, Value, json};

/// Keywords that mark a schema as already well-formed at the top level.
const COMPOSITION_KEYWORDS: &[&str] = &["$ref", "oneOf", "allOf", "anyOf", "$merge", "$patch"];

/// Expand a shorthand property map into an object schema.
///
/// - Schemas carrying any of `$ref`, `oneOf`, `allOf`, `anyOf`, `$merge` or
///   `$patch` are returned as-is.
/// - Schemas with neither `type` nor `properties` are wrapped as
///   `{ "type": "object", "properties": <schema> }`.
/// - Everything else (including non-object schemas such as `true`) is
///   returned unchanged.
pub fn normalize(schema: &Value) -> Value {
    match schema {
        Value::Object(map) if is_shorthand(map) => json!({
            "type": "object",
            "properties": schema,
        }),
        _ => schema.clone(),
    }
}

fn is_shorthand(map: &Map<String, Value>) -> bool {
    if COMPOSITION_KEYWORDS.iter().any(|k| map.contains_key(*k)) {
        return false;
    }
    !map.contains_key("type") && !map.contains_key("properties")
}
