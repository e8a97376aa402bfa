//! Payload preparation applied before schema evaluation.
//!
//! The `jsonschema` crate only reports violations, it never touches the
//! instance. Applying defaults, stripping undeclared properties and coercing
//! scalar types therefore happens here, in a single walk over the schema and
//! payload, before the compiled validator runs.

use std::collections::HashMap;

use regex::Regex;
use serde_json::{Map, Number, Value};

use super::engine::find_shared;

/// Nested schemas deeper than this are left alone. Also bounds `$ref` cycles.
const MAX_DEPTH: usize = 64;

/// Which mutations to apply to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Preparation {
    pub coerce_types: bool,
    pub use_defaults: bool,
    pub remove_additional: bool,
}

impl Preparation {
    pub fn is_noop(&self) -> bool {
        !self.coerce_types && !self.use_defaults && !self.remove_additional
    }

    /// Mutate `instance` in place according to `schema`.
    ///
    /// `$ref`s are followed into `shared` schemas and into the referencing
    /// document's `definitions`/`$defs`. Branches of `anyOf`/`oneOf` are not
    /// walked: which branch applies is only known after validation.
    pub fn apply(&self, schema: &Value, shared: &HashMap<String, Value>, instance: &mut Value) {
        if self.is_noop() {
            return;
        }
        Walker {
            preparation: *self,
            shared,
        }
        .walk(schema, schema, instance, 0);
    }
}

struct Walker<'s> {
    preparation: Preparation,
    shared: &'s HashMap<String, Value>,
}

impl<'s> Walker<'s> {
    /// `document` is the schema `#` fragments resolve against.
    fn walk(&self, document: &'s Value, schema: &'s Value, instance: &mut Value, depth: usize) {
        if depth > MAX_DEPTH {
            return;
        }
        let Value::Object(schema) = schema else {
            return;
        };

        if let Some(Value::String(reference)) = schema.get("$ref")
            && let Some((document, target)) = self.resolve(document, reference)
        {
            self.walk(document, target, instance, depth + 1);
        }

        if self.preparation.coerce_types
            && let Some(ty) = schema.get("type")
        {
            coerce(ty, instance);
        }

        match instance {
            Value::Object(map) => self.walk_object(document, schema, map, depth),
            Value::Array(items) => match schema.get("items") {
                Some(Value::Array(tuple)) => {
                    for (sub, child) in tuple.iter().zip(items.iter_mut()) {
                        self.walk(document, sub, child, depth + 1);
                    }
                }
                Some(sub @ Value::Object(_)) => {
                    for child in items.iter_mut() {
                        self.walk(document, sub, child, depth + 1);
                    }
                }
                _ => {}
            },
            _ => {}
        }

        if let Some(Value::Array(all_of)) = schema.get("allOf") {
            for sub in all_of {
                self.walk(document, sub, instance, depth + 1);
            }
        }
    }

    fn walk_object(
        &self,
        document: &'s Value,
        schema: &'s Map<String, Value>,
        map: &mut Map<String, Value>,
        depth: usize,
    ) {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(properties) = properties {
            for (name, sub) in properties {
                match map.get_mut(name) {
                    Some(child) => self.walk(document, sub, child, depth + 1),
                    None if self.preparation.use_defaults => {
                        if let Some(default) = self.default_for(document, sub, depth + 1) {
                            map.insert(name.clone(), default.clone());
                        }
                    }
                    None => {}
                }
            }
        }

        let declared = |key: &str| properties.is_some_and(|p| p.contains_key(key));

        match schema.get("additionalProperties") {
            Some(Value::Bool(false)) if self.preparation.remove_additional => {
                // An uncompilable pattern means we cannot tell what is declared.
                let Some(patterns) = pattern_regexes(schema) else {
                    return;
                };
                map.retain(|key, _| {
                    declared(key.as_str()) || patterns.iter().any(|re| re.is_match(key))
                });
            }
            Some(additional @ Value::Object(_)) => {
                for (key, child) in map.iter_mut() {
                    if !declared(key.as_str()) {
                        self.walk(document, additional, child, depth + 1);
                    }
                }
            }
            _ => {}
        }
    }

    /// The `default` of a property schema, looking through `$ref`.
    fn default_for(
        &self,
        document: &'s Value,
        schema: &'s Value,
        depth: usize,
    ) -> Option<&'s Value> {
        if depth > MAX_DEPTH {
            return None;
        }
        if let Some(default) = schema.get("default") {
            return Some(default);
        }
        let reference = schema.get("$ref")?.as_str()?;
        let (document, target) = self.resolve(document, reference)?;
        self.default_for(document, target, depth + 1)
    }

    /// Resolve a `$ref` to the document it lands in and the target schema.
    ///
    /// Fragments must be JSON pointers; anchors are not followed.
    fn resolve(&self, document: &'s Value, reference: &str) -> Option<(&'s Value, &'s Value)> {
        let (base, fragment) = reference.split_once('#').unwrap_or((reference, ""));
        let document = if base.is_empty() {
            document
        } else {
            find_shared(self.shared, base)?
        };
        let target = if fragment.is_empty() {
            document
        } else {
            document.pointer(fragment)?
        };
        Some((document, target))
    }
}

fn pattern_regexes(schema: &Map<String, Value>) -> Option<Vec<Regex>> {
    match schema.get("patternProperties").and_then(Value::as_object) {
        Some(patterns) => patterns.keys().map(|p| Regex::new(p).ok()).collect(),
        None => Some(Vec::new()),
    }
}

fn coerce(ty: &Value, instance: &mut Value) {
    let types: Vec<&str> = match ty {
        Value::String(t) => vec![t.as_str()],
        Value::Array(list) => list.iter().filter_map(Value::as_str).collect(),
        _ => return,
    };

    if types.iter().any(|t| matches_type(t, instance)) {
        return;
    }

    for t in types {
        if let Some(coerced) = coerce_to(t, instance) {
            *instance = coerced;
            return;
        }
    }
}

fn matches_type(ty: &str, value: &Value) -> bool {
    match (ty, value) {
        ("null", Value::Null)
        | ("boolean", Value::Bool(_))
        | ("string", Value::String(_))
        | ("array", Value::Array(_))
        | ("object", Value::Object(_))
        | ("number", Value::Number(_)) => true,
        ("integer", Value::Number(n)) => is_integer(n),
        _ => false,
    }
}

fn is_integer(n: &Number) -> bool {
    n.is_i64() || n.is_u64() || n.as_f64().is_some_and(|f| f.fract() == 0.0)
}

fn coerce_to(ty: &str, value: &Value) -> Option<Value> {
    match ty {
        "string" => match value {
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            Value::Null => Some(Value::String(String::new())),
            _ => None,
        },
        "number" => match value {
            Value::String(s) => parse_number(s),
            Value::Bool(b) => Some(Value::from(u8::from(*b))),
            Value::Null => Some(Value::from(0)),
            _ => None,
        },
        "integer" => match value {
            Value::String(s) => parse_number(s).filter(|v| matches_type("integer", v)),
            Value::Bool(b) => Some(Value::from(u8::from(*b))),
            Value::Null => Some(Value::from(0)),
            _ => None,
        },
        "boolean" => match value {
            Value::String(s) if s == "true" => Some(Value::Bool(true)),
            Value::String(s) if s == "false" => Some(Value::Bool(false)),
            Value::Number(n) if n.as_f64() == Some(1.0) => Some(Value::Bool(true)),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(Value::Bool(false)),
            Value::Null => Some(Value::Bool(false)),
            _ => None,
        },
        "null" => match value {
            Value::String(s) if s.is_empty() => Some(Value::Null),
            Value::Number(n) if n.as_f64() == Some(0.0) => Some(Value::Null),
            Value::Bool(false) => Some(Value::Null),
            _ => None,
        },
        _ => None,
    }
}

fn parse_number(s: &str) -> Option<Value> {
    if s.is_empty() || s.trim() != s {
        return None;
    }
    if let Ok(i) = s.parse::<i64>() {
        return Some(Value::from(i));
    }
    let f = s.parse::<f64>().ok().filter(|f| f.is_finite())?;
    Number::from_f64(f).map(Value::Number)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    const ALL: Preparation = Preparation {
        coerce_types: true,
        use_defaults: true,
        remove_additional: true,
    };

    const DEFAULTS_ONLY: Preparation = Preparation {
        coerce_types: false,
        use_defaults: true,
        remove_additional: false,
    };

    #[test]
    fn test_defaults_fill_missing_properties() {
        let schema = json!({
            "type": "object",
            "properties": {
                "answer": { "type": "number", "default": 42 },
                "label": { "type": "string" }
            }
        });
        let mut payload = json!({ "label": "x" });
        DEFAULTS_ONLY.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "label": "x", "answer": 42 }));
    }

    #[test]
    fn test_defaults_do_not_overwrite() {
        let schema = json!({
            "properties": { "answer": { "default": 42 } }
        });
        let mut payload = json!({ "answer": 7 });
        DEFAULTS_ONLY.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "answer": 7 }));
    }

    #[test]
    fn test_remove_additional_only_when_closed() {
        let open = json!({ "properties": { "a": {} } });
        let closed = json!({ "properties": { "a": {} }, "additionalProperties": false });

        let mut payload = json!({ "a": 1, "b": 2 });
        ALL.apply(&open, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "a": 1, "b": 2 }));

        ALL.apply(&closed, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "a": 1 }));
    }

    #[test]
    fn test_remove_additional_keeps_pattern_properties() {
        let schema = json!({
            "properties": { "a": {} },
            "patternProperties": { "^x-": {} },
            "additionalProperties": false
        });
        let mut payload = json!({ "a": 1, "x-trace": "t", "b": 2 });
        ALL.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "a": 1, "x-trace": "t" }));
    }

    #[test]
    fn test_nested_objects_and_arrays() {
        let schema = json!({
            "type": "object",
            "properties": {
                "items": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": { "n": { "type": "integer" } },
                        "additionalProperties": false
                    }
                }
            }
        });
        let mut payload = json!({ "items": [{ "n": "1", "junk": true }, { "n": 2 }] });
        ALL.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "items": [{ "n": 1 }, { "n": 2 }] }));
    }

    #[test]
    fn test_all_of_branches_are_walked() {
        let schema = json!({
            "allOf": [
                { "properties": { "a": { "default": 1 } } },
                { "properties": { "b": { "default": 2 } } }
            ]
        });
        let mut payload = json!({});
        DEFAULTS_ONLY.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "a": 1, "b": 2 }));
    }

    #[test]
    fn test_local_reference_is_followed() {
        let schema = json!({
            "definitions": {
                "closed": {
                    "type": "object",
                    "additionalProperties": false,
                    "properties": { "answer": { "type": "number" } }
                },
                "unit": { "type": "string", "default": "none" }
            },
            "type": "object",
            "properties": {
                "result": { "$ref": "#/definitions/closed" },
                "unit": { "$ref": "#/definitions/unit" }
            }
        });
        let mut payload = json!({ "result": { "answer": 1, "secret": "x" } });
        ALL.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "result": { "answer": 1 }, "unit": "none" }));
    }

    #[test]
    fn test_shared_reference_is_followed() {
        let mut shared = HashMap::new();
        shared.insert(
            "https://example.com/answer.json".to_string(),
            json!({
                "$defs": { "label": { "type": "string", "default": "x" } },
                "type": "object",
                "additionalProperties": false,
                "properties": {
                    "answer": { "type": "number" },
                    "label": { "$ref": "#/$defs/label" }
                }
            }),
        );

        let schema = json!({ "$ref": "https://example.com/answer.json" });
        let mut payload = json!({ "answer": 1, "secret": "x" });
        ALL.apply(&schema, &shared, &mut payload);
        assert_eq!(payload, json!({ "answer": 1, "label": "x" }));

        // Relative references match on the file name.
        let schema = json!({ "$ref": "answer.json" });
        let mut payload = json!({ "answer": 2, "secret": "x" });
        ALL.apply(&schema, &shared, &mut payload);
        assert_eq!(payload, json!({ "answer": 2, "label": "x" }));
    }

    #[test]
    fn test_reference_cycle_terminates() {
        let schema = json!({
            "$defs": { "node": { "$ref": "#/$defs/node" } },
            "properties": { "a": { "$ref": "#/$defs/node" } }
        });
        let mut payload = json!({});
        ALL.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({}));

        let mut payload = json!({ "a": 1 });
        ALL.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "a": 1 }));
    }

    #[test]
    fn test_unresolvable_reference_is_ignored() {
        let schema = json!({
            "properties": { "a": { "$ref": "#/definitions/missing" } },
            "additionalProperties": false
        });
        let mut payload = json!({ "a": 1, "b": 2 });
        ALL.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "a": 1 }));
    }

    #[test]
    fn test_any_of_branches_are_not_prepared() {
        let schema = json!({
            "anyOf": [
                { "properties": { "a": { "default": 1 } }, "additionalProperties": false }
            ]
        });
        let mut payload = json!({ "b": 2 });
        ALL.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "b": 2 }));
    }

    #[test]
    fn test_coercion_rules() {
        let cases = [
            (json!("number"), json!("42"), json!(42)),
            (json!("number"), json!("2.5"), json!(2.5)),
            (json!("number"), json!("abc"), json!("abc")),
            (json!("number"), json!(""), json!("")),
            (json!("integer"), json!("2.5"), json!("2.5")),
            (json!("integer"), json!(true), json!(1)),
            (json!("string"), json!(42), json!("42")),
            (json!("string"), json!(null), json!("")),
            (json!("boolean"), json!("false"), json!(false)),
            (json!("boolean"), json!(1), json!(true)),
            (json!("null"), json!(""), json!(null)),
            (json!(["number", "string"]), json!(true), json!(1)),
            (json!(["number", "string"]), json!("x"), json!("x")),
        ];
        for (ty, input, expected) in cases {
            let mut value = input.clone();
            coerce(&ty, &mut value);
            assert_eq!(value, expected, "coercing {input} to {ty}");
        }
    }

    #[test]
    fn test_coercion_disabled_leaves_payload() {
        let schema = json!({ "properties": { "answer": { "type": "number" } } });
        let mut payload = json!({ "answer": "42" });
        DEFAULTS_ONLY.apply(&schema, &HashMap::new(), &mut payload);
        assert_eq!(payload, json!({ "answer": "42" }));
    }
}
