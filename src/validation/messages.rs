//! Schema-authored error messages.
//!
//! A schema node may carry a message keyword (`errorMessage` by default):
//!
//! ```json
//! { "type": "number", "errorMessage": "answer must be a number" }
//! ```
//!
//! Every violation raised at or below that node is reported with the custom
//! message, at the instance location of the node. The value may also be an
//! object keyed by failing keyword, with `_` as the fallback:
//!
//! ```json
//! { "type": "number", "minimum": 0, "errorMessage": { "minimum": "must be positive", "_": "invalid" } }
//! ```

use serde_json::Value;

use super::execute::Violation;

/// A violation as reported by the validator, before message rewriting.
#[derive(Debug, Clone)]
pub(crate) struct RawViolation {
    pub instance_path: String,
    pub schema_path: String,
    pub message: String,
}

impl From<RawViolation> for Violation {
    fn from(raw: RawViolation) -> Self {
        Violation {
            path: raw.instance_path,
            message: raw.message,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CustomMessages {
    keyword: String,
}

/// The closest schema node carrying the message keyword.
struct Override<'a> {
    value: &'a Value,
    instance_depth: usize,
}

impl CustomMessages {
    pub fn new(keyword: String) -> Self {
        Self { keyword }
    }

    /// Rewrite violations covered by a message keyword, dropping duplicates.
    pub fn apply(&self, schema: &Value, raw: Vec<RawViolation>) -> Vec<Violation> {
        let mut out: Vec<Violation> = Vec::with_capacity(raw.len());
        for violation in raw {
            let rewritten = self.rewrite(schema, violation);
            if !out.contains(&rewritten) {
                out.push(rewritten);
            }
        }
        out
    }

    fn rewrite(&self, schema: &Value, raw: RawViolation) -> Violation {
        let segments = pointer_segments(&raw.schema_path);
        let failing = segments.last().map(String::as_str).unwrap_or_default();

        let Some(found) = self.closest_override(schema, &segments) else {
            return raw.into();
        };
        let Some(message) = select_message(found.value, failing) else {
            return raw.into();
        };

        let path: String = raw
            .instance_path
            .split('/')
            .skip(1)
            .take(found.instance_depth)
            .map(|s| format!("/{s}"))
            .collect();

        Violation {
            path,
            message: message.to_string(),
        }
    }

    /// Follow `segments` through `schema`, remembering the deepest node that
    /// carries the keyword and how many instance levels it sits below the root.
    fn closest_override<'a>(
        &self,
        schema: &'a Value,
        segments: &[String],
    ) -> Option<Override<'a>> {
        let mut node = schema;
        let mut depth = 0;
        let mut found = self.override_at(node, depth);
        let mut i = 0;

        while i < segments.len() {
            let keyword = segments[i].as_str();
            let next = segments.get(i + 1);
            let step = match keyword {
                "properties" | "patternProperties" => next
                    .and_then(|name| node.get(keyword)?.get(name.as_str()))
                    .map(|n| (n, 2, 1)),
                "$defs" | "definitions" | "dependencies" | "dependentSchemas" => next
                    .and_then(|name| node.get(keyword)?.get(name.as_str()))
                    .map(|n| (n, 2, 0)),
                "allOf" | "anyOf" | "oneOf" => next
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .and_then(|idx| node.get(keyword)?.get(idx))
                    .map(|n| (n, 2, 0)),
                "prefixItems" => next
                    .and_then(|idx| idx.parse::<usize>().ok())
                    .and_then(|idx| node.get(keyword)?.get(idx))
                    .map(|n| (n, 2, 1)),
                "items" => match node.get("items") {
                    Some(Value::Array(tuple)) => next
                        .and_then(|idx| idx.parse::<usize>().ok())
                        .and_then(|idx| tuple.get(idx))
                        .map(|n| (n, 2, 1)),
                    Some(sub) => Some((sub, 1, 1)),
                    None => None,
                },
                "additionalProperties"
                | "additionalItems"
                | "contains"
                | "unevaluatedProperties"
                | "unevaluatedItems" => node.get(keyword).map(|n| (n, 1, 1)),
                "not" | "if" | "then" | "else" | "propertyNames" => {
                    node.get(keyword).map(|n| (n, 1, 0))
                }
                _ => None,
            };

            let Some((child, consumed, levels)) = step else {
                break;
            };
            node = child;
            depth += levels;
            i += consumed;
            if let Some(o) = self.override_at(node, depth) {
                found = Some(o);
            }
        }

        found
    }

    fn override_at<'a>(&self, node: &'a Value, depth: usize) -> Option<Override<'a>> {
        node.get(self.keyword.as_str()).map(|value| Override {
            value,
            instance_depth: depth,
        })
    }
}

fn select_message<'a>(value: &'a Value, failing: &str) -> Option<&'a str> {
    match value {
        Value::String(message) => Some(message),
        Value::Object(by_keyword) => by_keyword
            .get(failing)
            .and_then(Value::as_str)
            .or_else(|| by_keyword.get("_").and_then(Value::as_str)),
        _ => None,
    }
}

fn pointer_segments(pointer: &str) -> Vec<String> {
    pointer
        .split('/')
        .skip(1)
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn raw(instance_path: &str, schema_path: &str) -> RawViolation {
        RawViolation {
            instance_path: instance_path.into(),
            schema_path: schema_path.into(),
            message: "original".into(),
        }
    }

    fn messages() -> CustomMessages {
        CustomMessages::new("errorMessage".into())
    }

    #[test]
    fn test_string_message_on_property() {
        let schema = json!({
            "type": "object",
            "properties": {
                "answer": { "type": "number", "errorMessage": "answer must be a number" }
            }
        });
        let out = messages().apply(&schema, vec![raw("/answer", "/properties/answer/type")]);
        assert_eq!(
            out,
            vec![Violation {
                path: "/answer".into(),
                message: "answer must be a number".into()
            }]
        );
    }

    #[test]
    fn test_message_reported_at_owning_node() {
        let schema = json!({
            "type": "object",
            "properties": {
                "user": {
                    "type": "object",
                    "errorMessage": "user is malformed",
                    "properties": {
                        "id": { "type": "integer" },
                        "name": { "type": "string" }
                    }
                }
            }
        });
        let out = messages().apply(
            &schema,
            vec![
                raw("/user/id", "/properties/user/properties/id/type"),
                raw("/user/name", "/properties/user/properties/name/type"),
            ],
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].path, "/user");
        assert_eq!(out[0].message, "user is malformed");
    }

    #[test]
    fn test_keyword_specific_message() {
        let schema = json!({
            "type": "integer",
            "minimum": 0,
            "errorMessage": { "minimum": "must not be negative", "_": "bad value" }
        });
        let out = messages().apply(&schema, vec![raw("", "/minimum"), raw("", "/type")]);
        assert_eq!(out[0].message, "must not be negative");
        assert_eq!(out[1].message, "bad value");
    }

    #[test]
    fn test_uncovered_violation_untouched() {
        let schema = json!({
            "type": "object",
            "properties": {
                "a": { "type": "number", "errorMessage": "a must be a number" },
                "b": { "type": "number" }
            }
        });
        let out = messages().apply(&schema, vec![raw("/b", "/properties/b/type")]);
        assert_eq!(out[0].path, "/b");
        assert_eq!(out[0].message, "original");
    }

    #[test]
    fn test_array_items() {
        let schema = json!({
            "type": "array",
            "items": { "type": "string", "errorMessage": "items must be strings" }
        });
        let out = messages().apply(&schema, vec![raw("/2", "/items/type")]);
        assert_eq!(out[0].path, "/2");
        assert_eq!(out[0].message, "items must be strings");
    }

    #[test]
    fn test_escaped_property_names() {
        let schema = json!({
            "properties": {
                "a/b": { "type": "number", "errorMessage": "slash" }
            }
        });
        let out = messages().apply(&schema, vec![raw("/a~1b", "/properties/a~1b/type")]);
        assert_eq!(out[0].message, "slash");
        assert_eq!(out[0].path, "/a~1b");
    }
}
