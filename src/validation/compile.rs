//! Compiles a route's response schema map into validators.
//!
//! Compilation happens once, when the route is registered. The resulting
//! [`CompiledValidatorSet`] is immutable and shared by every request to the
//! route.

use std::{collections::HashMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{
    engine::{CompiledValidator, SchemaEngine},
    normalize::normalize,
};

/// A normalized response status key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusKey {
    /// A single status code, e.g. `201`.
    Exact(u16),
    /// Every code sharing the leading digit, e.g. `2xx`.
    Class(u8),
    /// Any status not covered by another key.
    Default,
}

impl StatusKey {
    /// Parse a raw key, ignoring case.
    ///
    /// Accepts a three-digit code in `100..=599`, `1xx`..`5xx`, or `default`.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase();
        if key == "default" {
            return Some(Self::Default);
        }
        if key.len() != 3 {
            return None;
        }

        let bytes = key.as_bytes();
        let class = match bytes[0] {
            d @ b'1'..=b'5' => d - b'0',
            _ => return None,
        };
        if &key[1..] == "xx" {
            return Some(Self::Class(class));
        }
        if bytes[1..].iter().all(u8::is_ascii_digit) {
            return key.parse().ok().map(Self::Exact);
        }
        None
    }
}

impl fmt::Display for StatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusKey::Exact(code) => write!(f, "{code}"),
            StatusKey::Class(class) => write!(f, "{class}xx"),
            StatusKey::Default => f.write_str("default"),
        }
    }
}

impl FromStr for StatusKey {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| CompileError::InvalidStatusKey(s.to_string()))
    }
}

/// Response schemas declared for a route, keyed by raw status key.
///
/// Each value is either a JSON Schema (shorthand allowed) or an object with a
/// `content` map of media type to `{ "schema": ... }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResponseSchemaMap(Map<String, Value>);

impl ResponseSchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert. Integer codes and strings are both accepted.
    pub fn with(mut self, key: impl fmt::Display, schema: Value) -> Self {
        self.insert(key, schema);
        self
    }

    pub fn insert(&mut self, key: impl fmt::Display, schema: Value) {
        self.0.insert(key.to_string(), schema);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for ResponseSchemaMap {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Validators keyed by lower-cased media type, without parameters.
#[derive(Debug, Clone, Default)]
pub struct MediaTypeValidators {
    validators: HashMap<String, CompiledValidator>,
}

impl MediaTypeValidators {
    pub fn get(&self, media_type: &str) -> Option<&CompiledValidator> {
        self.validators.get(media_type)
    }

    pub fn media_types(&self) -> impl Iterator<Item = &str> {
        self.validators.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.validators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }
}

/// What a single status key compiles to.
#[derive(Debug, Clone)]
pub enum ResponseValidators {
    Single(CompiledValidator),
    ByMediaType(MediaTypeValidators),
}

/// Every validator for one route.
#[derive(Debug, Clone, Default)]
pub struct CompiledValidatorSet {
    entries: HashMap<StatusKey, ResponseValidators>,
}

impl CompiledValidatorSet {
    pub fn get(&self, key: &StatusKey) -> Option<&ResponseValidators> {
        self.entries.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &StatusKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error(
        "invalid response status key '{0}': expected a code in 100-599, a class such as '2xx', or 'default'"
    )]
    InvalidStatusKey(String),

    #[error("response status key '{0}' is declared more than once")]
    DuplicateStatusKey(String),

    #[error("invalid content map under '{key}': {reason}")]
    InvalidContentMap { key: String, reason: String },

    #[error("failed to compile response schema for {target}: {reason}")]
    Schema { target: String, reason: String },
}

/// Compile every entry of `schemas` with `engine`.
pub fn compile(
    schemas: &ResponseSchemaMap,
    engine: &SchemaEngine,
) -> Result<CompiledValidatorSet, CompileError> {
    let mut entries = HashMap::with_capacity(schemas.len());

    for (raw_key, entry) in schemas.iter() {
        let key: StatusKey = raw_key.parse()?;
        if entries.contains_key(&key) {
            return Err(CompileError::DuplicateStatusKey(key.to_string()));
        }

        let validators = match content_map(entry) {
            Some(content) => {
                ResponseValidators::ByMediaType(compile_content(key, content, engine)?)
            }
            None => ResponseValidators::Single(compile_schema(
                engine,
                entry,
                || key.to_string(),
            )?),
        };
        entries.insert(key, validators);
    }

    Ok(CompiledValidatorSet { entries })
}

fn content_map(entry: &Value) -> Option<&Map<String, Value>> {
    entry.get("content").and_then(Value::as_object)
}

fn compile_content(
    key: StatusKey,
    content: &Map<String, Value>,
    engine: &SchemaEngine,
) -> Result<MediaTypeValidators, CompileError> {
    let invalid = |reason: String| CompileError::InvalidContentMap {
        key: key.to_string(),
        reason,
    };

    let mut validators = HashMap::with_capacity(content.len());
    for (media_type, media) in content {
        let schema = media
            .get("schema")
            .ok_or_else(|| invalid(format!("media type '{media_type}' has no schema")))?;

        let normalized = media_type.trim().to_ascii_lowercase();
        if normalized.is_empty() {
            return Err(invalid("media type must not be empty".into()));
        }
        if validators.contains_key(&normalized) {
            return Err(invalid(format!(
                "media type '{normalized}' is declared more than once"
            )));
        }

        let validator = compile_schema(engine, schema, || format!("{key} {normalized}"))?;
        validators.insert(normalized, validator);
    }

    Ok(MediaTypeValidators { validators })
}

fn compile_schema(
    engine: &SchemaEngine,
    schema: &Value,
    target: impl FnOnce() -> String,
) -> Result<CompiledValidator, CompileError> {
    engine
        .compile(&normalize(schema))
        .map_err(|reason| CompileError::Schema {
            target: target(),
            reason,
        })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    #[rstest]
    #[case("200", Some(StatusKey::Exact(200)))]
    #[case("599", Some(StatusKey::Exact(599)))]
    #[case("2xx", Some(StatusKey::Class(2)))]
    #[case("2XX", Some(StatusKey::Class(2)))]
    #[case("5Xx", Some(StatusKey::Class(5)))]
    #[case("default", Some(StatusKey::Default))]
    #[case("DEFAULT", Some(StatusKey::Default))]
    #[case("099", None)]
    #[case("600", None)]
    #[case("6xx", None)]
    #[case("20x", None)]
    #[case("2000", None)]
    #[case("ok", None)]
    #[case("", None)]
    fn test_status_key_parse(#[case] raw: &str, #[case] expected: Option<StatusKey>) {
        assert_eq!(StatusKey::parse(raw), expected);
    }

    #[test]
    fn test_status_key_display_is_lower_case() {
        assert_eq!(StatusKey::Class(4).to_string(), "4xx");
        assert_eq!(StatusKey::Exact(204).to_string(), "204");
        assert_eq!(StatusKey::Default.to_string(), "default");
    }

    #[test]
    fn test_compile_single_and_content_entries() {
        let schemas = ResponseSchemaMap::new()
            .with(200, json!({ "answer": { "type": "number" } }))
            .with(
                "4XX",
                json!({
                    "content": {
                        "application/json": { "schema": { "type": "object" } },
                        "Text/Plain": { "schema": { "type": "string" } }
                    }
                }),
            );
        let set = compile(&schemas, &SchemaEngine::default()).unwrap();
        assert_eq!(set.len(), 2);

        let Some(ResponseValidators::Single(single)) = set.get(&StatusKey::Exact(200)) else {
            panic!("expected a single validator for 200");
        };
        assert_eq!(
            single.schema(),
            &json!({ "type": "object", "properties": { "answer": { "type": "number" } } })
        );

        let Some(ResponseValidators::ByMediaType(media)) = set.get(&StatusKey::Class(4)) else {
            panic!("expected a content map for 4xx");
        };
        assert_eq!(media.len(), 2);
        assert!(media.get("application/json").is_some());
        assert!(media.get("text/plain").is_some());
    }

    #[test]
    fn test_duplicate_keys_after_normalization() {
        let schemas = ResponseSchemaMap::new()
            .with("2xx", json!({ "type": "object" }))
            .with("2XX", json!({ "type": "object" }));
        let err = compile(&schemas, &SchemaEngine::default()).unwrap_err();
        assert!(matches!(err, CompileError::DuplicateStatusKey(ref k) if k == "2xx"));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let schemas = ResponseSchemaMap::new().with("success", json!({ "type": "object" }));
        let err = compile(&schemas, &SchemaEngine::default()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidStatusKey(ref k) if k == "success"));
    }

    #[test]
    fn test_content_entry_without_schema() {
        let schemas = ResponseSchemaMap::new().with(
            "200",
            json!({ "content": { "application/json": { "type": "object" } } }),
        );
        let err = compile(&schemas, &SchemaEngine::default()).unwrap_err();
        assert!(matches!(err, CompileError::InvalidContentMap { .. }));
    }

    #[test]
    fn test_malformed_schema_names_target() {
        let schemas = ResponseSchemaMap::new().with(
            "2xx",
            json!({
                "content": {
                    "application/json": { "schema": { "type": "not-a-type" } }
                }
            }),
        );
        let err = compile(&schemas, &SchemaEngine::default()).unwrap_err();
        match err {
            CompileError::Schema { target, .. } => assert_eq!(target, "2xx application/json"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_deserialize_schema_map() {
        let schemas: ResponseSchemaMap =
            serde_json::from_value(json!({ "200": { "type": "object" } })).unwrap();
        assert_eq!(schemas.len(), 1);
        assert!(compile(&schemas, &SchemaEngine::default()).is_ok());
    }
}
