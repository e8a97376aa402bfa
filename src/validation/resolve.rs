//! Picks the validator for an emitted status code and media type.

use super::{
    compile::{CompiledValidatorSet, MediaTypeValidators, ResponseValidators, StatusKey},
    engine::CompiledValidator,
};
use crate::error::ResponseValidationError;

/// Keys tried for `status`, most specific first: exact, class, default.
pub fn lookup_order(status: u16) -> [StatusKey; 3] {
    [
        StatusKey::Exact(status),
        StatusKey::Class((status / 100) as u8),
        StatusKey::Default,
    ]
}

/// Entry applying to `status`, if any.
pub fn resolve(set: &CompiledValidatorSet, status: u16) -> Option<&ResponseValidators> {
    lookup_order(status).iter().find_map(|key| set.get(key))
}

/// Lower-cased media type with parameters removed.
///
/// `"Application/JSON; charset=utf-8"` becomes `"application/json"`.
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Validator for the response media type within a content map.
///
/// A missing or unlisted media type is an error even outside strict mode.
pub fn resolve_media_type<'a>(
    validators: &'a MediaTypeValidators,
    content_type: Option<&str>,
) -> Result<&'a CompiledValidator, ResponseValidationError> {
    let essence = content_type
        .map(media_type_essence)
        .filter(|e| !e.is_empty());

    match essence {
        Some(media_type) => validators.get(&media_type).ok_or_else(|| {
            ResponseValidationError::media_type_not_defined(Some(media_type.as_str()))
        }),
        None => Err(ResponseValidationError::media_type_not_defined(None)),
    }
}

/// Resolve the validator to run for a response.
///
/// `Ok(None)` means the response passes through unvalidated. With
/// `strict_status_codes`, a status with no matching key is an error instead.
pub fn resolve_validator<'a>(
    set: &'a CompiledValidatorSet,
    status: u16,
    content_type: Option<&str>,
    strict_status_codes: bool,
) -> Result<Option<&'a CompiledValidator>, ResponseValidationError> {
    match resolve(set, status) {
        Some(ResponseValidators::Single(validator)) => Ok(Some(validator)),
        Some(ResponseValidators::ByMediaType(validators)) => {
            resolve_media_type(validators, content_type).map(Some)
        }
        None if strict_status_codes => {
            Err(ResponseValidationError::status_code_not_defined(status))
        }
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use serde_json::json;

    use super::*;
    use crate::{
        error::RESPONSE_SCHEMA_NOT_DEFINED,
        validation::{ResponseSchemaMap, SchemaEngine, compile},
    };

    fn compiled(schemas: ResponseSchemaMap) -> CompiledValidatorSet {
        compile(&schemas, &SchemaEngine::default()).unwrap()
    }

    fn tagged(tag: &str) -> serde_json::Value {
        json!({ "type": "object", "title": tag })
    }

    fn title(validator: &CompiledValidator) -> &str {
        validator.schema()["title"].as_str().unwrap()
    }

    #[rstest]
    #[case(201, "exact")]
    #[case(200, "class")]
    #[case(299, "class")]
    #[case(404, "default")]
    #[case(500, "default")]
    fn test_precedence(#[case] status: u16, #[case] expected: &str) {
        let set = compiled(
            ResponseSchemaMap::new()
                .with("201", tagged("exact"))
                .with("2XX", tagged("class"))
                .with("default", tagged("default")),
        );
        let validator = resolve_validator(&set, status, None, false)
            .unwrap()
            .unwrap();
        assert_eq!(title(validator), expected);
    }

    #[test]
    fn test_exact_key_forms() {
        for set in [
            compiled(ResponseSchemaMap::new().with("200", tagged("exact"))),
            compiled(ResponseSchemaMap::new().with(200, tagged("exact"))),
        ] {
            assert!(resolve(&set, 200).is_some());
            assert!(resolve(&set, 201).is_none());
        }
    }

    #[test]
    fn test_no_match_passes_through_unless_strict() {
        let set = compiled(ResponseSchemaMap::new().with("3xx", tagged("redirect")));
        assert!(resolve_validator(&set, 200, None, false).unwrap().is_none());

        let err = resolve_validator(&set, 200, None, true).unwrap_err();
        assert_eq!(err.code(), RESPONSE_SCHEMA_NOT_DEFINED);
        assert_eq!(err.to_string(), "No schema defined for status code 200");
    }

    #[test]
    fn test_resolution_is_stable() {
        let set = compiled(ResponseSchemaMap::new().with("2xx", tagged("class")));
        let first = resolve_validator(&set, 204, None, false).unwrap().unwrap();
        let second = resolve_validator(&set, 204, None, false).unwrap().unwrap();
        assert!(first.ptr_eq(second));
    }

    #[rstest]
    #[case("application/json", "application/json")]
    #[case("application/json; charset=utf-8", "application/json")]
    #[case("Application/JSON ;charset=utf-8", "application/json")]
    #[case("  text/plain  ", "text/plain")]
    #[case("", "")]
    fn test_media_type_essence(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(media_type_essence(raw), expected);
    }

    fn content_set() -> CompiledValidatorSet {
        compiled(ResponseSchemaMap::new().with(
            "2xx",
            json!({
                "content": {
                    "application/a+json": { "schema": tagged("a") },
                    "application/b+json": { "schema": tagged("b") }
                }
            }),
        ))
    }

    #[test]
    fn test_media_type_lookup() {
        let set = content_set();
        let content_type = Some("application/b+json; charset=utf-8");
        let validator = resolve_validator(&set, 200, content_type, false)
            .unwrap()
            .unwrap();
        assert_eq!(title(validator), "b");
    }

    #[rstest]
    #[case(Some("application/c+json"), "No schema defined for media type application/c+json")]
    #[case(None, "No schema defined for media type (none)")]
    #[case(Some(""), "No schema defined for media type (none)")]
    fn test_media_type_not_defined(#[case] content_type: Option<&str>, #[case] message: &str) {
        let set = content_set();
        let err = resolve_validator(&set, 200, content_type, false).unwrap_err();
        assert_eq!(err.code(), RESPONSE_SCHEMA_NOT_DEFINED);
        assert_eq!(err.to_string(), message);
    }
}
