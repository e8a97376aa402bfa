//! Runs a resolved validator and formats its violations.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::engine::CompiledValidator;

/// One schema violation, located by a JSON pointer into the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// `/answer`, `/items/0`, or empty for the payload root.
    pub path: String,
    pub message: String,
}

/// Result of validating one payload.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<Violation>,
}

impl ValidationOutcome {
    pub fn passed() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    pub fn failed(errors: Vec<Violation>) -> Self {
        Self {
            valid: false,
            errors,
        }
    }
}

/// Validate `payload`, which may be prepared in place first.
pub fn execute(validator: &CompiledValidator, payload: &mut Value) -> ValidationOutcome {
    validator.validate(payload)
}

/// Join violations as `response<path> <message>`, separated by `", "`.
pub fn schema_errors_text(errors: &[Violation]) -> String {
    errors
        .iter()
        .map(|v| format!("response{} {}", v.path, v.message))
        .collect::<Vec<_>>()
        .join(", ")
}
