//! Errors raised at plugin registration, route setup and response time.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    config::ConfigError,
    validation::{CompileError, Violation, schema_errors_text},
};

/// Error code for payloads that do not conform to the resolved schema.
pub const RESPONSE_VALIDATION_FAILED: &str = "RESPONSE_VALIDATION_FAILED";

/// Error code for responses with no applicable schema where one is required.
pub const RESPONSE_SCHEMA_NOT_DEFINED: &str = "RESPONSE_SCHEMA_NOT_DEFINED";

/// Placeholder used in messages when the response carries no `Content-Type`.
const MISSING_MEDIA_TYPE: &str = "(none)";

/// Errors that fail plugin registration or route setup.
///
/// These are always raised synchronously, before the route accepts traffic.
#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Engine plugin '{name}' failed: {reason}")]
    Plugin { name: String, reason: String },

    #[error("Shared schema rejected: {0}")]
    SharedSchema(String),

    #[error("Route {route}: {source}")]
    Route {
        route: String,
        #[source]
        source: CompileError,
    },

    #[error("Route {route}: method is not supported by the router")]
    UnsupportedMethod { route: String },
}

/// Request-time rejection of a response.
///
/// Every variant is reported with HTTP 500: the server broke its own
/// contract, the client did nothing wrong.
#[derive(Debug, Clone, Error)]
pub enum ResponseValidationError {
    /// The payload did not conform to the schema for its status code.
    #[error("{message}")]
    ValidationFailed {
        message: String,
        validation: Vec<Violation>,
    },

    /// Strict status-code validation is on and no schema matches the status.
    #[error("No schema defined for status code {status}")]
    StatusCodeNotDefined { status: u16 },

    /// A content map applies but has no entry for the response media type.
    #[error("No schema defined for media type {media_type}")]
    MediaTypeNotDefined { media_type: String },
}

impl ResponseValidationError {
    /// Build a validation failure from an ordered list of violations.
    pub fn validation_failed(validation: Vec<Violation>) -> Self {
        Self::ValidationFailed {
            message: schema_errors_text(&validation),
            validation,
        }
    }

    pub fn status_code_not_defined(status: u16) -> Self {
        Self::StatusCodeNotDefined { status }
    }

    pub fn media_type_not_defined(media_type: Option<&str>) -> Self {
        Self::MediaTypeNotDefined {
            media_type: media_type.unwrap_or(MISSING_MEDIA_TYPE).to_string(),
        }
    }

    /// Machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed { .. } => RESPONSE_VALIDATION_FAILED,
            Self::StatusCodeNotDefined { .. } | Self::MediaTypeNotDefined { .. } => {
                RESPONSE_SCHEMA_NOT_DEFINED
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }

    /// Structured violations, present only for validation failures.
    pub fn validation(&self) -> Option<&[Violation]> {
        match self {
            Self::ValidationFailed { validation, .. } => Some(validation),
            _ => None,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody<'a> {
    status_code: u16,
    code: &'a str,
    error: &'a str,
    message: String,
}

impl IntoResponse for ResponseValidationError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorBody {
            status_code: status.as_u16(),
            code: self.code(),
            error: status.canonical_reason().unwrap_or("Internal Server Error"),
            message: self.to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        // Keep the structured error around for outer layers.
        response.extensions_mut().insert(self);
        response
    }
}
