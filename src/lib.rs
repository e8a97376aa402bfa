//! Per-route JSON Schema validation of outgoing axum responses.
//!
//! Routes declare response schemas keyed by status code (`"201"`), status
//! class (`"2xx"`) or `"default"`, optionally split by media type. Schemas
//! are compiled once when the route is registered; every response is then
//! checked against the schema for its status code before it is sent, and a
//! non-conforming payload is replaced by a 500 error.
//!
//! ```ignore
//! use axum::Json;
//! use axum_response_validation::{
//!     PluginOptions, ResponseSchemaMap, ResponseValidation, RouteOptions, ValidatedRouter,
//! };
//! use serde_json::json;
//!
//! let validation = ResponseValidation::new(PluginOptions::default())?;
//! let app = ValidatedRouter::new()
//!     .register(validation)
//!     .route(
//!         RouteOptions::get("/").response(
//!             ResponseSchemaMap::new().with("2xx", json!({ "answer": { "type": "number" } })),
//!         ),
//!         || async { Json(json!({ "answer": "42" })) },
//!     )?
//!     .into_router();
//! // GET / now fails with RESPONSE_VALIDATION_FAILED:
//! // "response/answer \"42\" is not of type \"number\""
//! ```

pub mod config;
pub mod error;
#[cfg(feature = "logging")]
pub mod observability;
mod plugin;
pub mod router;
pub mod validation;

#[cfg(test)]
mod tests;

pub use config::{ConfigError, ResponseValidationConfig};
pub use error::{
    RESPONSE_SCHEMA_NOT_DEFINED, RESPONSE_VALIDATION_FAILED, RegistrationError,
    ResponseValidationError,
};
pub use plugin::{EngineSource, PluginOptions, ResponseSchemaCheck, ResponseValidation};
pub use router::{
    OnRouteHook, PreSerializationHook, ReplyContext, RequestHead, RouteId, RouteOptions,
    ValidatedRouter,
};
pub use validation::{
    CompiledValidatorSet, EngineOptions, EnginePlugin, PluginCatalog, PluginSpec,
    ResponseSchemaMap, SchemaEngine, Violation,
};
