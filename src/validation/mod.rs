//! Response schema validation core.
//!
//! Route schemas are normalized and compiled once per route into a
//! [`CompiledValidatorSet`]. For each response, [`resolve_validator`] picks the
//! validator for the emitted status code (exact, then class, then `default`)
//! and media type, and [`execute`] runs it against the payload.
//!
//! ```ignore
//! use axum_response_validation::validation::{ResponseSchemaMap, SchemaEngine, compile, execute, resolve_validator};
//!
//! let schemas = ResponseSchemaMap::new()
//!     .with("2xx", serde_json::json!({ "answer": { "type": "number" } }));
//! let set = compile(&schemas, &SchemaEngine::default())?;
//!
//! let mut payload = serde_json::json!({ "answer": "42" });
//! if let Some(validator) = resolve_validator(&set, 200, None, false)? {
//!     let outcome = execute(validator, &mut payload);
//!     assert!(!outcome.valid);
//! }
//! ```
//!
//! Nothing in this module logs; failures are returned as typed errors.

mod compile;
mod engine;
mod execute;
mod messages;
mod normalize;
pub mod plugins;
mod prepare;
mod resolve;

pub use compile::{
    CompileError, CompiledValidatorSet, MediaTypeValidators, ResponseSchemaMap,
    ResponseValidators, StatusKey, compile,
};
pub use engine::{CompiledValidator, EngineBuilder, EngineOptions, FormatCheck, SchemaEngine};
pub use execute::{ValidationOutcome, Violation, execute, schema_errors_text};
pub use normalize::normalize;
#[cfg(feature = "formats")]
pub use plugins::FormatsPlugin;
pub use plugins::{EnginePlugin, ErrorMessagesPlugin, PluginCatalog, PluginSpec};
pub use resolve::{lookup_order, media_type_essence, resolve, resolve_media_type, resolve_validator};
