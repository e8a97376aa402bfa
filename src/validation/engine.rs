//! Schema engine backed by the `jsonschema` crate.
//!
//! A [`SchemaEngine`] is configured once (options, custom formats, shared
//! schema definitions, plugins) and then compiles response schemas into
//! [`CompiledValidator`]s. Compiled validators are immutable and cheap to
//! clone; every clone shares the same compiled state.

use std::{collections::HashMap, fmt, sync::Arc};

use jsonschema::{Retrieve, Uri, Validator};
use serde_json::Value;

use super::{
    execute::{ValidationOutcome, Violation},
    messages::{CustomMessages, RawViolation},
    plugins::PluginSpec,
    prepare::Preparation,
};
use crate::{config::SchemaDraft, error::RegistrationError};

/// A format checker: receives the string instance, returns whether it conforms.
pub type FormatCheck = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Engine behaviour applied to every compiled schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Draft used for schemas that do not declare `$schema`.
    pub draft: SchemaDraft,
    /// Coerce scalar payload values toward the declared `type`.
    pub coerce_types: bool,
    /// Fill in missing properties that declare a `default`.
    pub use_defaults: bool,
    /// Strip undeclared properties where `additionalProperties` is `false`.
    pub remove_additional: bool,
    /// Report every violation instead of only the first.
    pub all_errors: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            draft: SchemaDraft::default(),
            coerce_types: false,
            use_defaults: true,
            remove_additional: true,
            all_errors: true,
        }
    }
}

/// Mutable engine configuration, handed to plugins before the engine is built.
pub struct EngineBuilder {
    options: EngineOptions,
    validate_formats: bool,
    formats: Vec<(String, FormatCheck)>,
    shared: HashMap<String, Value>,
    message_keyword: Option<String>,
}

impl EngineBuilder {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            validate_formats: false,
            formats: Vec::new(),
            shared: HashMap::new(),
            message_keyword: None,
        }
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut EngineOptions {
        &mut self.options
    }

    /// Treat `format` as an assertion rather than an annotation.
    pub fn validate_formats(&mut self, enabled: bool) -> &mut Self {
        self.validate_formats = enabled;
        self
    }

    /// Register a custom string format.
    pub fn add_format<F>(&mut self, name: impl Into<String>, check: F) -> &mut Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.formats.push((name.into(), Arc::new(check)));
        self
    }

    /// Register a shared schema so response schemas can `$ref` it by `$id`.
    pub fn add_schema(&mut self, schema: Value) -> Result<&mut Self, RegistrationError> {
        let id = schema
            .get("$id")
            .and_then(Value::as_str)
            .ok_or_else(|| RegistrationError::SharedSchema("schema has no string $id".into()))?
            .trim_end_matches('#')
            .to_string();

        if self.shared.contains_key(&id) {
            return Err(RegistrationError::SharedSchema(format!(
                "schema '{id}' is already registered"
            )));
        }
        self.shared.insert(id, schema);
        Ok(self)
    }

    /// Replace violations under schemas carrying `keyword` with its message.
    pub fn custom_messages(&mut self, keyword: impl Into<String>) -> &mut Self {
        self.message_keyword = Some(keyword.into());
        self
    }

    /// Run a plugin against this builder.
    pub fn apply(&mut self, spec: &PluginSpec) -> Result<&mut Self, RegistrationError> {
        spec.plugin()
            .apply(self, spec.options())
            .map_err(|reason| RegistrationError::Plugin {
                name: spec.plugin().name().to_string(),
                reason,
            })?;
        Ok(self)
    }

    pub fn build(self) -> SchemaEngine {
        SchemaEngine {
            options: self.options,
            validate_formats: self.validate_formats,
            formats: self.formats,
            shared: Arc::new(self.shared),
            messages: self.message_keyword.map(CustomMessages::new),
        }
    }
}

/// A configured schema engine.
///
/// Engines are `Send + Sync` and may be shared between plugin registrations
/// through an `Arc`, so shared definitions and formats are registered once.
pub struct SchemaEngine {
    options: EngineOptions,
    validate_formats: bool,
    formats: Vec<(String, FormatCheck)>,
    shared: Arc<HashMap<String, Value>>,
    messages: Option<CustomMessages>,
}

impl fmt::Debug for SchemaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaEngine")
            .field("options", &self.options)
            .field("validate_formats", &self.validate_formats)
            .field(
                "formats",
                &self.formats.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field("shared", &self.shared.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for SchemaEngine {
    fn default() -> Self {
        EngineBuilder::new(EngineOptions::default()).build()
    }
}

impl SchemaEngine {
    pub fn builder(options: EngineOptions) -> EngineBuilder {
        EngineBuilder::new(options)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Compile a schema.
    ///
    /// The schema is compiled as given; callers normalize shorthand first.
    pub fn compile(&self, schema: &Value) -> Result<CompiledValidator, String> {
        let mut opts = jsonschema::options();
        opts.with_draft(self.options.draft.into());
        opts.should_validate_formats(self.validate_formats);
        for (name, check) in &self.formats {
            let check = Arc::clone(check);
            opts.with_format(name.clone(), move |value: &str| check(value));
        }
        opts.with_retriever(SharedSchemaRetriever {
            schemas: Arc::clone(&self.shared),
        });

        let validator = opts.build(schema).map_err(|e| e.to_string())?;

        Ok(CompiledValidator {
            inner: Arc::new(CompiledInner {
                validator,
                schema: schema.clone(),
                shared: Arc::clone(&self.shared),
                preparation: Preparation {
                    coerce_types: self.options.coerce_types,
                    use_defaults: self.options.use_defaults,
                    remove_additional: self.options.remove_additional,
                },
                all_errors: self.options.all_errors,
                messages: self.messages.clone(),
            }),
        })
    }
}

/// Resolves `$ref` URIs against schemas registered on the engine.
///
/// Never touches the network: an unknown URI fails compilation.
struct SharedSchemaRetriever {
    schemas: Arc<HashMap<String, Value>>,
}

impl Retrieve for SharedSchemaRetriever {
    fn retrieve(
        &self,
        uri: &Uri<&str>,
    ) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
        let uri = uri.as_str().trim_end_matches('#');
        find_shared(&self.schemas, uri)
            .cloned()
            .ok_or_else(|| format!("schema '{uri}' is not registered with the engine").into())
    }
}

/// Look up a shared schema by URI.
///
/// Relative references resolve against the default base URI, so an unknown
/// URI falls back to matching on the final path segment.
pub(super) fn find_shared<'a>(
    schemas: &'a HashMap<String, Value>,
    uri: &str,
) -> Option<&'a Value> {
    if let Some(schema) = schemas.get(uri) {
        return Some(schema);
    }
    let filename = uri.rsplit('/').next().unwrap_or(uri);
    schemas
        .iter()
        .find(|(id, _)| id.rsplit('/').next() == Some(filename))
        .map(|(_, schema)| schema)
}

/// A compiled, immutable response validator.
#[derive(Clone)]
pub struct CompiledValidator {
    inner: Arc<CompiledInner>,
}

struct CompiledInner {
    validator: Validator,
    schema: Value,
    shared: Arc<HashMap<String, Value>>,
    preparation: Preparation,
    all_errors: bool,
    messages: Option<CustomMessages>,
}

impl fmt::Debug for CompiledValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledValidator")
            .field("schema", &self.inner.schema)
            .finish_non_exhaustive()
    }
}

impl CompiledValidator {
    /// The (normalized) schema this validator was compiled from.
    pub fn schema(&self) -> &Value {
        &self.inner.schema
    }

    /// Whether two handles share the same compiled state.
    pub fn ptr_eq(&self, other: &CompiledValidator) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Prepare `payload` in place, then validate it.
    pub fn validate(&self, payload: &mut Value) -> ValidationOutcome {
        let inner = &*self.inner;
        inner.preparation.apply(&inner.schema, &inner.shared, payload);

        let mut raw = Vec::new();
        for error in inner.validator.iter_errors(payload) {
            raw.push(RawViolation {
                instance_path: error.instance_path.to_string(),
                schema_path: error.schema_path.to_string(),
                message: error.to_string(),
            });
            if !inner.all_errors {
                break;
            }
        }

        if raw.is_empty() {
            return ValidationOutcome::passed();
        }

        let violations = match &inner.messages {
            Some(messages) => messages.apply(&inner.schema, raw),
            None => raw.into_iter().map(Violation::from).collect(),
        };
        ValidationOutcome::failed(violations)
    }
}
