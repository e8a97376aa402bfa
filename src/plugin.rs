//! Response validation as a router plugin.
//!
//! [`ResponseValidation`] is an [`OnRouteHook`]: for each route declaring a
//! response schema map (and not disabled), it compiles the map once and
//! appends a [`ResponseSchemaCheck`] to the route's pre-serialization checks.

use std::{collections::HashMap, fmt, sync::Arc};

use parking_lot::RwLock;
use serde_json::Value;

use crate::{
    config::ResponseValidationConfig,
    error::{RegistrationError, ResponseValidationError},
    router::{OnRouteHook, PreSerializationHook, ReplyContext, RequestHead, RouteId, RouteOptions},
    validation::{
        CompiledValidatorSet, EngineOptions, PluginCatalog, PluginSpec, SchemaEngine, compile,
        execute, resolve_validator,
    },
};

/// Where the schema engine comes from.
#[derive(Debug, Clone)]
pub enum EngineSource {
    /// A caller-built engine, possibly shared with other registrations.
    Prebuilt(Arc<SchemaEngine>),
    /// Build a new engine from options, applying plugins in order.
    Fresh {
        options: EngineOptions,
        plugins: Vec<PluginSpec>,
    },
}

impl Default for EngineSource {
    fn default() -> Self {
        Self::Fresh {
            options: EngineOptions::default(),
            plugins: Vec::new(),
        }
    }
}

impl EngineSource {
    pub fn build(self) -> Result<Arc<SchemaEngine>, RegistrationError> {
        match self {
            Self::Prebuilt(engine) => Ok(engine),
            Self::Fresh { options, plugins } => {
                let mut builder = SchemaEngine::builder(options);
                for spec in &plugins {
                    builder.apply(spec)?;
                }
                Ok(Arc::new(builder.build()))
            }
        }
    }
}

impl From<Arc<SchemaEngine>> for EngineSource {
    fn from(engine: Arc<SchemaEngine>) -> Self {
        Self::Prebuilt(engine)
    }
}

impl From<SchemaEngine> for EngineSource {
    fn from(engine: SchemaEngine) -> Self {
        Self::Prebuilt(Arc::new(engine))
    }
}

/// Plugin-wide settings, fixed at registration.
#[derive(Debug, Clone)]
pub struct PluginOptions {
    pub engine: EngineSource,
    /// Validate responses of routes that do not say otherwise.
    pub response_validation: bool,
    /// Reject responses whose status has no schema, unless a route says otherwise.
    pub response_status_code_validation: bool,
}

impl Default for PluginOptions {
    fn default() -> Self {
        Self {
            engine: EngineSource::default(),
            response_validation: true,
            response_status_code_validation: false,
        }
    }
}

/// The response validation plugin.
pub struct ResponseValidation {
    engine: Arc<SchemaEngine>,
    response_validation: bool,
    response_status_code_validation: bool,
    routes: RwLock<HashMap<RouteId, Arc<CompiledValidatorSet>>>,
}

impl fmt::Debug for ResponseValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseValidation")
            .field("engine", &self.engine)
            .field("response_validation", &self.response_validation)
            .field(
                "response_status_code_validation",
                &self.response_status_code_validation,
            )
            .field("routes", &self.routes.read().len())
            .finish()
    }
}

impl ResponseValidation {
    pub fn new(options: PluginOptions) -> Result<Arc<Self>, RegistrationError> {
        Ok(Arc::new(Self {
            engine: options.engine.build()?,
            response_validation: options.response_validation,
            response_status_code_validation: options.response_status_code_validation,
            routes: RwLock::new(HashMap::new()),
        }))
    }

    /// Build from loaded configuration, resolving plugins through `catalog`.
    pub fn from_config(
        config: &ResponseValidationConfig,
        catalog: &PluginCatalog,
    ) -> Result<Arc<Self>, RegistrationError> {
        let plugins = catalog.resolve(&config.engine.plugins)?;
        Self::new(PluginOptions {
            engine: EngineSource::Fresh {
                options: config.engine.options(),
                plugins,
            },
            response_validation: config.response_validation,
            response_status_code_validation: config.response_status_code_validation,
        })
    }

    pub fn engine(&self) -> &Arc<SchemaEngine> {
        &self.engine
    }

    /// Validators compiled for `route`, if it was registered with validation on.
    pub fn compiled_for(&self, route: &RouteId) -> Option<Arc<CompiledValidatorSet>> {
        self.routes.read().get(route).cloned()
    }
}

impl OnRouteHook for ResponseValidation {
    fn on_route(&self, route: &mut RouteOptions) -> Result<(), RegistrationError> {
        let Some(schemas) = &route.schema.response else {
            return Ok(());
        };
        if !route.response_validation.unwrap_or(self.response_validation) {
            return Ok(());
        }
        let strict_status_codes = route
            .response_status_code_validation
            .unwrap_or(self.response_status_code_validation);

        let id = route.id();
        let validators = compile(schemas, &self.engine)
            .map(Arc::new)
            .map_err(|source| RegistrationError::Route {
                route: id.to_string(),
                source,
            })?;

        self.routes.write().insert(id, Arc::clone(&validators));
        route.pre_serialization.push(Arc::new(ResponseSchemaCheck {
            validators,
            strict_status_codes,
        }));
        Ok(())
    }
}

/// Validates a route's payloads against its compiled schemas.
#[derive(Debug, Clone)]
pub struct ResponseSchemaCheck {
    validators: Arc<CompiledValidatorSet>,
    strict_status_codes: bool,
}

impl ResponseSchemaCheck {
    pub fn new(validators: Arc<CompiledValidatorSet>, strict_status_codes: bool) -> Self {
        Self {
            validators,
            strict_status_codes,
        }
    }
}

impl PreSerializationHook for ResponseSchemaCheck {
    /// Resolution errors still need the check to run so they can be reported.
    fn needs_payload(&self, reply: &ReplyContext) -> bool {
        !matches!(
            resolve_validator(
                &self.validators,
                reply.status().as_u16(),
                reply.content_type(),
                self.strict_status_codes,
            ),
            Ok(None)
        )
    }

    fn check(
        &self,
        _request: &RequestHead,
        reply: &mut ReplyContext,
        payload: &mut Value,
    ) -> Result<(), ResponseValidationError> {
        let result = resolve_validator(
            &self.validators,
            reply.status().as_u16(),
            reply.content_type(),
            self.strict_status_codes,
        )
        .and_then(|validator| match validator {
            None => Ok(()),
            Some(validator) => {
                let outcome = execute(validator, payload);
                if outcome.valid {
                    Ok(())
                } else {
                    Err(ResponseValidationError::validation_failed(outcome.errors))
                }
            }
        });

        if let Err(err) = &result {
            reply.set_status(err.status_code());
        }
        result
    }
}
