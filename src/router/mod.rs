//! Route registration for axum with per-route pre-serialization checks.
//!
//! [`ValidatedRouter`] wraps an [`axum::Router`]. Every route is described by
//! [`RouteOptions`]; registered [`OnRouteHook`]s see those options once, when
//! the route is added, and may append [`PreSerializationHook`]s to it. If a
//! route ends up with any checks, a middleware runs them against the handler's
//! payload before the response leaves the route.
//!
//! ```ignore
//! let validation = ResponseValidation::new(PluginOptions::default())?;
//! let app = ValidatedRouter::new()
//!     .register(validation)
//!     .route(
//!         RouteOptions::get("/answer").response(
//!             ResponseSchemaMap::new().with("2xx", json!({ "answer": { "type": "number" } })),
//!         ),
//!         || async { Json(json!({ "answer": 42 })) },
//!     )?
//!     .into_router();
//! ```

mod pre_serialization;

use std::{fmt, sync::Arc};

use axum::{
    Router,
    handler::Handler,
    http::{HeaderMap, Method, StatusCode, Uri, header::CONTENT_TYPE},
    middleware,
    routing::{MethodFilter, on},
};
use serde_json::Value;

use self::pre_serialization::{PreSerializationPipeline, run_pre_serialization};
use crate::{
    config::ResponseValidationConfig,
    error::{RegistrationError, ResponseValidationError},
    validation::ResponseSchemaMap,
};

/// Upper bound on buffered response bodies (16 MiB).
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 16 * 1024 * 1024;

/// The parts of the request a check may inspect.
#[derive(Debug, Clone)]
pub struct RequestHead {
    pub method: Method,
    pub uri: Uri,
}

/// The response being produced: a settable status and its headers.
#[derive(Debug, Clone)]
pub struct ReplyContext {
    status: StatusCode,
    headers: HeaderMap,
}

impl ReplyContext {
    pub fn new(status: StatusCode, headers: HeaderMap) -> Self {
        Self { status, headers }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    /// The `Content-Type` header, if present and valid ASCII.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn into_parts(self) -> (StatusCode, HeaderMap) {
        (self.status, self.headers)
    }
}

/// A check run against a handler's payload before it is sent.
///
/// Returning an error aborts the response; the error is rendered in place of
/// the handler's output.
pub trait PreSerializationHook: Send + Sync {
    /// Whether this check has anything to do for the reply as emitted.
    ///
    /// When no check of a route needs the payload, the response is forwarded
    /// untouched and its body is never buffered.
    fn needs_payload(&self, _reply: &ReplyContext) -> bool {
        true
    }

    fn check(
        &self,
        request: &RequestHead,
        reply: &mut ReplyContext,
        payload: &mut Value,
    ) -> Result<(), ResponseValidationError>;
}

/// Invoked once per route while it is being registered.
pub trait OnRouteHook: Send + Sync {
    fn on_route(&self, route: &mut RouteOptions) -> Result<(), RegistrationError>;
}

/// Identity of a registered route.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteId {
    pub method: Method,
    pub url: String,
}

impl RouteId {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
        }
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

/// Schemas declared on a route.
#[derive(Debug, Clone, Default)]
pub struct RouteSchema {
    pub response: Option<ResponseSchemaMap>,
}

/// Everything known about a route at registration time.
#[derive(Clone)]
pub struct RouteOptions {
    pub method: Method,
    pub url: String,
    pub schema: RouteSchema,
    /// Overrides the plugin-wide `response_validation` flag.
    pub response_validation: Option<bool>,
    /// Overrides the plugin-wide `response_status_code_validation` flag.
    pub response_status_code_validation: Option<bool>,
    /// Checks run in order before the response is sent.
    pub pre_serialization: Vec<Arc<dyn PreSerializationHook>>,
}

impl fmt::Debug for RouteOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteOptions")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("schema", &self.schema)
            .field("response_validation", &self.response_validation)
            .field(
                "response_status_code_validation",
                &self.response_status_code_validation,
            )
            .field("pre_serialization", &self.pre_serialization.len())
            .finish()
    }
}

impl RouteOptions {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            schema: RouteSchema::default(),
            response_validation: None,
            response_status_code_validation: None,
            pre_serialization: Vec::new(),
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::POST, url)
    }

    pub fn put(url: impl Into<String>) -> Self {
        Self::new(Method::PUT, url)
    }

    pub fn patch(url: impl Into<String>) -> Self {
        Self::new(Method::PATCH, url)
    }

    pub fn delete(url: impl Into<String>) -> Self {
        Self::new(Method::DELETE, url)
    }

    /// Declare the response schema map.
    pub fn response(mut self, schemas: ResponseSchemaMap) -> Self {
        self.schema.response = Some(schemas);
        self
    }

    pub fn response_validation(mut self, enabled: bool) -> Self {
        self.response_validation = Some(enabled);
        self
    }

    pub fn response_status_code_validation(mut self, enabled: bool) -> Self {
        self.response_status_code_validation = Some(enabled);
        self
    }

    pub fn pre_serialization(mut self, hook: Arc<dyn PreSerializationHook>) -> Self {
        self.pre_serialization.push(hook);
        self
    }

    pub fn id(&self) -> RouteId {
        RouteId::new(self.method.clone(), self.url.clone())
    }
}

/// An axum router whose routes pass through registration hooks.
pub struct ValidatedRouter<S = ()> {
    router: Router<S>,
    hooks: Vec<Arc<dyn OnRouteHook>>,
    max_payload_bytes: usize,
}

impl<S> Default for ValidatedRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<S> ValidatedRouter<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            router: Router::new(),
            hooks: Vec::new(),
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
        }
    }

    /// Router using the payload limit from `config`.
    pub fn from_config(config: &ResponseValidationConfig) -> Self {
        Self::new().max_payload_bytes(config.max_payload_bytes)
    }

    /// Limit on response bodies buffered for checks. Larger bodies fail with 500.
    pub fn max_payload_bytes(mut self, limit: usize) -> Self {
        self.max_payload_bytes = limit;
        self
    }

    /// Add a registration hook. It only sees routes added after this call.
    pub fn register(mut self, hook: Arc<dyn OnRouteHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    /// Run registration hooks for `options`, then mount `handler`.
    ///
    /// A hook error fails registration and the route is not mounted.
    pub fn route<H, T>(
        mut self,
        mut options: RouteOptions,
        handler: H,
    ) -> Result<Self, RegistrationError>
    where
        H: Handler<T, S>,
        T: 'static,
    {
        for hook in &self.hooks {
            hook.on_route(&mut options)?;
        }

        let id = options.id();
        let filter = MethodFilter::try_from(options.method.clone()).map_err(|_| {
            RegistrationError::UnsupportedMethod {
                route: id.to_string(),
            }
        })?;

        let mut method_router = on(filter, handler);
        if !options.pre_serialization.is_empty() {
            tracing::debug!(
                route = %id,
                checks = options.pre_serialization.len(),
                "Pre-serialization checks attached to route"
            );
            let pipeline = PreSerializationPipeline::new(
                id,
                options.pre_serialization,
                self.max_payload_bytes,
            );
            method_router = method_router.layer(middleware::from_fn_with_state(
                Arc::new(pipeline),
                run_pre_serialization,
            ));
        }

        self.router = self.router.route(&options.url, method_router);
        Ok(self)
    }

    /// Merge routes that skip registration hooks entirely.
    pub fn merge(mut self, other: Router<S>) -> Self {
        self.router = self.router.merge(other);
        self
    }

    pub fn into_router(self) -> Router<S> {
        self.router
    }
}
