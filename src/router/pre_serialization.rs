//! Middleware running a route's pre-serialization checks.
//!
//! axum handlers serialize eagerly, so the body is buffered and parsed back
//! into a JSON value for the checks. Responses no check is interested in are
//! forwarded without buffering. An unchanged payload is forwarded as the
//! original bytes; a payload changed by a check is re-serialized.

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{Request, State},
    http::{StatusCode, header::CONTENT_LENGTH},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use super::{PreSerializationHook, ReplyContext, RequestHead, RouteId};

pub(super) struct PreSerializationPipeline {
    route: RouteId,
    hooks: Vec<Arc<dyn PreSerializationHook>>,
    max_payload_bytes: usize,
}

impl PreSerializationPipeline {
    pub(super) fn new(
        route: RouteId,
        hooks: Vec<Arc<dyn PreSerializationHook>>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            route,
            hooks,
            max_payload_bytes,
        }
    }

    async fn process(&self, request: &RequestHead, response: Response) -> Response {
        let (mut parts, body) = response.into_parts();
        let emitted = parts.status;
        let mut reply = ReplyContext::new(parts.status, std::mem::take(&mut parts.headers));

        if !self.hooks.iter().any(|hook| hook.needs_payload(&reply)) {
            let (_, headers) = reply.into_parts();
            parts.headers = headers;
            return Response::from_parts(parts, body);
        }

        let bytes = match axum::body::to_bytes(body, self.max_payload_bytes).await {
            Ok(b) => b,
            Err(e) => {
                tracing::error!(
                    route = %self.route,
                    error = %e,
                    limit = self.max_payload_bytes,
                    "Failed to buffer response body for pre-serialization checks"
                );
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            }
        };

        let original = parse_payload(&bytes);
        let mut payload = original.clone();

        for hook in &self.hooks {
            if let Err(err) = hook.check(request, &mut reply, &mut payload) {
                tracing::warn!(
                    route = %self.route,
                    status = emitted.as_u16(),
                    code = err.code(),
                    error = %err,
                    "Response rejected before serialization"
                );
                return err.into_response();
            }
        }

        let (status, headers) = reply.into_parts();
        parts.status = status;
        parts.headers = headers;

        if payload == original {
            return Response::from_parts(parts, Body::from(bytes));
        }

        match serde_json::to_vec(&payload) {
            Ok(serialized) => {
                parts.headers.remove(CONTENT_LENGTH);
                Response::from_parts(parts, Body::from(serialized))
            }
            Err(e) => {
                tracing::error!(
                    route = %self.route,
                    error = %e,
                    "Failed to re-serialize checked payload"
                );
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}

/// Empty bodies become `null`; bodies that are not JSON become a string.
fn parse_payload(bytes: &Bytes) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

pub(super) async fn run_pre_serialization(
    State(pipeline): State<Arc<PreSerializationPipeline>>,
    request: Request,
    next: Next,
) -> Response {
    let head = RequestHead {
        method: request.method().clone(),
        uri: request.uri().clone(),
    };
    let response = next.run(request).await;
    pipeline.process(&head, response).await
}
