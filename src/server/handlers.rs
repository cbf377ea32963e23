use std::any::Any;
use std::net::SocketAddr;

use axum::{
    body::{Body, Bytes},
    extract::{ConnectInfo, DefaultBodyLimit, FromRequest, Request, State},
    http::{header, HeaderMap, HeaderValue},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::runtime::backend::REQUEST_ID_HEADER;
use crate::runtime::{ForwardRequest, PipelineOutput, StepRequest};
use crate::server::auth::auth_middleware;
use crate::server::error::GatewayError;
use crate::server::routes::{resolve_route, RouteTarget};
use crate::server::state::AppState;

/// Largest inbound body buffered for proxying or orchestration
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Liveness probe
pub async fn health() -> &'static str {
    "OK"
}

/// Service descriptor
pub async fn service_info(State(state): State<AppState>) -> Json<Value> {
    let config = &state.config;
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "description": env!("CARGO_PKG_DESCRIPTION"),
        "auth": if config.auth_enabled() { "bearer" } else { "none" },
        "backends": {
            "network": config.network,
            "port": config.backend_port,
        },
        "pipelines": {
            "store": state.cache.store().describe(),
            "cached": state.cache.len(),
            "cache_ttl_ms": config.cache_ttl.as_millis() as u64,
        },
        "endpoints": [
            "GET /health",
            "GET /",
            "ANY /<backend>[/path]",
            "ANY /orchestrate/<pipeline>[/path]",
        ],
    }))
}

/// Reuse the caller's request id when it is a UUID, otherwise mint one.
fn request_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s).ok())
        .unwrap_or_else(Uuid::new_v4)
        .to_string()
}

/// Everything that is not `/` or `/health`: proxy to a backend or run a pipeline.
pub async fn dispatch(State(state): State<AppState>, request: Request) -> Response {
    let id = request_id(request.headers());
    let span = info_span!("request", request_id = %id, method = %request.method());

    let result = async {
        match resolve_route(request.uri().path()) {
            RouteTarget::Orchestrate { pipeline, sub_path } => {
                orchestrate(&state, &pipeline, sub_path, request, &id).await
            }
            RouteTarget::Backend { name, sub_path } => {
                proxy(&state, &name, sub_path, request, &id).await
            }
            RouteTarget::MissingPipeline => Err(GatewayError::MissingPipelineName),
            RouteTarget::NotFound => Err(GatewayError::NotFound),
        }
    }
    .instrument(span)
    .await;

    let mut response = result.unwrap_or_else(IntoResponse::into_response);
    if let Ok(value) = HeaderValue::from_str(&id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Buffer the body under the router's `DefaultBodyLimit`.
async fn read_body(request: Request) -> Result<Bytes, GatewayError> {
    Ok(Bytes::from_request(request, &()).await?)
}

/// Method-mismatch on `/` and `/health`
async fn method_not_allowed() -> GatewayError {
    GatewayError::MethodNotAllowed
}

async fn proxy(
    state: &AppState,
    backend: &str,
    sub_path: String,
    request: Request,
    request_id: &str,
) -> Result<Response, GatewayError> {
    let client_ip = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());
    let method = request.method().clone();
    let query = request.uri().query().map(str::to_string);
    let headers = request.headers().clone();
    let body = read_body(request).await?;

    let upstream = state
        .backend
        .forward(
            backend,
            ForwardRequest {
                method,
                sub_path,
                query,
                headers,
                body,
                client_ip,
                request_id: request_id.to_string(),
            },
        )
        .await?;

    info!(backend, status = upstream.status.as_u16(), "Proxied request");

    let mut response = Response::new(Body::from(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    Ok(response)
}

async fn orchestrate(
    state: &AppState,
    pipeline_name: &str,
    sub_path: String,
    request: Request,
    request_id: &str,
) -> Result<Response, GatewayError> {
    let pipeline = state.cache.get(pipeline_name).await?;

    let method = request.method().clone();
    let query = request.uri().query().map(str::to_string);
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = read_body(request).await?;

    let step_request = StepRequest {
        method,
        sub_path,
        query,
        content_type,
        body,
        request_id: Some(request_id.to_string()),
    };

    info!(
        pipeline = pipeline_name,
        mode = %pipeline.mode,
        steps = pipeline.steps.len(),
        "Executing pipeline"
    );
    let output = state.engine.execute(&pipeline, step_request).await?;
    Ok(output.into_response())
}

impl IntoResponse for PipelineOutput {
    fn into_response(self) -> Response {
        match self {
            PipelineOutput::Relay(step) => {
                let mut response = Response::new(Body::from(step.body));
                *response.status_mut() = step.status;
                if let Some(value) = step
                    .content_type
                    .and_then(|ct| HeaderValue::from_str(&ct).ok())
                {
                    response.headers_mut().insert(header::CONTENT_TYPE, value);
                }
                response
            }
            PipelineOutput::Merged(value) => Json(value).into_response(),
        }
    }
}

/// Turn a handler panic into the uniform 500 envelope.
fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let message = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Internal Server Error".to_string()
    };
    GatewayError::Internal(message).into_response()
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/", get(service_info))
        .fallback(dispatch)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
