//! Boundary errors and the uniform JSON error envelope
//!
//! Every failure leaves the gateway as `{"error": "...", ...detail}` with a
//! status that matches its class: auth 401, routing 400/404/405, configuration
//! 400, store 500, upstream 502.

use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{error, warn};

use crate::runtime::engine::decode_body;
use crate::runtime::{BackendError, EngineError, LoadError};

pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized - Invalid or missing Bearer token";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{}", UNAUTHORIZED_MESSAGE)]
    Unauthorized,

    #[error("Pipeline name is required: use /orchestrate/<pipeline>")]
    MissingPipelineName,

    #[error("Not Found")]
    NotFound,

    #[error("Method Not Allowed")]
    MethodNotAllowed,

    /// Over the body limit (413) or the client stream failed (400)
    #[error("Request body could not be read: {0}")]
    Body(#[from] BytesRejection),

    #[error(transparent)]
    Upstream(#[from] BackendError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Internal(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::MissingPipelineName => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::Body(rejection) => rejection.status(),
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
            Self::Load(LoadError::Invalid(e)) if e.is_configuration_error() => {
                StatusCode::BAD_REQUEST
            }
            Self::Load(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Engine(EngineError::EmptyPipeline) => StatusCode::BAD_REQUEST,
            Self::Engine(EngineError::StepFailed { status, .. }) => *status,
            Self::Engine(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// JSON envelope for this error.
    pub fn body(&self) -> Value {
        match self {
            Self::Upstream(err) => json!({
                "error": format!("Bad Gateway - backend '{}' is unavailable", err.backend()),
                "backend": err.backend(),
                "details": err.to_string(),
            }),
            Self::Engine(EngineError::StepFailed {
                step,
                status,
                content_type,
                body,
            }) => json!({
                "error": "Step failed",
                "step": step,
                "status": status.as_u16(),
                "body": decode_body(content_type.as_deref(), body),
            }),
            Self::Engine(EngineError::StepUnreachable { step, source }) => json!({
                "error": "Step unreachable",
                "step": step,
                "details": source.to_string(),
            }),
            Self::Engine(EngineError::ParallelFailed {
                step,
                status,
                message,
            }) => {
                let mut body = json!({
                    "error": "Parallel execution failed",
                    "step": step,
                    "details": message,
                });
                if let Some(status) = status {
                    body["status"] = json!(status.as_u16());
                }
                body
            }
            other => json!({ "error": other.to_string() }),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "Request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "Request rejected");
        }
        (status, Json(self.body())).into_response()
    }
}
