use std::sync::Arc;

use axum::body::Bytes;
use axum::http::StatusCode;
use futures::future::join_all;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ExecutionMode, Pipeline};
use crate::runtime::backend::{BackendError, StepInvoker, StepRequest, StepResponse};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Pipeline has no steps")]
    EmptyPipeline,

    /// A sequential step answered outside the 2xx range.
    #[error("Step '{step}' failed with status {status}")]
    StepFailed {
        step: String,
        status: StatusCode,
        content_type: Option<String>,
        body: Bytes,
    },

    /// A sequential step could not be reached or timed out.
    #[error("Step '{step}' unreachable: {source}")]
    StepUnreachable {
        step: String,
        #[source]
        source: BackendError,
    },

    /// At least one parallel step failed; sibling results are discarded.
    #[error("Parallel execution failed at step '{step}': {message}")]
    ParallelFailed {
        step: String,
        status: Option<StatusCode>,
        message: String,
    },
}

/// Result of running a pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineOutput {
    /// Final step's response, passed through unchanged (sequential mode)
    Relay(StepResponse),
    /// Step results keyed by step name (parallel mode)
    Merged(Value),
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// Whether a content type denotes JSON (`application/json`, `application/*+json`).
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|ct| ct.split(';').next())
        .map(|mime| {
            let mime = mime.trim().to_ascii_lowercase();
            mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
        })
        .unwrap_or(false)
}

/// Decode a step body: JSON when declared and well-formed, otherwise text.
pub fn decode_body(content_type: Option<&str>, body: &[u8]) -> Value {
    if is_json_content_type(content_type) {
        if let Ok(value) = serde_json::from_slice(body) {
            return value;
        }
    }
    Value::String(String::from_utf8_lossy(body).into_owned())
}

/// Merge successful parallel results into one object keyed by step name.
pub fn merge_results(results: &[(String, StepResponse)]) -> Value {
    let mut merged = Map::new();
    for (step, response) in results {
        merged.insert(
            step.clone(),
            decode_body(response.content_type.as_deref(), &response.body),
        );
    }
    Value::Object(merged)
}

// ============================================================================
// Execution
// ============================================================================

/// Runs pipeline steps against backends.
pub struct Engine {
    invoker: Arc<dyn StepInvoker>,
}

impl Engine {
    pub fn new(invoker: Arc<dyn StepInvoker>) -> Self {
        Self { invoker }
    }

    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        request: StepRequest,
    ) -> Result<PipelineOutput, EngineError> {
        if pipeline.steps.is_empty() {
            return Err(EngineError::EmptyPipeline);
        }

        match pipeline.mode {
            ExecutionMode::Sequential => self
                .run_sequential(&pipeline.steps, request)
                .await
                .map(PipelineOutput::Relay),
            ExecutionMode::Parallel => self
                .run_parallel(&pipeline.steps, request)
                .await
                .map(PipelineOutput::Merged),
        }
    }

    /// Each step gets the previous step's body and content type. Stops at the
    /// first non-2xx answer; earlier steps are not compensated.
    async fn run_sequential(
        &self,
        steps: &[String],
        request: StepRequest,
    ) -> Result<StepResponse, EngineError> {
        let mut current = request;
        let mut last: Option<StepResponse> = None;

        for (index, step) in steps.iter().enumerate() {
            debug!(step = %step, index, "Running sequential step");

            let response = self.invoker.invoke(step, &current).await.map_err(|source| {
                warn!(step = %step, error = %source, "Sequential step unreachable");
                EngineError::StepUnreachable {
                    step: step.clone(),
                    source,
                }
            })?;

            if !response.is_success() {
                warn!(step = %step, status = response.status.as_u16(), "Sequential step failed");
                return Err(EngineError::StepFailed {
                    step: step.clone(),
                    status: response.status,
                    content_type: response.content_type,
                    body: response.body,
                });
            }

            current = current.with_payload(response.content_type.clone(), response.body.clone());
            last = Some(response);
        }

        let last = last.ok_or(EngineError::EmptyPipeline)?;
        info!(steps = steps.len(), "Sequential pipeline completed");
        Ok(last)
    }

    /// Every step gets the original payload. All calls are awaited before the
    /// outcome is decided, so the result does not depend on completion order.
    async fn run_parallel(
        &self,
        steps: &[String],
        request: StepRequest,
    ) -> Result<Value, EngineError> {
        let calls = steps.iter().map(|step| {
            let request = &request;
            async move { (step.clone(), self.invoker.invoke(step, request).await) }
        });
        let outcomes = join_all(calls).await;

        let mut results = Vec::with_capacity(outcomes.len());
        for (step, outcome) in outcomes {
            match outcome {
                Ok(response) if response.is_success() => results.push((step, response)),
                Ok(response) => {
                    warn!(step = %step, status = response.status.as_u16(), "Parallel step failed");
                    return Err(EngineError::ParallelFailed {
                        message: format!("step returned status {}", response.status.as_u16()),
                        step,
                        status: Some(response.status),
                    });
                }
                Err(err) => {
                    warn!(step = %step, error = %err, "Parallel step unreachable");
                    return Err(EngineError::ParallelFailed {
                        step,
                        status: None,
                        message: err.to_string(),
                    });
                }
            }
        }

        info!(steps = results.len(), "Parallel pipeline completed");
        Ok(merge_results(&results))
    }
}
