use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Characters allowed in a backend (and therefore step) name.
static BACKEND_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static regex"));

/// Errors that can occur while parsing a stored pipeline document
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Malformed pipeline document: {0}")]
    Malformed(String),

    #[error("Invalid pipeline mode '{0}': expected 'sequential' or 'parallel'")]
    InvalidMode(String),

    #[error("Pipeline has no steps")]
    EmptySteps,

    #[error("Invalid step name '{0}': must match [a-zA-Z0-9_-]+")]
    InvalidStep(String),
}

impl PipelineError {
    /// True for documents that parsed but describe an unusable pipeline.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(self, PipelineError::Malformed(_))
    }
}

/// How the steps of a pipeline are executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Each step's response feeds the next step
    Sequential,
    /// Every step gets the original input; results are merged by step name
    Parallel,
}

impl ExecutionMode {
    pub fn parse(value: &str) -> Result<Self, PipelineError> {
        match value {
            "sequential" => Ok(Self::Sequential),
            "parallel" => Ok(Self::Parallel),
            other => Err(PipelineError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => f.write_str("sequential"),
            Self::Parallel => f.write_str("parallel"),
        }
    }
}

/// Wire shape of a stored pipeline, before validation
#[derive(Debug, Deserialize)]
struct PipelineDocument {
    mode: String,
    steps: Vec<String>,
}

/// A validated pipeline definition. Immutable once constructed.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    pub mode: ExecutionMode,
    pub steps: Vec<String>,
}

impl Pipeline {
    /// Parse and validate a pipeline document.
    /// This is a pure function - no I/O.
    pub fn from_json(bytes: &[u8]) -> Result<Self, PipelineError> {
        let doc: PipelineDocument =
            serde_json::from_slice(bytes).map_err(|e| PipelineError::Malformed(e.to_string()))?;

        let mode = ExecutionMode::parse(&doc.mode)?;

        if doc.steps.is_empty() {
            return Err(PipelineError::EmptySteps);
        }

        if let Some(bad) = doc.steps.iter().find(|s| !is_valid_backend_name(s)) {
            return Err(PipelineError::InvalidStep(bad.clone()));
        }

        Ok(Self {
            mode,
            steps: doc.steps,
        })
    }
}

/// Whether `name` can be used as a backend host on the private network.
pub fn is_valid_backend_name(name: &str) -> bool {
    BACKEND_NAME.is_match(name)
}
