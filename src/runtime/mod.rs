pub mod backend;
pub mod cache;
pub mod engine;

pub use backend::{
    build_http_client, method_for_body, BackendError, ForwardRequest, HttpBackend, StepInvoker,
    StepRequest, StepResponse, UpstreamResponse,
};
pub use cache::{Clock, LoadError, PipelineCache, SystemClock};
pub use engine::{Engine, EngineError, PipelineOutput};
