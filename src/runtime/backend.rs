//! Calls into backend processes on the private network
//!
//! A backend named `<name>` is reached at `http://<name>:<backend_port>`. The
//! same client serves direct proxying and pipeline steps, so both share the
//! fixed connect/read/overall deadlines.

use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use thiserror::Error;
use tracing::{debug, warn};

pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(60);

pub const REQUEST_ID_HEADER: &str = "x-request-id";

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
static X_REAL_IP: HeaderName = HeaderName::from_static("x-real-ip");
static X_REQUEST_ID: HeaderName = HeaderName::from_static(REQUEST_ID_HEADER);

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BackendError {
    #[error("Backend '{backend}' is unreachable: {message}")]
    Unreachable { backend: String, message: String },

    #[error("Backend '{backend}' timed out: {message}")]
    Timeout { backend: String, message: String },
}

impl BackendError {
    pub fn backend(&self) -> &str {
        match self {
            Self::Unreachable { backend, .. } | Self::Timeout { backend, .. } => backend,
        }
    }

    fn from_reqwest(backend: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                backend: backend.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::Unreachable {
                backend: backend.to_string(),
                message: err.to_string(),
            }
        }
    }
}

/// Input to one pipeline step
#[derive(Debug, Clone)]
pub struct StepRequest {
    pub method: Method,
    /// Path forwarded to the backend, always starting with `/`
    pub sub_path: String,
    pub query: Option<String>,
    pub content_type: Option<String>,
    pub body: Bytes,
    pub request_id: Option<String>,
}

impl StepRequest {
    /// The same call carrying a different payload.
    pub fn with_payload(&self, content_type: Option<String>, body: Bytes) -> Self {
        Self {
            content_type,
            body,
            ..self.clone()
        }
    }
}

/// Output of one pipeline step, body fully consumed
#[derive(Debug, Clone, PartialEq)]
pub struct StepResponse {
    pub status: StatusCode,
    pub content_type: Option<String>,
    pub body: Bytes,
}

impl StepResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Raw upstream answer for direct proxying
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Everything needed to replay an inbound request against a backend
#[derive(Debug)]
pub struct ForwardRequest {
    pub method: Method,
    pub sub_path: String,
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_ip: Option<IpAddr>,
    pub request_id: String,
}

// ============================================================================
// SBIO: Pure functions (no I/O)
// ============================================================================

/// Method to use for an outgoing step call.
///
/// Any non-empty body is sent with POST, whatever the inbound method was;
/// bodiless calls keep the inbound method.
pub fn method_for_body(method: &Method, has_body: bool) -> Method {
    if has_body {
        Method::POST
    } else {
        method.clone()
    }
}

/// `http://<host>:<port><sub_path>[?query]`
pub fn backend_url(host: &str, port: u16, sub_path: &str, query: Option<&str>) -> String {
    let path = if sub_path.is_empty() { "/" } else { sub_path };
    match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("http://{}:{}{}?{}", host, port, path, q),
        None => format!("http://{}:{}{}", host, port, path),
    }
}

/// Headers that describe a single connection and must not be relayed.
pub fn is_hop_by_hop(name: &str) -> bool {
    matches!(
        name,
        "connection"
            | "keep-alive"
            | "proxy-authenticate"
            | "proxy-authorization"
            | "te"
            | "trailers"
            | "transfer-encoding"
            | "upgrade"
            | "host"
            | "content-length"
    )
}

/// Copy end-to-end headers and add the forwarding set
/// (`X-Forwarded-For`, `X-Forwarded-Proto`, `X-Real-IP`, `X-Request-Id`).
pub fn forwarding_headers(
    incoming: &HeaderMap,
    client_ip: Option<IpAddr>,
    request_id: &str,
) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in incoming {
        if !is_hop_by_hop(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }

    if let Some(ip) = client_ip {
        let chain = match incoming
            .get(&X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
        {
            Some(existing) if !existing.trim().is_empty() => format!("{}, {}", existing, ip),
            _ => ip.to_string(),
        };
        if let Ok(value) = HeaderValue::from_str(&chain) {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            headers.insert(X_REAL_IP.clone(), value);
        }
    }

    if !headers.contains_key(&X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));
    }

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(X_REQUEST_ID.clone(), value);
    }

    headers
}

/// Upstream response headers that may be relayed to the caller.
pub fn response_headers(upstream: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (name, value) in upstream {
        if !is_hop_by_hop(name.as_str()) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait StepInvoker: Send + Sync {
    /// Call backend `step` once and consume its whole response.
    async fn invoke(&self, step: &str, request: &StepRequest) -> Result<StepResponse, BackendError>;
}

// ============================================================================
// SBIO: I/O implementation (real HTTP client)
// ============================================================================

/// Build the shared outbound client with the fixed upstream deadlines.
/// Redirects are never followed: a backend's 3xx is its answer.
pub fn build_http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .connect_timeout(CONNECT_TIMEOUT)
        .read_timeout(READ_TIMEOUT)
        .timeout(WRITE_TIMEOUT + READ_TIMEOUT)
        .build()
}

#[derive(Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    port: u16,
}

impl HttpBackend {
    pub fn new(client: reqwest::Client, port: u16) -> Self {
        Self { client, port }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Replay an inbound request against `backend` without touching the body.
    pub async fn forward(
        &self,
        backend: &str,
        request: ForwardRequest,
    ) -> Result<UpstreamResponse, BackendError> {
        let url = backend_url(backend, self.port, &request.sub_path, request.query.as_deref());
        let headers = forwarding_headers(&request.headers, request.client_ip, &request.request_id);

        debug!(backend, method = %request.method, %url, "Proxying request");

        let response = self
            .client
            .request(request.method, &url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(|e| BackendError::from_reqwest(backend, e))?;

        let status = response.status();
        let headers = response_headers(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_reqwest(backend, e))?;

        Ok(UpstreamResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl StepInvoker for HttpBackend {
    async fn invoke(&self, step: &str, request: &StepRequest) -> Result<StepResponse, BackendError> {
        let url = backend_url(step, self.port, &request.sub_path, request.query.as_deref());
        let method = method_for_body(&request.method, !request.body.is_empty());

        debug!(step, %method, %url, "Invoking pipeline step");

        let mut call = self
            .client
            .request(method, &url)
            .header(header::ACCEPT, "application/json");
        if let Some(ct) = &request.content_type {
            call = call.header(header::CONTENT_TYPE, ct);
        }
        if let Some(id) = &request.request_id {
            call = call.header(REQUEST_ID_HEADER, id);
        }
        if !request.body.is_empty() {
            call = call.body(request.body.clone());
        }

        let response = call.send().await.map_err(|e| {
            warn!(step, error = %e, "Pipeline step call failed");
            BackendError::from_reqwest(step, e)
        })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| BackendError::from_reqwest(step, e))?;

        Ok(StepResponse {
            status,
            content_type,
            body,
        })
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Scripted answer for one backend
    #[derive(Clone)]
    pub enum MockReply {
        Respond {
            status: StatusCode,
            content_type: Option<String>,
            body: String,
        },
        Unreachable,
        /// Answer with the request payload unchanged
        Echo,
    }

    impl MockReply {
        pub fn json(status: u16, body: &str) -> Self {
            Self::Respond {
                status: StatusCode::from_u16(status).unwrap(),
                content_type: Some("application/json".to_string()),
                body: body.to_string(),
            }
        }

        pub fn text(status: u16, body: &str) -> Self {
            Self::Respond {
                status: StatusCode::from_u16(status).unwrap(),
                content_type: Some("text/plain".to_string()),
                body: body.to_string(),
            }
        }
    }

    /// Invoker that replays scripted replies and records every call in order.
    #[derive(Default)]
    pub struct MockInvoker {
        replies: HashMap<String, MockReply>,
        calls: Mutex<Vec<(String, StepRequest)>>,
    }

    impl MockInvoker {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn reply(mut self, step: &str, reply: MockReply) -> Self {
            self.replies.insert(step.to_string(), reply);
            self
        }

        pub fn calls(&self) -> Vec<(String, StepRequest)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn called_steps(&self) -> Vec<String> {
            self.calls().into_iter().map(|(step, _)| step).collect()
        }
    }

    #[async_trait]
    impl StepInvoker for MockInvoker {
        async fn invoke(
            &self,
            step: &str,
            request: &StepRequest,
        ) -> Result<StepResponse, BackendError> {
            self.calls
                .lock()
                .unwrap()
                .push((step.to_string(), request.clone()));

            match self.replies.get(step).cloned().unwrap_or(MockReply::Unreachable) {
                MockReply::Respond {
                    status,
                    content_type,
                    body,
                } => Ok(StepResponse {
                    status,
                    content_type,
                    body: Bytes::from(body),
                }),
                MockReply::Echo => Ok(StepResponse {
                    status: StatusCode::OK,
                    content_type: request.content_type.clone(),
                    body: request.body.clone(),
                }),
                MockReply::Unreachable => Err(BackendError::Unreachable {
                    backend: step.to_string(),
                    message: "dns error: no such host".to_string(),
                }),
            }
        }
    }
}
