use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::server::error::GatewayError;
use crate::server::state::AppState;

/// Paths served without credentials
pub fn is_exempt_path(path: &str) -> bool {
    matches!(path, "/" | "/health")
}

/// Token from `Authorization: Bearer <token>`, if present.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Byte-equal comparison in constant time for equal-length inputs.
pub fn token_matches(presented: Option<&str>, expected: &str) -> bool {
    match presented {
        Some(token) => {
            let token = token.as_bytes();
            let expected = expected.as_bytes();
            token.len() == expected.len() && token.ct_eq(expected).unwrap_u8() == 1
        }
        None => false,
    }
}

/// Validate the bearer token against the configured one.
/// A no-op when the gateway runs without a token.
pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if let Some(expected) = &state.config.auth_token {
        let path = request.uri().path();
        if !is_exempt_path(path) && !token_matches(bearer_token(request.headers()), expected) {
            debug!(path, "Missing or invalid bearer token");
            return GatewayError::Unauthorized.into_response();
        }
    }

    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(auth: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        headers
    }

    #[test]
    fn test_exempt_paths() {
        assert!(is_exempt_path("/"));
        assert!(is_exempt_path("/health"));
        assert!(!is_exempt_path("/health/deep"));
        assert!(!is_exempt_path("/orchestrate/p"));
    }

    #[test]
    fn test_bearer_extraction() {
        assert_eq!(bearer_token(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(bearer_token(&headers_with("bearer abc")), None);
        assert_eq!(bearer_token(&headers_with("Basic abc")), None);
        assert_eq!(bearer_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_token_must_be_byte_equal() {
        assert!(token_matches(Some("s3cret"), "s3cret"));
        assert!(!token_matches(Some("S3CRET"), "s3cret"));
        assert!(!token_matches(Some("s3cre"), "s3cret"));
        assert!(!token_matches(Some("s3cret "), "s3cret"));
        assert!(!token_matches(Some(""), "s3cret"));
        assert!(!token_matches(None, "s3cret"));
    }
}
