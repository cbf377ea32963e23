//! S3-compatible GetObject client
//!
//! Objects are addressed path-style (`<endpoint>/<bucket>/<key>`) so the same
//! code talks to AWS and to self-hosted stores such as MinIO. Requests are
//! signed with AWS Signature Version 4 when credentials are configured and sent
//! anonymously otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::{StatusCode, Url};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::{PipelineStore, StoreError};
use crate::config::{Credentials, S3Config};

type HmacSha256 = Hmac<Sha256>;

/// SHA-256 of the empty payload; GetObject never carries a body.
const EMPTY_PAYLOAD_SHA256: &str =
    "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

const SERVICE: &str = "s3";

// ============================================================================
// SBIO: Pure signing functions (no I/O)
// ============================================================================

/// Percent-encode per the SigV4 rules. `/` is kept when encoding object paths.
pub fn uri_encode(input: &str, encode_slash: bool) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            b'/' if !encode_slash => out.push('/'),
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn sha256_hex(data: &[u8]) -> String {
    hex(&Sha256::digest(data))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>, StoreError> {
    let mut mac =
        HmacSha256::new_from_slice(key).map_err(|e| StoreError::Signing(e.to_string()))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Derive the per-day signing key: HMAC chain over date, region, service.
pub fn signing_key(
    secret: &str,
    date: &str,
    region: &str,
    service: &str,
) -> Result<Vec<u8>, StoreError> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

/// `Host` header value exactly as the HTTP client will send it.
fn host_header(url: &Url) -> Result<String, StoreError> {
    let host = url
        .host_str()
        .ok_or_else(|| StoreError::Signing(format!("URL has no host: {}", url)))?;
    Ok(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Build the SigV4 headers for an unsigned-body GET of `url`.
/// Pure function - the timestamp is passed in.
pub fn sign_get_request(
    url: &Url,
    region: &str,
    credentials: &Credentials,
    now: DateTime<Utc>,
) -> Result<Vec<(&'static str, String)>, StoreError> {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date = now.format("%Y%m%d").to_string();
    let host = host_header(url)?;

    let mut canonical_headers = vec![
        ("host", host),
        ("x-amz-content-sha256", EMPTY_PAYLOAD_SHA256.to_string()),
        ("x-amz-date", amz_date.clone()),
    ];
    if let Some(token) = &credentials.session_token {
        canonical_headers.push(("x-amz-security-token", token.clone()));
    }

    let signed_headers = canonical_headers
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(";");
    let header_block: String = canonical_headers
        .iter()
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();

    let canonical_request = format!(
        "GET\n{}\n{}\n{}\n{}\n{}",
        url.path(),
        url.query().unwrap_or(""),
        header_block,
        signed_headers,
        EMPTY_PAYLOAD_SHA256
    );

    let scope = format!("{}/{}/{}/aws4_request", date, region, SERVICE);
    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{}\n{}\n{}",
        amz_date,
        scope,
        sha256_hex(canonical_request.as_bytes())
    );

    let key = signing_key(&credentials.secret_access_key, &date, region, SERVICE)?;
    let signature = hex(&hmac_sha256(&key, string_to_sign.as_bytes())?);

    let authorization = format!(
        "AWS4-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
        credentials.access_key_id, scope, signed_headers, signature
    );

    // Host is set by the client from the URL.
    let mut headers: Vec<(&'static str, String)> = canonical_headers
        .into_iter()
        .filter(|(name, _)| *name != "host")
        .collect();
    headers.push(("authorization", authorization));
    Ok(headers)
}

// ============================================================================
// I/O boundary
// ============================================================================

pub struct S3Store {
    client: reqwest::Client,
    config: S3Config,
}

impl S3Store {
    pub fn new(client: reqwest::Client, config: S3Config) -> Self {
        Self { client, config }
    }

    /// Path-style URL of an object.
    pub fn object_url(&self, key: &str) -> String {
        format!(
            "{}/{}/{}",
            self.config.endpoint.trim_end_matches('/'),
            uri_encode(&self.config.bucket, true),
            uri_encode(key, false)
        )
    }
}

#[async_trait]
impl PipelineStore for S3Store {
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let url = Url::parse(&self.object_url(key))
            .map_err(|e| StoreError::Unreachable(format!("invalid object URL: {}", e)))?;

        let mut request = self.client.get(url.clone());
        if let Some(credentials) = &self.config.credentials {
            for (name, value) in sign_get_request(&url, &self.config.region, credentials, Utc::now())? {
                request = request.header(name, value);
            }
        }

        debug!(bucket = %self.config.bucket, key, "Fetching pipeline object");
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND || message.contains("<Code>NoSuchKey</Code>") {
                return Err(StoreError::NotFound(key.to_string()));
            }
            warn!(bucket = %self.config.bucket, key, status = status.as_u16(), "Object store error");
            return Err(StoreError::Status {
                key: key.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StoreError::Unreachable(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn describe(&self) -> String {
        format!("s3://{} at {}", self.config.bucket, self.config.endpoint)
    }
}
