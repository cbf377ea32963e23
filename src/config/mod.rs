pub mod pipeline;

pub use pipeline::{is_valid_backend_name, ExecutionMode, Pipeline, PipelineError};

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::cli::Args;

/// Default lifetime of a cached pipeline definition
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_millis(30_000);

/// Errors for startup configuration (fatal, reported before binding)
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Both an S3 bucket and a pipelines directory are configured; choose one")]
    ConflictingStores,

    #[error("Incomplete S3 credentials: {0} is set but {1} is not")]
    PartialCredentials(&'static str, &'static str),

    #[error("Invalid S3 endpoint '{0}': must start with http:// or https://")]
    InvalidEndpoint(String),

    #[error("Cache TTL must be greater than zero")]
    ZeroTtl,
}

/// Static credentials for the object store
#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
}

/// S3-compatible object store location (path-style addressing)
#[derive(Debug, Clone, PartialEq)]
pub struct S3Config {
    pub endpoint: String,
    pub bucket: String,
    pub region: String,
    pub credentials: Option<Credentials>,
}

/// Where pipeline definitions are read from
#[derive(Debug, Clone, PartialEq)]
pub enum StoreConfig {
    S3(S3Config),
    Directory(PathBuf),
    Disabled,
}

/// Fully resolved gateway configuration, fixed for the process lifetime
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind_addr: String,
    pub port: u16,
    /// `None` means open (unauthenticated) mode
    pub auth_token: Option<String>,
    pub backend_port: u16,
    pub network: String,
    pub cache_ttl: Duration,
    pub store: StoreConfig,
}

impl GatewayConfig {
    /// Resolve and validate configuration from parsed arguments.
    /// Pure function - no I/O.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let store = resolve_store(args)?;

        if args.cache_ttl_ms == 0 {
            return Err(ConfigError::ZeroTtl);
        }

        Ok(Self {
            bind_addr: args.bind_addr.clone(),
            port: args.port,
            auth_token: non_empty(args.auth_token.as_deref()),
            backend_port: args.backend_port,
            network: args.network.clone(),
            cache_ttl: Duration::from_millis(args.cache_ttl_ms),
            store,
        })
    }

    pub fn auth_enabled(&self) -> bool {
        self.auth_token.is_some()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0".to_string(),
            port: 8080,
            auth_token: None,
            backend_port: 8080,
            network: "functions".to_string(),
            cache_ttl: DEFAULT_CACHE_TTL,
            store: StoreConfig::Disabled,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn resolve_store(args: &Args) -> Result<StoreConfig, ConfigError> {
    let bucket = non_empty(args.s3_bucket.as_deref());

    match (bucket, &args.pipelines_dir) {
        (Some(_), Some(_)) => Err(ConfigError::ConflictingStores),
        (None, Some(dir)) => Ok(StoreConfig::Directory(dir.clone())),
        (None, None) => Ok(StoreConfig::Disabled),
        (Some(bucket), None) => {
            let region = args.s3_region.clone();
            let endpoint = match non_empty(args.s3_endpoint.as_deref()) {
                Some(ep) if ep.starts_with("http://") || ep.starts_with("https://") => {
                    ep.trim_end_matches('/').to_string()
                }
                Some(ep) => return Err(ConfigError::InvalidEndpoint(ep)),
                None => format!("https://s3.{}.amazonaws.com", region),
            };

            let key_id = non_empty(args.s3_access_key_id.as_deref());
            let secret = non_empty(args.s3_secret_access_key.as_deref());
            let credentials = match (key_id, secret) {
                (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                    access_key_id,
                    secret_access_key,
                    session_token: non_empty(args.s3_session_token.as_deref()),
                }),
                (None, None) => None,
                (Some(_), None) => {
                    return Err(ConfigError::PartialCredentials(
                        "S3_ACCESS_KEY_ID",
                        "S3_SECRET_ACCESS_KEY",
                    ))
                }
                (None, Some(_)) => {
                    return Err(ConfigError::PartialCredentials(
                        "S3_SECRET_ACCESS_KEY",
                        "S3_ACCESS_KEY_ID",
                    ))
                }
            };

            Ok(StoreConfig::S3(S3Config {
                endpoint,
                bucket,
                region,
                credentials,
            }))
        }
    }
}
