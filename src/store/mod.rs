//! Pipeline definition storage
//!
//! Pipelines live in an external object store as one JSON document per
//! pipeline, keyed `<name>.json`. The gateway only ever reads them.

pub mod directory;
pub mod s3;

pub use directory::DirectoryStore;
pub use s3::S3Store;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::StoreConfig;

/// Errors raised while reading a pipeline object
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("Pipeline object '{0}' not found")]
    NotFound(String),

    #[error("Object store unreachable: {0}")]
    Unreachable(String),

    #[error("Object store returned HTTP {status} for '{key}': {message}")]
    Status {
        key: String,
        status: u16,
        message: String,
    },

    #[error("Failed to read '{key}': {message}")]
    Io { key: String, message: String },

    #[error("Request signing failed: {0}")]
    Signing(String),

    #[error("No pipeline store configured")]
    NotConfigured,
}

/// Object key for a pipeline name.
pub fn pipeline_key(name: &str) -> String {
    format!("{}.json", name)
}

// ============================================================================
// SBIO: Trait for abstraction (allows mocking in tests)
// ============================================================================

#[async_trait]
pub trait PipelineStore: Send + Sync {
    /// Fetch the raw bytes stored under `key`.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError>;

    /// Human-readable location, for logs and the service descriptor.
    fn describe(&self) -> String;
}

/// Store used when no bucket or directory is configured.
pub struct DisabledStore;

#[async_trait]
impl PipelineStore for DisabledStore {
    async fn get_object(&self, _key: &str) -> Result<Vec<u8>, StoreError> {
        Err(StoreError::NotConfigured)
    }

    fn describe(&self) -> String {
        "disabled".to_string()
    }
}

/// Build the store selected by configuration, sharing the gateway's HTTP client.
pub fn build_store(config: &StoreConfig, client: reqwest::Client) -> Arc<dyn PipelineStore> {
    match config {
        StoreConfig::S3(s3) => Arc::new(S3Store::new(client, s3.clone())),
        StoreConfig::Directory(dir) => Arc::new(DirectoryStore::new(dir.clone())),
        StoreConfig::Disabled => Arc::new(DisabledStore),
    }
}

// ============================================================================
// SBIO: Mock implementation for testing (no I/O)
// ============================================================================

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use dashmap::DashMap;

    /// In-memory store that counts fetches and can simulate an outage.
    #[derive(Default)]
    pub struct MemoryStore {
        objects: DashMap<String, Vec<u8>>,
        fetches: AtomicUsize,
        failure: Mutex<Option<StoreError>>,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_pipeline(self, name: &str, json: &str) -> Self {
            self.put_pipeline(name, json);
            self
        }

        pub fn put_pipeline(&self, name: &str, json: &str) {
            self.objects
                .insert(pipeline_key(name), json.as_bytes().to_vec());
        }

        pub fn fail_with(&self, error: Option<StoreError>) {
            *self.failure.lock().unwrap() = error;
        }

        pub fn fetch_count(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PipelineStore for MemoryStore {
        async fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);

            if let Some(err) = self.failure.lock().unwrap().clone() {
                return Err(err);
            }

            self.objects
                .get(key)
                .map(|v| v.clone())
                .ok_or_else(|| StoreError::NotFound(key.to_string()))
        }

        fn describe(&self) -> String {
            "memory".to_string()
        }
    }
}
