use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Pipeline, PipelineError};
use crate::store::{pipeline_key, PipelineStore, StoreError};

/// Errors loading a pipeline definition. Never cached.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Invalid(#[from] PipelineError),
}

/// Time source for cache expiry
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct CacheEntry {
    pipeline: Arc<Pipeline>,
    fetched_at: Instant,
}

/// TTL-bounded memo of pipeline definitions keyed by pipeline name.
///
/// Entries are immutable and replaced whole on refetch. Concurrent misses for
/// the same name may each fetch from the store.
pub struct PipelineCache {
    store: Arc<dyn PipelineStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    entries: DashMap<String, CacheEntry>,
}

impl PipelineCache {
    pub fn with_clock(store: Arc<dyn PipelineStore>, clock: Arc<dyn Clock>, ttl: Duration) -> Self {
        Self {
            store,
            clock,
            ttl,
            entries: DashMap::new(),
        }
    }

    /// Return the pipeline for `name`, fetching it when absent or stale.
    pub async fn get(&self, name: &str) -> Result<Arc<Pipeline>, LoadError> {
        if let Some(pipeline) = self.live_entry(name) {
            debug!(pipeline = name, "Pipeline cache hit");
            return Ok(pipeline);
        }

        let bytes = self.store.get_object(&pipeline_key(name)).await?;
        let pipeline = Arc::new(Pipeline::from_json(&bytes)?);

        self.entries.insert(
            name.to_string(),
            CacheEntry {
                pipeline: pipeline.clone(),
                fetched_at: self.clock.now(),
            },
        );
        info!(
            pipeline = name,
            mode = %pipeline.mode,
            steps = pipeline.steps.len(),
            "Pipeline definition loaded"
        );

        Ok(pipeline)
    }

    // The map guard is released before any await.
    fn live_entry(&self, name: &str) -> Option<Arc<Pipeline>> {
        let entry = self.entries.get(name)?;
        let age = self.clock.now().saturating_duration_since(entry.fetched_at);
        if age < self.ttl {
            Some(entry.pipeline.clone())
        } else {
            None
        }
    }

    pub fn is_cached(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn store(&self) -> &Arc<dyn PipelineStore> {
        &self.store
    }
}
