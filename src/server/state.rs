use std::sync::Arc;

use crate::config::GatewayConfig;
use crate::runtime::{Engine, HttpBackend, PipelineCache, StepInvoker, SystemClock};
use crate::store::PipelineStore;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub cache: Arc<PipelineCache>,
    pub engine: Arc<Engine>,
    pub backend: Arc<HttpBackend>,
}

impl AppState {
    pub fn new(config: GatewayConfig, store: Arc<dyn PipelineStore>, client: reqwest::Client) -> Self {
        let backend = Arc::new(HttpBackend::new(client, config.backend_port));
        let cache = PipelineCache::with_clock(store, Arc::new(SystemClock), config.cache_ttl);
        let engine = Engine::new(backend.clone());

        Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            engine: Arc::new(engine),
            backend,
        }
    }

    /// Run pipeline steps through a different invoker (tests, instrumentation)
    pub fn with_invoker(mut self, invoker: Arc<dyn StepInvoker>) -> Self {
        self.engine = Arc::new(Engine::new(invoker));
        self
    }

    /// Replace the pipeline cache, e.g. to inject a clock
    pub fn with_cache(mut self, cache: PipelineCache) -> Self {
        self.cache = Arc::new(cache);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::mock::MemoryStore;

    #[test]
    fn test_app_state_creation() {
        let config = GatewayConfig {
            backend_port: 3000,
            ..GatewayConfig::default()
        };
        let state = AppState::new(config, Arc::new(MemoryStore::new()), reqwest::Client::new());

        assert_eq!(state.backend.port(), 3000);
        assert!(state.cache.is_empty());
        assert_eq!(state.cache.store().describe(), "memory");
    }
}
