//! Shared worker context
//!
//! Everything a worker version needs at request time, bundled into one value
//! that is constructed explicitly and handed to the interceptor and the
//! lifecycle code.

use std::fmt;
use std::sync::Arc;

use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::network::Network;

/// Config, cache storage and network for one worker version
#[derive(Clone)]
pub struct WorkerContext {
    config: Arc<WorkerConfig>,
    storage: CacheStorage,
    network: Arc<dyn Network>,
}

impl WorkerContext {
    pub fn new(config: WorkerConfig, storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
            network,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn network(&self) -> &dyn Network {
        self.network.as_ref()
    }

    /// Shared handle to the network, for tasks that outlive a request
    pub(crate) fn network_handle(&self) -> Arc<dyn Network> {
        Arc::clone(&self.network)
    }

    /// A context for another version sharing this storage and network
    pub fn for_config(&self, config: WorkerConfig) -> Self {
        Self {
            config: Arc::new(config),
            storage: self.storage.clone(),
            network: Arc::clone(&self.network),
        }
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("version", &self.config.version)
            .field("scope", &self.config.scope.as_str())
            .field("storage", &self.storage)
            .finish_non_exhaustive()
    }
}
