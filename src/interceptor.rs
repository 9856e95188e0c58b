//! Request interceptor
//!
//! Answers every intercepted request from the network, from one of the two
//! partitions of the current version, or not at all. Each strategy is an
//! ordered fallback chain:
//!
//! - own origin: network, then dynamic partition, then core partition
//! - listed external: dynamic partition (refreshed in the background), then network
//! - other: network, then whatever was cached, then optionally the network again
//!
//! Cache writes run as detached background tasks. A failed write is logged and
//! never changes what the caller receives.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::{CacheStorage, PartitionKind};
use crate::context::WorkerContext;
use crate::policy::{classify, RequestClass};
use crate::request::{CacheKey, Request, Response};

/// Result of handling one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Live response from the network
    Network(Response),
    /// Response served from a cache partition
    Cached {
        partition: PartitionKind,
        response: Response,
    },
    /// Request was not eligible for caching and went straight to the network
    Passthrough(Response),
    /// Network failed and nothing was cached: content unavailable offline
    Unavailable,
}

impl Outcome {
    /// The response handed to the caller, if any
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Network(r) | Self::Passthrough(r) => Some(r),
            Self::Cached { response, .. } => Some(response),
            Self::Unavailable => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Network(r) | Self::Passthrough(r) => Some(r),
            Self::Cached { response, .. } => Some(response),
            Self::Unavailable => None,
        }
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(_) => write!(f, "network"),
            Self::Cached { partition, .. } => write!(f, "cache ({})", partition),
            Self::Passthrough(_) => write!(f, "passthrough"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Applies the caching strategies for one worker version
///
/// Clones share the same context and the same set of pending background tasks.
#[derive(Debug, Clone)]
pub struct RequestInterceptor {
    ctx: WorkerContext,
    core: String,
    dynamic: String,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl RequestInterceptor {
    pub fn new(ctx: WorkerContext) -> Self {
        let core = ctx.config().core_partition();
        let dynamic = ctx.config().dynamic_partition();
        Self {
            ctx,
            core,
            dynamic,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn context(&self) -> &WorkerContext {
        &self.ctx
    }

    /// Handles one request
    pub async fn handle(&self, request: &Request) -> Outcome {
        match classify(request, self.ctx.config()) {
            RequestClass::Bypass => self.pass_through(request).await,
            RequestClass::OwnOrigin => self.network_first(request).await,
            RequestClass::ListedExternal => self.cache_first(request).await,
            RequestClass::Other => self.network_then_cached(request).await,
        }
    }

    /// Waits for every background cache write and refresh scheduled so far
    pub async fn settle(&self) {
        loop {
            let handles = {
                let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *pending)
            };
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "background cache task did not complete");
                }
            }
        }
    }

    async fn pass_through(&self, request: &Request) -> Outcome {
        match self.ctx.network().fetch(request).await {
            Ok(response) => Outcome::Passthrough(response),
            Err(e) => {
                debug!(url = %request.url, method = %request.method, error = %e, "passthrough request failed");
                Outcome::Unavailable
            }
        }
    }

    async fn network_first(&self, request: &Request) -> Outcome {
        let key = request.cache_key();
        match self.ctx.network().fetch(request).await {
            Ok(response) => {
                self.store_in_background(key, response.clone());
                Outcome::Network(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "offline, looking up cache");
                match self.lookup(&key).await {
                    Some((partition, response)) => Outcome::Cached {
                        partition,
                        response,
                    },
                    None => Outcome::Unavailable,
                }
            }
        }
    }

    async fn cache_first(&self, request: &Request) -> Outcome {
        let key = request.cache_key();
        if let Some(response) = self.ctx.storage().match_key(&self.dynamic, &key).await {
            self.refresh_in_background(request.clone());
            return Outcome::Cached {
                partition: PartitionKind::Dynamic,
                response,
            };
        }

        match self.ctx.network().fetch(request).await {
            Ok(response) => {
                self.store_in_background(key, response.clone());
                Outcome::Network(response)
            }
            Err(e) => {
                debug!(url = %request.url, error = %e, "failed to fetch external asset");
                Outcome::Unavailable
            }
        }
    }

    async fn network_then_cached(&self, request: &Request) -> Outcome {
        let cached = self.lookup(&request.cache_key()).await;

        let error = match self.ctx.network().fetch(request).await {
            Ok(response) => return Outcome::Network(response),
            Err(e) => e,
        };

        if let Some((partition, response)) = cached {
            return Outcome::Cached {
                partition,
                response,
            };
        }

        if !self.ctx.config().retry_uncached_once {
            debug!(url = %request.url, error = %error, "uncached request failed");
            return Outcome::Unavailable;
        }

        match self.ctx.network().fetch(request).await {
            Ok(response) => Outcome::Network(response),
            Err(e) => {
                debug!(url = %request.url, error = %e, "uncached request failed twice");
                Outcome::Unavailable
            }
        }
    }

    /// Dynamic partition first, then core
    async fn lookup(&self, key: &CacheKey) -> Option<(PartitionKind, Response)> {
        let storage = self.ctx.storage();
        if let Some(response) = storage.match_key(&self.dynamic, key).await {
            return Some((PartitionKind::Dynamic, response));
        }
        storage
            .match_key(&self.core, key)
            .await
            .map(|response| (PartitionKind::Core, response))
    }

    fn store_in_background(&self, key: CacheKey, response: Response) {
        let storage = self.ctx.storage().clone();
        let partition = self.dynamic.clone();
        self.spawn(async move {
            write_dynamic(&storage, &partition, key, response).await;
        });
    }

    fn refresh_in_background(&self, request: Request) {
        let storage = self.ctx.storage().clone();
        let network = self.ctx.network_handle();
        let partition = self.dynamic.clone();
        self.spawn(async move {
            match network.fetch(&request).await {
                Ok(response) => {
                    write_dynamic(&storage, &partition, request.cache_key(), response).await;
                }
                Err(e) => {
                    debug!(url = %request.url, error = %e, "background refresh failed");
                }
            }
        });
    }

    /// Spawns a detached task; dropping the interceptor does not cancel it
    fn spawn<F>(&self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(task);
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }
}

async fn write_dynamic(storage: &CacheStorage, partition: &str, key: CacheKey, response: Response) {
    let url = key.url.clone();
    if let Err(e) = storage.put(partition, key, response).await {
        warn!(url = %url, partition = %partition, error = %e, "failed to update cache");
    }
}
