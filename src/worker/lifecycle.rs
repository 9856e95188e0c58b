//! Worker lifecycle: install and activate
//!
//! A `ServiceWorker` moves through `Installing -> Installed -> Activating ->
//! Active` and stays active until a newer version replaces it. Install
//! fills the core partition from the manifest; activate removes partitions
//! left behind by older versions and takes over connected pages.

use std::fmt;

use futures::future::join_all;
use thiserror::Error;
use tracing::{info, warn};

use super::clients::ClientHub;
use super::messages::{MessageError, WorkerMessage};
use crate::cache::CacheError;
use crate::config::{ConfigError, WorkerConfig};
use crate::context::WorkerContext;
use crate::interceptor::RequestInterceptor;
use crate::network::NetworkError;
use crate::request::Request;

/// Lifecycle state of one worker version
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Active,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
            Self::Activating => write!(f, "activating"),
            Self::Active => write!(f, "active"),
        }
    }
}

/// Errors from lifecycle operations
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The operation is not valid in the worker's current state
    #[error("cannot move worker from {from} to {to}")]
    InvalidTransition { from: WorkerState, to: WorkerState },

    /// The worker's configuration is unusable
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Cache storage failed
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A control message could not be parsed
    #[error(transparent)]
    Message(#[from] MessageError),

    /// The operation needs an active worker and there is none
    #[error("no active worker")]
    NoActiveWorker,
}

/// Why a manifest asset was not stored
#[derive(Debug, Error)]
pub enum ManifestFailureReason {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error("unexpected status {0}")]
    Status(u16),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// A manifest asset that could not be stored at install time
#[derive(Debug, Error)]
#[error("failed to cache {url}: {reason}")]
pub struct ManifestFetchFailure {
    pub url: String,
    #[source]
    pub reason: ManifestFailureReason,
}

/// Summary of an install
#[derive(Debug)]
pub struct InstallReport {
    pub version: String,
    /// URLs stored in the core partition, in manifest order
    pub stored: Vec<String>,
    pub failures: Vec<ManifestFetchFailure>,
}

impl InstallReport {
    /// Whether every manifest asset was stored
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Summary of an activation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationReport {
    pub version: String,
    /// Stale partitions that were deleted
    pub deleted: Vec<String>,
    /// Pages now controlled by this version
    pub claimed: usize,
    /// Pages that received the update notification
    pub notified: usize,
}

/// One version of the offline cache worker
#[derive(Debug)]
pub struct ServiceWorker {
    ctx: WorkerContext,
    state: WorkerState,
    interceptor: RequestInterceptor,
}

impl ServiceWorker {
    /// Creates a worker in the `Installing` state
    pub fn new(ctx: WorkerContext) -> Self {
        let interceptor = RequestInterceptor::new(ctx.clone());
        Self {
            ctx,
            state: WorkerState::Installing,
            interceptor,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn config(&self) -> &WorkerConfig {
        self.ctx.config()
    }

    pub fn version(&self) -> &str {
        &self.ctx.config().version
    }

    pub fn interceptor(&self) -> &RequestInterceptor {
        &self.interceptor
    }

    /// Fetches the manifest and stores it in the core partition
    ///
    /// Assets are fetched concurrently and stored in manifest order. An asset
    /// that fails to download, answers with a non-2xx status or cannot be
    /// written is logged and reported; the install still completes with
    /// whatever was stored.
    pub async fn install(&mut self) -> Result<InstallReport, WorkerError> {
        self.expect_state(WorkerState::Installing, WorkerState::Installed)?;

        let config = self.ctx.config();
        let urls = config.manifest_urls()?;
        let core = config.core_partition();
        info!(version = %config.version, assets = urls.len(), "installing");

        let network = self.ctx.network();
        let fetches = urls.into_iter().map(|url| async move {
            let request = Request::get(url);
            let result = network.fetch(&request).await;
            (request, result)
        });
        let results = join_all(fetches).await;

        let mut stored = Vec::new();
        let mut failures = Vec::new();
        for (request, result) in results {
            let url = request.url.to_string();
            let outcome = match result {
                Ok(response) if response.ok() => self
                    .ctx
                    .storage()
                    .put(&core, request.cache_key(), response)
                    .await
                    .map_err(ManifestFailureReason::from),
                Ok(response) => Err(ManifestFailureReason::Status(response.status)),
                Err(e) => Err(ManifestFailureReason::from(e)),
            };

            match outcome {
                Ok(()) => stored.push(url),
                Err(reason) => {
                    let failure = ManifestFetchFailure { url, reason };
                    warn!(error = %failure, "app shell asset not cached");
                    failures.push(failure);
                }
            }
        }

        info!(
            version = %config.version,
            stored = stored.len(),
            failed = failures.len(),
            "installed"
        );
        self.state = WorkerState::Installed;

        Ok(InstallReport {
            version: config.version.clone(),
            stored,
            failures,
        })
    }

    /// Deletes stale partitions, claims every page and announces the version
    pub async fn activate(&mut self, clients: &ClientHub) -> Result<ActivationReport, WorkerError> {
        self.expect_state(WorkerState::Installed, WorkerState::Activating)?;
        self.state = WorkerState::Activating;

        let config = self.ctx.config();
        let storage = self.ctx.storage();
        info!(version = %config.version, "activating");

        let mut deleted = Vec::new();
        for name in storage.keys().await {
            if !config.is_stale_partition(&name) {
                continue;
            }
            match storage.delete(&name).await {
                Ok(true) => {
                    info!(partition = %name, "removed stale cache partition");
                    deleted.push(name);
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(partition = %name, error = %e, "failed to remove stale cache partition");
                }
            }
        }

        let claimed = clients.claim(&config.version);
        let notified = if config.broadcast_on_activate {
            clients.broadcast(&WorkerMessage::Updated {
                version: config.version.clone(),
            })
        } else {
            0
        };

        self.state = WorkerState::Active;
        info!(version = %config.version, claimed, "active");

        Ok(ActivationReport {
            version: config.version.clone(),
            deleted,
            claimed,
            notified,
        })
    }

    /// Deletes both partitions of this version
    ///
    /// Returns the names of the partitions that existed.
    pub async fn clear_cache(&self) -> Result<Vec<String>, CacheError> {
        let config = self.ctx.config();
        let mut cleared = Vec::new();
        for name in [config.core_partition(), config.dynamic_partition()] {
            if self.ctx.storage().delete(&name).await? {
                cleared.push(name);
            }
        }
        info!(version = %config.version, cleared = cleared.len(), "cleared cache");
        Ok(cleared)
    }

    fn expect_state(&self, expected: WorkerState, to: WorkerState) -> Result<(), WorkerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(WorkerError::InvalidTransition {
                from: self.state,
                to,
            })
        }
    }
}
