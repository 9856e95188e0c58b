//! Registration of worker versions
//!
//! Holds the active version and, at most, one installed version waiting to
//! take over. New versions are installed through `register`; control
//! messages from pages arrive through `post_message`.

use std::sync::Arc;

use tracing::{debug, info};

use super::clients::ClientHub;
use super::lifecycle::{ActivationReport, InstallReport, ServiceWorker, WorkerError};
use super::messages::ControlMessage;
use crate::cache::CacheStorage;
use crate::config::WorkerConfig;
use crate::context::WorkerContext;
use crate::interceptor::RequestInterceptor;
use crate::network::Network;

/// Result of registering a version
#[derive(Debug)]
pub struct RegisterReport {
    pub install: InstallReport,
    /// Present when the new version was activated right away
    pub activation: Option<ActivationReport>,
}

/// What a control message did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// `skipWaiting`: the activation, or `None` if nothing was waiting
    Activated(Option<ActivationReport>),
    /// `clearCache`: names of the partitions that were deleted
    Cleared(Vec<String>),
}

/// Active and waiting worker versions sharing one storage and network
pub struct Registration {
    storage: CacheStorage,
    network: Arc<dyn Network>,
    clients: ClientHub,
    active: Option<ServiceWorker>,
    waiting: Option<ServiceWorker>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("active", &self.active.as_ref().map(ServiceWorker::version))
            .field("waiting", &self.waiting.as_ref().map(ServiceWorker::version))
            .field("clients", &self.clients.len())
            .finish_non_exhaustive()
    }
}

impl Registration {
    pub fn new(storage: CacheStorage, network: Arc<dyn Network>) -> Self {
        Self {
            storage,
            network,
            clients: ClientHub::new(),
            active: None,
            waiting: None,
        }
    }

    pub fn clients(&self) -> &ClientHub {
        &self.clients
    }

    pub fn storage(&self) -> &CacheStorage {
        &self.storage
    }

    pub fn active(&self) -> Option<&ServiceWorker> {
        self.active.as_ref()
    }

    pub fn waiting(&self) -> Option<&ServiceWorker> {
        self.waiting.as_ref()
    }

    /// Interceptor of the active version, if there is one
    pub fn interceptor(&self) -> Option<&RequestInterceptor> {
        self.active.as_ref().map(ServiceWorker::interceptor)
    }

    /// Installs a version and activates it or parks it as waiting
    ///
    /// The version is activated at once when nothing is active yet or when
    /// `skip_waiting_on_install` is set. Otherwise it waits for `skipWaiting`,
    /// replacing any version that was already waiting.
    pub async fn register(&mut self, config: WorkerConfig) -> Result<RegisterReport, WorkerError> {
        config.validate()?;
        let skip_waiting = config.skip_waiting_on_install;
        let ctx = WorkerContext::new(config, self.storage.clone(), Arc::clone(&self.network));

        let mut worker = ServiceWorker::new(ctx);
        let install = worker.install().await?;

        if self.active.is_none() || skip_waiting {
            if let Some(older) = self.waiting.take() {
                debug!(version = %older.version(), "discarded waiting version");
            }
            let activation = self.promote(worker).await?;
            return Ok(RegisterReport {
                install,
                activation: Some(activation),
            });
        }

        debug!(version = %worker.version(), "installed version is waiting");
        if let Some(replaced) = self.waiting.replace(worker) {
            debug!(version = %replaced.version(), "discarded waiting version");
        }
        Ok(RegisterReport {
            install,
            activation: None,
        })
    }

    /// Activates the waiting version, if any
    pub async fn skip_waiting(&mut self) -> Result<Option<ActivationReport>, WorkerError> {
        match self.waiting.take() {
            Some(worker) => self.promote(worker).await.map(Some),
            None => Ok(None),
        }
    }

    /// Deletes both partitions of the active version
    pub async fn clear_cache(&self) -> Result<Vec<String>, WorkerError> {
        let active = self.active.as_ref().ok_or(WorkerError::NoActiveWorker)?;
        Ok(active.clear_cache().await?)
    }

    /// Handles a control message posted by a page
    pub async fn post_message(&mut self, raw: &str) -> Result<MessageOutcome, WorkerError> {
        match ControlMessage::parse(raw)? {
            ControlMessage::SkipWaiting => Ok(MessageOutcome::Activated(self.skip_waiting().await?)),
            ControlMessage::ClearCache => Ok(MessageOutcome::Cleared(self.clear_cache().await?)),
        }
    }

    async fn promote(&mut self, mut worker: ServiceWorker) -> Result<ActivationReport, WorkerError> {
        // Writes queued by the outgoing version must land before its partitions go
        if let Some(previous) = &self.active {
            previous.interceptor().settle().await;
        }
        let report = worker.activate(&self.clients).await?;
        if let Some(previous) = self.active.replace(worker) {
            info!(version = %previous.version(), "superseded");
        }
        Ok(report)
    }
}
