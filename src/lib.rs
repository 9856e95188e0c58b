//! shellcache library
//!
//! Offline app-shell caching for a small web app: requests are intercepted
//! and answered from the network or from versioned cache partitions, with
//! network-first handling for the app's own assets and cache-first handling
//! for a short list of third-party assets.

pub mod cache;
pub mod cli;
pub mod config;
pub mod context;
pub mod interceptor;
pub mod network;
pub mod policy;
pub mod request;
pub mod worker;

pub use cache::{CacheStorage, PartitionKind};
pub use config::WorkerConfig;
pub use context::WorkerContext;
pub use interceptor::{Outcome, RequestInterceptor};
pub use network::{HttpNetwork, Network, NetworkError, OfflineNetwork};
pub use request::{CacheKey, Request, Response};
pub use worker::{Registration, ServiceWorker};
