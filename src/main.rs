//! shellcache - offline app-shell cache for the scoreboard web app
//!
//! Installs a version of the app shell into a disk-backed cache, answers
//! single requests through the interceptor (online or offline), and inspects
//! or clears the cache partitions.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use shellcache::cli::{parse_request, Cli, Command};
use shellcache::network::{HttpNetwork, Network, OfflineNetwork};
use shellcache::{CacheStorage, Registration, RequestInterceptor, ServiceWorker, WorkerConfig, WorkerContext};

/// Sets up stderr logging, honouring `RUST_LOG` when it is set
fn init_logging(verbose: bool) {
    let default = if verbose { "shellcache=debug" } else { "shellcache=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn open_storage(cache_dir: &Path, config: &WorkerConfig) -> Result<CacheStorage> {
    let storage = CacheStorage::open_dir(cache_dir)
        .await
        .with_context(|| format!("Failed to open cache directory: {}", cache_dir.display()))?;
    Ok(storage.with_quota(config.quota_bytes))
}

fn http_network(config: &WorkerConfig) -> Result<Arc<dyn Network>> {
    let network = HttpNetwork::new(config.request_timeout()).context("Failed to set up HTTP client")?;
    Ok(Arc::new(network))
}

async fn install(config: WorkerConfig, storage: CacheStorage) -> Result<()> {
    let network = http_network(&config)?;
    let total = config.core_assets.len();
    let mut registration = Registration::new(storage, network);

    let report = registration.register(config).await?;

    println!(
        "Installed {}: {}/{} app shell assets cached",
        report.install.version,
        report.install.stored.len(),
        total
    );
    for failure in &report.install.failures {
        println!("  not cached: {}", failure);
    }
    if let Some(activation) = report.activation {
        println!("Activated {}", activation.version);
        for name in &activation.deleted {
            println!("  removed stale partition {}", name);
        }
    }
    Ok(())
}

async fn fetch(config: WorkerConfig, storage: CacheStorage, url: &str, method: &str, offline: bool) -> Result<()> {
    let request = parse_request(url, method)?;
    let network: Arc<dyn Network> = if offline {
        Arc::new(OfflineNetwork)
    } else {
        http_network(&config)?
    };

    let interceptor = RequestInterceptor::new(WorkerContext::new(config, storage, network));
    let outcome = interceptor.handle(&request).await;
    interceptor.settle().await;

    eprintln!("{} {} -> {}", request.method, request.url, outcome);
    let Some(response) = outcome.into_response() else {
        bail!("{} is unavailable offline and not cached", request.url);
    };

    eprintln!("status {}", response.status);
    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&response.body)?;
    stdout.flush()?;
    Ok(())
}

async fn clear(config: WorkerConfig, storage: CacheStorage) -> Result<()> {
    let worker = ServiceWorker::new(WorkerContext::new(config, storage, Arc::new(OfflineNetwork)));
    let cleared = worker.clear_cache().await?;
    if cleared.is_empty() {
        println!("Nothing to clear for {}", worker.version());
    }
    for name in cleared {
        println!("Deleted {}", name);
    }
    Ok(())
}

async fn status(config: &WorkerConfig, storage: &CacheStorage) -> Result<()> {
    let names = storage.keys().await;
    if names.is_empty() {
        println!("No cache partitions");
        return Ok(());
    }

    for name in names {
        let Some(partition) = storage.partition(&name).await else {
            continue;
        };
        let marker = if config.is_stale_partition(&name) {
            "stale"
        } else if name == config.core_partition() || name == config.dynamic_partition() {
            "current"
        } else {
            "foreign"
        };
        println!(
            "{}  {} entries  {} bytes  ({})",
            name,
            partition.len(),
            partition.size_bytes(),
            marker
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = WorkerConfig::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;
    let cache_dir = cli.resolve_cache_dir()?;
    let storage = open_storage(&cache_dir, &config).await?;

    match cli.command {
        Command::Install => install(config, storage).await,
        Command::Fetch { url, method, offline } => fetch(config, storage, &url, &method, offline).await,
        Command::Clear => clear(config, storage).await,
        Command::Status => status(&config, &storage).await,
    }
}
