//! Worker configuration
//!
//! A `WorkerConfig` describes one version of the offline cache: where the app
//! lives, which version tag names its partitions, which files make up the app
//! shell and which third-party URLs get cache-first treatment. Every field has
//! a default, so a config file only needs to list what differs.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

/// Version tag used when none is configured
pub const DEFAULT_VERSION: &str = "v2026.02.10.01";

/// Partition name prefix used when none is configured
pub const DEFAULT_CACHE_PREFIX: &str = "placar-fut";

/// Name of the config file looked up in the platform config directory
pub const CONFIG_FILE_NAME: &str = "shellcache.toml";

/// Errors raised while loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for a `WorkerConfig`
    #[error("failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A manifest path cannot be resolved against the scope
    #[error("invalid asset path '{path}': {source}")]
    InvalidAssetPath {
        path: String,
        #[source]
        source: url::ParseError,
    },

    /// A field holds a value that cannot work
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Configuration for one worker version
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Base URL of the app; its origin decides what counts as an own asset
    pub scope: Url,
    /// Version tag embedded in partition names
    pub version: String,
    /// Prefix shared by every partition this app owns
    pub cache_prefix: String,
    /// App shell paths, relative to `scope`, stored at install time
    pub core_assets: Vec<String>,
    /// Absolute URL prefixes served cache-first with background refresh
    pub external_assets: Vec<String>,
    /// Per-request network timeout in seconds
    pub request_timeout_secs: u64,
    /// Try the network a second time when an uncached request fails
    pub retry_uncached_once: bool,
    /// Activate a newly installed version without waiting
    pub skip_waiting_on_install: bool,
    /// Tell connected clients about a newly activated version
    pub broadcast_on_activate: bool,
    /// Upper bound on cached body bytes across all partitions
    pub quota_bytes: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            scope: default_scope(),
            version: DEFAULT_VERSION.to_string(),
            cache_prefix: DEFAULT_CACHE_PREFIX.to_string(),
            core_assets: [
                "./",
                "./index.html",
                "./style.css",
                "./app.js",
                "./manifest.json",
                "./sw.js",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            external_assets: vec![
                "https://cdnjs.cloudflare.com/ajax/libs/font-awesome/6.4.0/css/all.min.css"
                    .to_string(),
            ],
            request_timeout_secs: 10,
            retry_uncached_once: true,
            skip_waiting_on_install: true,
            broadcast_on_activate: true,
            quota_bytes: None,
        }
    }
}

fn default_scope() -> Url {
    Url::parse("http://localhost:8080/").expect("static URL is valid")
}

impl WorkerConfig {
    /// Loads a config from a TOML file and validates it
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config from `path`, else from the platform config directory,
    /// else falls back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Checks that the config can drive a worker
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Invalid("version must not be empty".to_string()));
        }
        if self.cache_prefix.trim().is_empty() {
            return Err(ConfigError::Invalid("cache_prefix must not be empty".to_string()));
        }
        if !matches!(self.scope.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "scope must be an http(s) URL, got {}",
                self.scope
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        for prefix in &self.external_assets {
            Url::parse(prefix).map_err(|source| ConfigError::InvalidAssetPath {
                path: prefix.clone(),
                source,
            })?;
        }
        self.manifest_urls()?;
        Ok(())
    }

    /// Name of this version's core partition
    pub fn core_partition(&self) -> String {
        format!("{}-cache-{}", self.cache_prefix, self.version)
    }

    /// Name of this version's dynamic partition
    pub fn dynamic_partition(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.version)
    }

    /// Whether `name` belongs to this app but not to this version
    pub fn is_stale_partition(&self, name: &str) -> bool {
        name.starts_with(&format!("{}-", self.cache_prefix))
            && name != self.core_partition()
            && name != self.dynamic_partition()
    }

    /// Resolves the manifest paths against the scope, in manifest order
    pub fn manifest_urls(&self) -> Result<Vec<Url>, ConfigError> {
        self.core_assets
            .iter()
            .map(|path| {
                self.scope
                    .join(path)
                    .map_err(|source| ConfigError::InvalidAssetPath {
                        path: path.clone(),
                        source,
                    })
            })
            .collect()
    }

    /// Per-request network timeout
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Returns the default config file location
///
/// Uses `~/.config/shellcache/shellcache.toml` on Linux, or the equivalent on
/// other platforms.
pub fn default_config_path() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "shellcache")?;
    Some(project_dirs.config_dir().join(CONFIG_FILE_NAME))
}
