//! Cache storage holding every named partition
//!
//! Partitions live in memory behind an async lock. When the storage is opened
//! on a directory, each partition is mirrored to `<dir>/<name>.json` after
//! every mutation and reloaded on the next start, so cached responses survive
//! process restarts.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use directories::ProjectDirs;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

use super::partition::{CacheEntry, CachePartition};
use crate::request::{CacheKey, Response};

/// Errors raised while writing to cache storage
#[derive(Debug, Error)]
pub enum CacheError {
    /// Storing the entry would take the storage past its byte quota
    #[error("quota exceeded: {needed} bytes needed, limit is {quota} bytes")]
    QuotaExceeded { needed: u64, quota: u64 },

    /// Only GET requests may be stored
    #[error("only GET requests can be cached, got {0}")]
    NonGetRequest(String),

    /// The partition could not be encoded for disk
    #[error("failed to serialize partition {partition}: {source}")]
    Serialization {
        partition: String,
        #[source]
        source: serde_json::Error,
    },

    /// Reading or writing the cache directory failed
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Returns the platform cache directory for shellcache
///
/// Uses `~/.cache/shellcache/` on Linux, or the equivalent on other platforms.
/// Returns `None` if no home directory can be determined.
pub fn default_cache_dir() -> Option<PathBuf> {
    let project_dirs = ProjectDirs::from("", "", "shellcache")?;
    Some(project_dirs.cache_dir().to_path_buf())
}

/// The set of named cache partitions
///
/// Cloning a `CacheStorage` yields another handle to the same partitions.
/// Each `put` or `delete` is atomic on its own; nothing groups several
/// mutations together.
#[derive(Debug, Clone)]
pub struct CacheStorage {
    partitions: Arc<RwLock<Vec<CachePartition>>>,
    dir: Option<PathBuf>,
    quota_bytes: Option<u64>,
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl CacheStorage {
    /// Creates storage that only lives in memory
    pub fn in_memory() -> Self {
        Self {
            partitions: Arc::new(RwLock::new(Vec::new())),
            dir: None,
            quota_bytes: None,
        }
    }

    /// Opens storage mirrored to `dir`, loading any partitions already there
    ///
    /// Files that cannot be parsed are skipped with a warning. The directory is
    /// created lazily on the first write.
    pub async fn open_dir(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        let mut partitions = Vec::new();

        match fs::read_dir(&dir).await {
            Ok(mut read_dir) => {
                let mut paths = Vec::new();
                while let Some(entry) = read_dir.next_entry().await.map_err(|source| CacheError::Io {
                    path: dir.clone(),
                    source,
                })? {
                    let path = entry.path();
                    if path.extension().is_some_and(|ext| ext == "json") {
                        paths.push(path);
                    }
                }
                paths.sort();

                for path in paths {
                    match load_partition(&path).await {
                        Some(partition) => partitions.push(partition),
                        None => {
                            tracing::warn!(path = %path.display(), "skipping unreadable cache partition");
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => return Err(CacheError::Io { path: dir, source }),
        }

        tracing::debug!(dir = %dir.display(), partitions = partitions.len(), "opened cache storage");

        Ok(Self {
            partitions: Arc::new(RwLock::new(partitions)),
            dir: Some(dir),
            quota_bytes: None,
        })
    }

    /// Limits the total body bytes held across all partitions
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }

    /// Directory the storage is mirrored to, if any
    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Whether a partition with this name exists
    pub async fn has(&self, name: &str) -> bool {
        self.partitions.read().await.iter().any(|p| p.name() == name)
    }

    /// Names of all partitions
    ///
    /// Partitions reloaded by `open_dir` come first, sorted by name, followed
    /// by those created since in creation order.
    pub async fn keys(&self) -> Vec<String> {
        self.partitions
            .read()
            .await
            .iter()
            .map(|p| p.name().to_string())
            .collect()
    }

    /// Returns a copy of the named partition
    pub async fn partition(&self, name: &str) -> Option<CachePartition> {
        self.partitions
            .read()
            .await
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    /// Looks up `key` in the named partition
    ///
    /// Returns `None` when the partition or the entry is missing.
    pub async fn match_key(&self, name: &str, key: &CacheKey) -> Option<Response> {
        let partitions = self.partitions.read().await;
        partitions
            .iter()
            .find(|p| p.name() == name)
            .and_then(|p| p.get(key))
            .map(|e| e.response.clone())
    }

    /// Stores `response` under `key` in the named partition
    ///
    /// The partition is created if it does not exist yet. An existing entry for
    /// the same key is overwritten.
    pub async fn put(&self, name: &str, key: CacheKey, response: Response) -> Result<(), CacheError> {
        if !key.is_get() {
            return Err(CacheError::NonGetRequest(key.method));
        }

        let mut partitions = self.partitions.write().await;

        if let Some(quota) = self.quota_bytes {
            let total: u64 = partitions.iter().map(|p| p.size_bytes()).sum();
            let replaced = partitions
                .iter()
                .find(|p| p.name() == name)
                .and_then(|p| p.get(&key))
                .map(|e| e.response.body_len())
                .unwrap_or(0);
            let needed = total - replaced + response.body_len();
            if needed > quota {
                return Err(CacheError::QuotaExceeded { needed, quota });
            }
        }

        let (index, created) = match partitions.iter().position(|p| p.name() == name) {
            Some(index) => (index, false),
            None => {
                partitions.push(CachePartition::new(name));
                (partitions.len() - 1, true)
            }
        };

        let entry = CacheEntry {
            key,
            response,
            cached_at: Utc::now(),
        };
        let previous = partitions[index].put(entry.clone());

        if let Err(e) = self.persist(&partitions[index]).await {
            // Keep memory and disk in step: undo the write that could not be saved
            match previous {
                Some(previous) => {
                    partitions[index].put(previous);
                }
                None if created => {
                    partitions.remove(index);
                }
                None => {
                    partitions[index].remove(&entry.key);
                }
            }
            return Err(e);
        }

        Ok(())
    }

    /// Deletes the named partition, returning whether it existed
    pub async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut partitions = self.partitions.write().await;
        let Some(index) = partitions.iter().position(|p| p.name() == name) else {
            return Ok(false);
        };
        partitions.remove(index);

        if let Some(dir) = &self.dir {
            let path = dir.join(file_name(name));
            match fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(CacheError::Io { path, source }),
            }
        }

        Ok(true)
    }

    /// Total body bytes held across all partitions
    pub async fn total_bytes(&self) -> u64 {
        self.partitions.read().await.iter().map(|p| p.size_bytes()).sum()
    }

    /// Writes a partition to disk when the storage is directory-backed
    async fn persist(&self, partition: &CachePartition) -> Result<(), CacheError> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        fs::create_dir_all(dir).await.map_err(|source| CacheError::Io {
            path: dir.clone(),
            source,
        })?;

        let json = serde_json::to_vec(partition).map_err(|source| CacheError::Serialization {
            partition: partition.name().to_string(),
            source,
        })?;

        let path = dir.join(file_name(partition.name()));
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await.map_err(|source| CacheError::Io {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|source| CacheError::Io { path, source })
    }
}

/// Reads one persisted partition, returning `None` if it cannot be parsed
async fn load_partition(path: &Path) -> Option<CachePartition> {
    let content = fs::read(path).await.ok()?;
    serde_json::from_slice(&content).ok()
}

/// File name for a partition, with anything unsafe in a path replaced
fn file_name(partition: &str) -> String {
    let stem: String = partition
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.json", stem)
}
