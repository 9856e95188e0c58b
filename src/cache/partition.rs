//! Named, insertion-ordered cache partitions

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::request::{CacheKey, Response};

/// Which of the two per-version partitions a cached response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartitionKind {
    /// App shell assets stored once at install time
    Core,
    /// Responses written opportunistically while handling requests
    Dynamic,
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Core => write!(f, "core"),
            Self::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// A single cached response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Request identity
    pub key: CacheKey,
    /// Captured response
    pub response: Response,
    /// When the response was written
    pub cached_at: DateTime<Utc>,
}

/// A named mapping from cache key to entry, kept in insertion order
///
/// `put` overwrites in place, so a key never appears twice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachePartition {
    name: String,
    entries: Vec<CacheEntry>,
}

impl CachePartition {
    /// Creates an empty partition
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up the entry stored under `key`
    pub fn get(&self, key: &CacheKey) -> Option<&CacheEntry> {
        self.entries.iter().find(|e| &e.key == key)
    }

    /// Inserts or overwrites the entry for its key, returning the entry it replaced
    pub fn put(&mut self, entry: CacheEntry) -> Option<CacheEntry> {
        match self.entries.iter_mut().find(|e| e.key == entry.key) {
            Some(slot) => Some(std::mem::replace(slot, entry)),
            None => {
                self.entries.push(entry);
                None
            }
        }
    }

    /// Removes the entry for `key`, returning whether one existed
    pub fn remove(&mut self, key: &CacheKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| &e.key != key);
        self.entries.len() != before
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[CacheEntry] {
        &self.entries
    }

    /// Keys in insertion order
    pub fn keys(&self) -> impl Iterator<Item = &CacheKey> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Total body bytes held by the partition
    pub fn size_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.response.body_len()).sum()
    }
}
