//! Cache partitions and the storage that holds them
//!
//! Each worker version owns two partitions: a core partition filled once at
//! install time from the app shell manifest, and a dynamic partition filled
//! opportunistically while requests are handled. Storage can be kept in memory
//! or mirrored to a directory so cached responses survive restarts.

mod partition;
mod storage;

pub use partition::{CacheEntry, CachePartition, PartitionKind};
pub use storage::{default_cache_dir, CacheError, CacheStorage};
