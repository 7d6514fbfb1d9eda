//! Per-physical-file exclusion for seek + I/O sequences

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of lock shards. Paths hashing to the same shard serialize.
const LOCK_SHARDS: usize = 64;

/// Fixed table of mutexes keyed by physical path.
///
/// A guard is held for one chunk iteration only, never across a whole
/// logical read or write.
#[derive(Debug)]
pub struct StripeLocks {
    shards: Vec<Mutex<()>>,
}

impl StripeLocks {
    pub fn new() -> Self {
        Self {
            shards: (0..LOCK_SHARDS).map(|_| Mutex::new(())).collect(),
        }
    }

    /// Lock the shard owning `path`
    pub fn lock(&self, path: &Path) -> MutexGuard<'_, ()> {
        self.shards[self.shard(path)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn shard(&self, path: &Path) -> usize {
        let mut hasher = DefaultHasher::new();
        path.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }
}

impl Default for StripeLocks {
    fn default() -> Self {
        Self::new()
    }
}
