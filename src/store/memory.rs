//! Concurrent in-memory store
//!
//! Entries are spread across shards by key hash and each shard carries
//! its own lock, so operations on unrelated keys proceed without
//! contention. Reads on the same shard run concurrently; only writes to
//! the same shard serialize.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt::Display;
use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::Store;
use crate::error::{Error, Result};

/// Default number of shards
const DEFAULT_SHARD_COUNT: usize = 16;

/// Sharded in-memory key-value store
pub struct MemoryStore<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
    mask: usize,
}

impl<K, V> MemoryStore<K, V>
where
    K: Hash + Eq,
{
    /// Create a store with the default shard count
    pub fn new() -> Self {
        Self::with_shard_count(DEFAULT_SHARD_COUNT)
    }

    /// Create a store with a specific shard count, rounded up to a power
    /// of two so the shard index is a mask
    pub fn with_shard_count(count: usize) -> Self {
        let count = count.max(1).next_power_of_two();
        let shards = (0..count).map(|_| RwLock::new(HashMap::new())).collect();
        Self {
            shards,
            mask: count - 1,
        }
    }

    #[inline]
    fn shard_index(&self, key: &K) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) & self.mask
    }

    /// Number of entries across all shards
    pub async fn len(&self) -> usize {
        let mut total = 0;
        for shard in &self.shards {
            total += shard.read().await.len();
        }
        total
    }

    /// Whether the store holds no entries
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<K, V> Default for MemoryStore<K, V>
where
    K: Hash + Eq,
{
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> Store<K, V> for MemoryStore<K, V>
where
    K: Hash + Eq + Display + Send + Sync,
    V: Clone + Send + Sync,
{
    async fn get(&self, key: &K) -> Option<V> {
        let shard = self.shards[self.shard_index(key)].read().await;
        shard.get(key).cloned()
    }

    async fn put(&self, key: K, value: V) -> Result<()> {
        let mut shard = self.shards[self.shard_index(&key)].write().await;
        shard.insert(key, value);
        Ok(())
    }

    async fn remove(&self, key: &K) -> Result<()> {
        let mut shard = self.shards[self.shard_index(key)].write().await;
        match shard.remove(key) {
            Some(_) => Ok(()),
            None => Err(Error::KeyNotFound(key.to_string())),
        }
    }
}
