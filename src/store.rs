//! Concurrent sharded table backing the flow tracker.
//!
//! Keys are hashed onto one of N independently locked shards, so workers
//! touching different flows rarely contend and no operation ever takes a
//! global lock. Mutation happens through [`ShardedTable::update`] and
//! [`ShardedTable::upsert`], which run a closure while the owning shard's
//! lock is held: a full read-modify-write on one key is atomic and racing
//! workers cannot lose updates. A missing key is a normal outcome, reported
//! as `None`/`false`, never an error.

use std::{
    collections::HashMap,
    hash::{Hash, Hasher},
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use fxhash::FxHasher;

/// Default number of shards, sized for high worker counts.
pub const DEFAULT_SHARD_COUNT: usize = 4096;

/// A concurrent map partitioned into independently locked shards.
pub struct ShardedTable<K, V> {
    shards: Vec<RwLock<HashMap<K, V>>>,
}

impl<K, V> ShardedTable<K, V>
where
    K: Hash + Eq + Copy,
{
    /// Allocate a table with `shard_count` partitions. A count of zero is
    /// clamped to one shard.
    pub fn with_shards(shard_count: usize) -> Self {
        let shard_count = shard_count.max(1);
        let mut shards = Vec::with_capacity(shard_count);
        for _ in 0..shard_count {
            shards.push(RwLock::new(HashMap::new()));
        }
        Self { shards }
    }

    /// Index of the shard owning `key`. Deterministic for a given table.
    pub fn shard_for(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        hasher.finish() as usize % self.shards.len()
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    fn read_shard(&self, key: &K) -> RwLockReadGuard<'_, HashMap<K, V>> {
        self.shards[self.shard_for(key)]
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn write_shard(&self, key: &K) -> RwLockWriteGuard<'_, HashMap<K, V>> {
        self.shards[self.shard_for(key)]
            .write()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert or replace the value under `key`.
    pub fn store(&self, key: K, value: V) {
        self.write_shard(&key).insert(key, value);
    }

    /// Remove the value under `key`, returning it if present.
    pub fn remove(&self, key: K) -> Option<V> {
        self.write_shard(&key).remove(&key)
    }

    pub fn contains(&self, key: K) -> bool {
        self.read_shard(&key).contains_key(&key)
    }

    /// Apply `f` to the value under `key`, if any, while holding the
    /// shard's read lock.
    pub fn read<R>(&self, key: K, f: impl FnOnce(&V) -> R) -> Option<R> {
        self.read_shard(&key).get(&key).map(f)
    }

    /// Mutate the value under `key`, if any, while holding the shard's
    /// write lock. The whole read-modify-write is atomic with respect to
    /// other operations on the same key.
    pub fn update<R>(&self, key: K, f: impl FnOnce(&mut V) -> R) -> Option<R> {
        self.write_shard(&key).get_mut(&key).map(f)
    }

    /// Insert a fresh value if `key` is absent, otherwise mutate the
    /// existing one. Runs entirely under the shard's write lock.
    pub fn upsert(&self, key: K, insert: impl FnOnce() -> V, update: impl FnOnce(&mut V)) {
        let mut shard = self.write_shard(&key);
        match shard.get_mut(&key) {
            Some(value) => update(value),
            None => {
                shard.insert(key, insert());
            }
        }
    }

    /// Total number of tracked entries across all shards.
    pub fn len(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.read().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> ShardedTable<K, V>
where
    K: Hash + Eq + Copy,
    V: Clone,
{
    /// Clone out the value under `key`, if any.
    pub fn load(&self, key: K) -> Option<V> {
        self.read_shard(&key).get(&key).cloned()
    }
}

impl<K, V> Default for ShardedTable<K, V>
where
    K: Hash + Eq + Copy,
{
    fn default() -> Self {
        Self::with_shards(DEFAULT_SHARD_COUNT)
    }
}
