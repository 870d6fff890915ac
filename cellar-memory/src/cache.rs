// Copyright 2025 foyer Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{fmt::Debug, hash::Hash, ops::Deref, sync::Arc};

use cellar_common::{
    code::{DefaultHasher, HashBuilder, Key, Value},
    error::{Error, Result},
    event::EventListener,
    metrics::Metrics,
};
use equivalent::Equivalent;
use parking_lot::Mutex;

use crate::{
    lru::LruConfig,
    record::{MetadataChargePolicy, Priority, Record},
    shard::{Garbages, Shard},
    sync::ShardLock,
};

/// The max count of shard bits.
pub const MAX_SHARD_BITS: usize = 20;

/// Shards are not made smaller than this by [`default_shard_bits`].
const MIN_SHARD_SIZE: usize = 512 * 1024;

/// [`default_shard_bits`] never returns more bits than this.
const MAX_DEFAULT_SHARD_BITS: usize = 6;

/// Pick the shard bits for a cache of `capacity` so that each shard holds at least 512 KiB, with at most 64 shards.
pub fn default_shard_bits(capacity: usize) -> usize {
    let mut shards = capacity / MIN_SHARD_SIZE;
    let mut bits = 0;
    loop {
        shards >>= 1;
        if shards == 0 || bits >= MAX_DEFAULT_SHARD_BITS {
            return bits;
        }
        bits += 1;
    }
}

/// Split the capacity among shards. The first `capacity % shards` shards take one extra byte.
fn shard_capacities(capacity: usize, shards: usize) -> impl Iterator<Item = usize> {
    let (per, rem) = (capacity / shards, capacity % shards);
    (0..shards).map(move |i| if i < rem { per + 1 } else { per })
}

/// An entry returned by the in-memory store.
///
/// The entry keeps the value alive even if it has left the cache.
pub struct CacheEntry<K, V> {
    record: Arc<Record<K, V>>,
}

impl<K, V> Clone for CacheEntry<K, V> {
    fn clone(&self) -> Self {
        Self {
            record: self.record.clone(),
        }
    }
}

impl<K, V> Debug for CacheEntry<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEntry").field("record", &self.record).finish()
    }
}

impl<K, V> Deref for CacheEntry<K, V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        self.record.value()
    }
}

impl<K, V> CacheEntry<K, V> {
    /// Key of the entry.
    pub fn key(&self) -> &K {
        self.record.key()
    }

    /// Value of the entry.
    pub fn value(&self) -> &V {
        self.record.value()
    }

    /// Total charge of the entry, metadata overhead included.
    pub fn charge(&self) -> usize {
        self.record.charge()
    }

    /// Priority the entry was inserted with.
    pub fn priority(&self) -> Priority {
        self.record.priority()
    }
}

/// Builder of the in-memory store.
pub struct CacheBuilder<K, V, S = DefaultHasher>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    name: String,
    capacity: usize,
    shard_bits: Option<usize>,
    strict_capacity_limit: bool,
    lru_config: LruConfig,
    adaptive_mutex: bool,
    metadata_charge_policy: MetadataChargePolicy,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    hash_builder: S,
    metrics: Option<Arc<Metrics>>,
}

impl<K, V> CacheBuilder<K, V, DefaultHasher>
where
    K: Key,
    V: Value,
{
    /// Create a builder of a cache with `capacity` in bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            name: "cellar".to_string(),
            capacity,
            shard_bits: None,
            strict_capacity_limit: false,
            lru_config: LruConfig::default(),
            adaptive_mutex: false,
            metadata_charge_policy: MetadataChargePolicy::default(),
            event_listener: None,
            hash_builder: DefaultHasher::default(),
            metrics: None,
        }
    }
}

impl<K, V, S> CacheBuilder<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Set the name of the cache, used as the metrics label.
    ///
    /// The default value is "cellar".
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the count of shards to `2 ^ shard_bits`.
    ///
    /// By default it is picked by [`default_shard_bits`].
    pub fn with_shard_bits(mut self, shard_bits: usize) -> Self {
        self.shard_bits = Some(shard_bits);
        self
    }

    /// Reject insertions that can never fit instead of releasing them right away.
    pub fn with_strict_capacity_limit(mut self, strict_capacity_limit: bool) -> Self {
        self.strict_capacity_limit = strict_capacity_limit;
        self
    }

    /// Set the ratio of the capacity reserved for high priority entries.
    pub fn with_high_priority_pool_ratio(mut self, ratio: f64) -> Self {
        self.lru_config.high_priority_pool_ratio = ratio;
        self
    }

    /// Set the ratio of the capacity reserved for low priority entries.
    pub fn with_low_priority_pool_ratio(mut self, ratio: f64) -> Self {
        self.lru_config.low_priority_pool_ratio = ratio;
        self
    }

    /// Spin for a while before parking when a shard lock is contended.
    pub fn with_adaptive_mutex(mut self, adaptive_mutex: bool) -> Self {
        self.adaptive_mutex = adaptive_mutex;
        self
    }

    /// Set whether the per-entry bookkeeping overhead is charged.
    pub fn with_metadata_charge_policy(mut self, policy: MetadataChargePolicy) -> Self {
        self.metadata_charge_policy = policy;
        self
    }

    /// Set the event listener that is notified of every entry leaving the cache.
    pub fn with_event_listener(mut self, event_listener: Arc<dyn EventListener<Key = K, Value = V>>) -> Self {
        self.event_listener = Some(event_listener);
        self
    }

    /// Set the hash builder.
    pub fn with_hash_builder<OS>(self, hash_builder: OS) -> CacheBuilder<K, V, OS>
    where
        OS: HashBuilder,
    {
        CacheBuilder {
            name: self.name,
            capacity: self.capacity,
            shard_bits: self.shard_bits,
            strict_capacity_limit: self.strict_capacity_limit,
            lru_config: self.lru_config,
            adaptive_mutex: self.adaptive_mutex,
            metadata_charge_policy: self.metadata_charge_policy,
            event_listener: self.event_listener,
            hash_builder,
            metrics: self.metrics,
        }
    }

    /// Share metrics with another component instead of registering new ones.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the cache.
    ///
    /// Fails with a config error if the pool ratios or the shard bits are invalid.
    pub fn build(self) -> Result<Cache<K, V, S>> {
        self.lru_config.validate()?;

        let shard_bits = self.shard_bits.unwrap_or_else(|| default_shard_bits(self.capacity));
        if shard_bits > MAX_SHARD_BITS {
            return Err(Error::config("too many shard bits")
                .with_context("shard_bits", shard_bits)
                .with_context("max", MAX_SHARD_BITS));
        }

        let metrics = self.metrics.unwrap_or_else(|| Arc::new(Metrics::new(&self.name)));
        let shards = shard_capacities(self.capacity, 1 << shard_bits)
            .map(|capacity| {
                ShardLock::new(
                    Shard::new(capacity, self.strict_capacity_limit, &self.lru_config, metrics.clone()),
                    self.adaptive_mutex,
                )
            })
            .collect();

        tracing::debug!(
            "[memory]: build cache, name: {}, capacity: {}, shards: {}",
            self.name,
            self.capacity,
            1usize << shard_bits
        );

        Ok(Cache {
            inner: Arc::new(CacheInner {
                name: self.name,
                shards,
                shard_bits,
                capacity: Mutex::new(self.capacity),
                strict_capacity_limit: self.strict_capacity_limit,
                metadata_charge_policy: self.metadata_charge_policy,
                event_listener: self.event_listener,
                hash_builder: self.hash_builder,
                metrics,
            }),
        })
    }
}

struct CacheInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    name: String,
    shards: Vec<ShardLock<Shard<K, V>>>,
    shard_bits: usize,
    /// Serializes capacity changes.
    capacity: Mutex<usize>,
    strict_capacity_limit: bool,
    metadata_charge_policy: MetadataChargePolicy,
    event_listener: Option<Arc<dyn EventListener<Key = K, Value = V>>>,
    hash_builder: S,
    metrics: Arc<Metrics>,
}

impl<K, V, S> CacheInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    /// Notify the listener and release the records. Must be called without any shard lock held.
    fn release(&self, garbages: Garbages<K, V>) {
        if let Some(listener) = self.event_listener.as_ref() {
            for (event, record) in garbages.iter() {
                listener.on_leave(*event, record.key(), record.value());
            }
        }
        drop(garbages);
    }

    fn clear(&self) {
        let mut garbages = vec![];
        for shard in self.shards.iter() {
            shard.lock().clear(&mut garbages);
        }
        self.release(garbages);
    }
}

impl<K, V, S> Drop for CacheInner<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn drop(&mut self) {
        self.clear();
    }
}

/// A sharded, capacity-limited in-memory store with explicitly charged entries.
pub struct Cache<K, V, S = DefaultHasher>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    inner: Arc<CacheInner<K, V, S>>,
}

impl<K, V, S> Clone for Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V, S> Debug for Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("name", &self.inner.name)
            .field("shards", &self.inner.shards.len())
            .field("capacity", &self.capacity())
            .field("usage", &self.usage())
            .finish()
    }
}

impl<K, V, S> Cache<K, V, S>
where
    K: Key,
    V: Value,
    S: HashBuilder,
{
    fn shard(&self, hash: u64) -> &ShardLock<Shard<K, V>> {
        // Use the high bits, the indexer of the shard takes the low bits.
        let index = match self.inner.shard_bits {
            0 => 0,
            bits => (hash >> (u64::BITS as usize - bits)) as usize,
        };
        &self.inner.shards[index]
    }

    /// Insert an entry with the caller-provided `charge`.
    ///
    /// The metadata overhead is added to the charge under [`MetadataChargePolicy::Full`]. An entry with the same key
    /// is replaced, and others are evicted to make room.
    ///
    /// Entries pinned by outstanding [`CacheEntry`]s are never evicted. Under a strict capacity limit, fails with
    /// [`ErrorKind::NoSpace`](cellar_common::error::ErrorKind::NoSpace) if the entry does not fit into the shard
    /// capacity left after the pinned entries, leaving the cache unchanged.
    pub fn insert(&self, key: K, value: V, charge: usize, priority: Priority) -> Result<()> {
        let hash = self.inner.hash_builder.hash_one(&key);
        let charge = charge + self.inner.metadata_charge_policy.overhead::<K, V>();
        let record = Arc::new(Record::new(key, value, hash, charge, priority));

        let mut garbages = vec![];
        // Keep a reference so that a rejected record is released out of the lock.
        let res = self.shard(hash).lock().insert(record.clone(), &mut garbages);
        self.inner.release(garbages);
        drop(record);
        res
    }

    /// Get the entry of the key, promoting it in the lru.
    pub fn get<Q>(&self, key: &Q) -> Option<CacheEntry<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);
        let record = self.shard(hash).lock().get(hash, key)?;
        Some(CacheEntry { record })
    }

    /// Check if the key is resident, without promoting it.
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);
        self.shard(hash).lock().contains(hash, key)
    }

    /// Remove the entry of the key, reclaiming its charge.
    ///
    /// The listener is notified with [`Event::Remove`](cellar_common::event::Event::Remove).
    pub fn remove<Q>(&self, key: &Q) -> Option<CacheEntry<K, V>>
    where
        Q: Hash + Equivalent<K> + ?Sized,
    {
        let hash = self.inner.hash_builder.hash_one(key);
        let record = self.shard(hash).lock().remove(hash, key)?;
        if let Some(listener) = self.inner.event_listener.as_ref() {
            listener.on_leave(cellar_common::event::Event::Remove, record.key(), record.value());
        }
        Some(CacheEntry { record })
    }

    /// Remove the entry only if it is still the one resident under its key.
    ///
    /// Returns `false` if it has been replaced or removed meanwhile. The listener is notified with
    /// [`Event::Remove`](cellar_common::event::Event::Remove) otherwise.
    pub fn remove_entry(&self, entry: &CacheEntry<K, V>) -> bool {
        let Some(record) = self.shard(entry.record.hash()).lock().remove_record(&entry.record, false) else {
            return false;
        };
        if let Some(listener) = self.inner.event_listener.as_ref() {
            listener.on_leave(cellar_common::event::Event::Remove, record.key(), record.value());
        }
        true
    }

    /// Remove the entry and take its value, only if it is still the one resident under its key and the given entry is
    /// its only outstanding reference.
    ///
    /// The entry is handed back otherwise, and the cache is left unchanged.
    pub fn take(&self, entry: CacheEntry<K, V>) -> std::result::Result<V, CacheEntry<K, V>> {
        let Some(record) = self.shard(entry.record.hash()).lock().remove_record(&entry.record, true) else {
            return Err(entry);
        };
        drop(entry);
        if let Some(listener) = self.inner.event_listener.as_ref() {
            listener.on_leave(cellar_common::event::Event::Remove, record.key(), record.value());
        }
        Arc::try_unwrap(record)
            .map(Record::into_value)
            .map_err(|record| CacheEntry { record })
    }

    /// Insert an entry only if the key is not resident.
    ///
    /// Returns `false` if the key is resident, leaving the cache unchanged. Otherwise behaves like
    /// [`Cache::insert`].
    pub fn insert_if_absent(&self, key: K, value: V, charge: usize, priority: Priority) -> Result<bool> {
        let hash = self.inner.hash_builder.hash_one(&key);
        let charge = charge + self.inner.metadata_charge_policy.overhead::<K, V>();
        let record = Arc::new(Record::new(key, value, hash, charge, priority));

        let mut garbages = vec![];
        let res = self.shard(hash).lock().insert_if_absent(record.clone(), &mut garbages);
        self.inner.release(garbages);
        drop(record);
        res
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.clear();
    }

    /// Change the capacity, evicting entries until the usage fits.
    pub fn set_capacity(&self, capacity: usize) {
        let mut current = self.inner.capacity.lock();
        let mut garbages = vec![];
        for (shard, capacity) in self
            .inner
            .shards
            .iter()
            .zip(shard_capacities(capacity, self.inner.shards.len()))
        {
            shard.lock().set_capacity(capacity, &mut garbages);
        }
        *current = capacity;
        drop(current);
        self.inner.release(garbages);
    }

    /// Total charge of resident entries.
    pub fn usage(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.lock().usage()).sum()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        *self.inner.capacity.lock()
    }

    /// Count of resident entries.
    pub fn len(&self) -> usize {
        self.inner.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Check if there is no resident entry.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Count of shards.
    pub fn shards(&self) -> usize {
        self.inner.shards.len()
    }

    /// Name of the cache.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Whether insertions that do not fit beside the pinned entries are rejected.
    pub fn strict_capacity_limit(&self) -> bool {
        self.inner.strict_capacity_limit
    }

    /// The metadata charge policy.
    pub fn metadata_charge_policy(&self) -> MetadataChargePolicy {
        self.inner.metadata_charge_policy
    }

    /// The metadata overhead added to the charge of every entry.
    pub fn metadata_overhead(&self) -> usize {
        self.inner.metadata_charge_policy.overhead::<K, V>()
    }

    /// Metrics of the cache.
    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.inner.metrics
    }
}
