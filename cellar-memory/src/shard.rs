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

use std::sync::Arc;

use cellar_common::{
    code::Key,
    error::{Error, Result},
    event::Event,
    metrics::Metrics,
    strict_assert, strict_assert_eq,
};
use equivalent::Equivalent;
use hashbrown::hash_table::HashTable;

use crate::{
    lru::{is_pinned, Lru, LruConfig},
    record::Record,
    slab::Token,
};

/// Records that left a shard, released by the caller after the shard lock is dropped.
pub type Garbages<K, V> = Vec<(Event, Arc<Record<K, V>>)>;

/// A shard of the cache.
///
/// The indexer maps the key hash to the slab token of the lru node that holds the record.
pub struct Shard<K, V> {
    indexer: HashTable<Token>,
    lru: Lru<K, V>,

    usage: usize,
    capacity: usize,
    strict_capacity_limit: bool,

    metrics: Arc<Metrics>,
}

impl<K, V> Shard<K, V>
where
    K: Key,
{
    pub fn new(capacity: usize, strict_capacity_limit: bool, lru_config: &LruConfig, metrics: Arc<Metrics>) -> Self {
        Self {
            indexer: HashTable::new(),
            lru: Lru::new(capacity, lru_config),
            usage: 0,
            capacity,
            strict_capacity_limit,
            metrics,
        }
    }

    pub fn usage(&self) -> usize {
        self.usage
    }

    pub fn len(&self) -> usize {
        self.indexer.len()
    }

    /// Evict records until the usage is no larger than `target`.
    fn evict(&mut self, target: usize, garbages: &mut Garbages<K, V>) {
        while self.usage > target {
            let Some((token, record)) = self.lru.pop() else {
                break;
            };
            self.unindex(record.hash(), token);
            self.release_usage(record.charge());
            self.metrics.memory_evict.increment(1);
            garbages.push((Event::Evict, record));
        }
    }

    fn unindex(&mut self, hash: u64, token: Token) {
        match self.indexer.find_entry(hash, |&t| t == token) {
            Ok(entry) => {
                entry.remove();
            }
            Err(_) => {
                strict_assert!(false, "record not found in indexer");
            }
        }
    }

    fn release_usage(&mut self, charge: usize) {
        strict_assert!(self.usage >= charge);
        self.usage -= charge;
        self.metrics.memory_usage.decrement(charge as f64);
    }

    /// Remove the record of the key from both the indexer and the lru.
    fn take<Q>(&mut self, hash: u64, key: &Q) -> Option<Arc<Record<K, V>>>
    where
        Q: std::hash::Hash + Equivalent<K> + ?Sized,
    {
        let lru = &self.lru;
        let (token, _) = self
            .indexer
            .find_entry(hash, |&t| key.equivalent(lru.record(t).key()))
            .ok()?
            .remove();
        let record = self.lru.remove(token);
        self.release_usage(record.charge());
        Some(record)
    }

    /// Find the token of the resident record of the key.
    fn find<Q>(&self, hash: u64, key: &Q) -> Option<Token>
    where
        Q: std::hash::Hash + Equivalent<K> + ?Sized,
    {
        self.indexer
            .find(hash, |&t| key.equivalent(self.lru.record(t).key()))
            .copied()
    }

    /// Check whether evicting unpinned records, in eviction order and apart from `skip`, can release `need` bytes.
    fn reclaimable(&self, need: usize, skip: Option<Token>) -> bool {
        if need == 0 {
            return true;
        }
        let mut released = 0;
        for (token, record) in self.lru.victims() {
            if Some(token) == skip || is_pinned(record) {
                continue;
            }
            released += record.charge();
            if released >= need {
                return true;
            }
        }
        false
    }

    /// Insert a record, replacing the record with the same key and evicting others to make room.
    ///
    /// Records pinned by outstanding entries are never evicted. Under a strict capacity limit, a record that does not
    /// fit into the capacity left after the pinned records (the replaced record aside) is rejected and the shard is
    /// left untouched. Otherwise the usage may exceed the capacity while records are pinned, and a record whose
    /// charge exceeds the shard capacity replaces the record with the same key and is released right away.
    pub fn insert(&mut self, record: Arc<Record<K, V>>, garbages: &mut Garbages<K, V>) -> Result<()> {
        let charge = record.charge();

        if self.strict_capacity_limit {
            let old = self.find(record.hash(), record.key());
            let replaced = old.map(|token| self.lru.record(token).charge()).unwrap_or_default();
            let need = (self.usage - replaced + charge).saturating_sub(self.capacity);
            if !self.reclaimable(need, old) {
                self.metrics.memory_reject.increment(1);
                return Err(Error::no_space(self.capacity, self.usage, charge));
            }
        }

        if let Some(old) = self.take(record.hash(), record.key()) {
            self.metrics.memory_replace.increment(1);
            garbages.push((Event::Replace, old));
        }

        if charge > self.capacity {
            tracing::debug!(
                "[memory]: release oversized record right away, charge: {charge}, capacity: {}",
                self.capacity
            );
            self.metrics.memory_evict.increment(1);
            garbages.push((Event::Evict, record));
            return Ok(());
        }

        self.evict(self.capacity - charge, garbages);

        let hash = record.hash();
        let token = self.lru.push(record);
        let lru = &self.lru;
        self.indexer.insert_unique(hash, token, |&t| lru.record(t).hash());

        self.usage += charge;
        self.metrics.memory_usage.increment(charge as f64);
        self.metrics.memory_insert.increment(1);

        strict_assert_eq!(self.indexer.len(), self.lru.len());

        Ok(())
    }

    /// Insert a record only if its key is not resident.
    ///
    /// Returns `false` and leaves the shard untouched if the key is resident.
    pub fn insert_if_absent(&mut self, record: Arc<Record<K, V>>, garbages: &mut Garbages<K, V>) -> Result<bool> {
        if self.find(record.hash(), record.key()).is_some() {
            return Ok(false);
        }
        self.insert(record, garbages).map(|_| true)
    }

    /// Get the record of the key and promote it in the lru.
    pub fn get<Q>(&mut self, hash: u64, key: &Q) -> Option<Arc<Record<K, V>>>
    where
        Q: std::hash::Hash + Equivalent<K> + ?Sized,
    {
        let lru = &self.lru;
        let token = match self.indexer.find(hash, |&t| key.equivalent(lru.record(t).key())) {
            Some(&token) => token,
            None => {
                self.metrics.memory_miss.increment(1);
                return None;
            }
        };
        self.lru.access(token);
        self.metrics.memory_hit.increment(1);
        Some(self.lru.record(token).clone())
    }

    /// Check if the key is resident without promoting it.
    pub fn contains<Q>(&self, hash: u64, key: &Q) -> bool
    where
        Q: std::hash::Hash + Equivalent<K> + ?Sized,
    {
        self.find(hash, key).is_some()
    }

    pub fn remove<Q>(&mut self, hash: u64, key: &Q) -> Option<Arc<Record<K, V>>>
    where
        Q: std::hash::Hash + Equivalent<K> + ?Sized,
    {
        let record = self.take(hash, key)?;
        self.metrics.memory_remove.increment(1);
        Some(record)
    }

    /// Remove the given record, only if it is still the one resident under its key.
    ///
    /// With `exclusive`, the record is also kept if anything besides the shard and the caller holds it.
    pub fn remove_record(&mut self, record: &Arc<Record<K, V>>, exclusive: bool) -> Option<Arc<Record<K, V>>> {
        if exclusive && Arc::strong_count(record) > 2 {
            return None;
        }
        let lru = &self.lru;
        let (token, _) = self
            .indexer
            .find_entry(record.hash(), |&t| Arc::ptr_eq(lru.record(t), record))
            .ok()?
            .remove();
        let record = self.lru.remove(token);
        self.release_usage(record.charge());
        self.metrics.memory_remove.increment(1);
        Some(record)
    }

    pub fn clear(&mut self, garbages: &mut Garbages<K, V>) {
        self.indexer.clear();
        for record in self.lru.clear() {
            self.release_usage(record.charge());
            garbages.push((Event::Clear, record));
        }
        strict_assert!(self.usage == 0);
    }

    /// Change the shard capacity, evicting records until the usage fits.
    pub fn set_capacity(&mut self, capacity: usize, garbages: &mut Garbages<K, V>) {
        self.capacity = capacity;
        self.lru.update(capacity);
        self.evict(capacity, garbages);
    }
}
