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

use std::{iter::successors, sync::Arc};

use cellar_common::{
    error::{Error, Result},
    strict_assert,
};
use serde::{Deserialize, Serialize};

use crate::{
    record::{Priority, Record},
    slab::{Slab, Token},
};

/// Lru config of the priority pools.
///
/// Entries are inserted into the pool of their [`Priority`]. When the high priority pool exceeds its share of the
/// capacity, its least recently used entries overflow into the low priority pool, and the low priority pool overflows
/// into the bottom pool the same way. The bottom pool has no limit of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LruConfig {
    /// The ratio of the capacity that the high priority pool may occupy.
    ///
    /// Must be in [0, 1.0].
    pub high_priority_pool_ratio: f64,
    /// The ratio of the capacity that the low priority pool may occupy.
    ///
    /// Must be in [0, 1.0]. The sum with `high_priority_pool_ratio` must not exceed 1.0.
    pub low_priority_pool_ratio: f64,
}

impl Default for LruConfig {
    fn default() -> Self {
        Self {
            high_priority_pool_ratio: 0.5,
            low_priority_pool_ratio: 0.0,
        }
    }
}

impl LruConfig {
    /// Check that both ratios are in [0, 1.0] and that their sum does not exceed 1.0.
    pub fn validate(&self) -> Result<()> {
        let check = |name: &'static str, ratio: f64| {
            if (0.0..=1.0).contains(&ratio) {
                Ok(())
            } else {
                Err(Error::config(format!("{name} must be in 0.0..=1.0")).with_context(name, ratio))
            }
        };
        check("high_priority_pool_ratio", self.high_priority_pool_ratio)?;
        check("low_priority_pool_ratio", self.low_priority_pool_ratio)?;
        if self.high_priority_pool_ratio + self.low_priority_pool_ratio > 1.0 {
            return Err(
                Error::config("the sum of the priority pool ratios must not exceed 1.0")
                    .with_context("high_priority_pool_ratio", self.high_priority_pool_ratio)
                    .with_context("low_priority_pool_ratio", self.low_priority_pool_ratio),
            );
        }
        Ok(())
    }
}

struct Node<K, V> {
    record: Arc<Record<K, V>>,
    prev: Option<Token>,
    next: Option<Token>,
    pool: Priority,
}

/// A doubly linked list threaded through the slab. `head` is the LRU end, `tail` is the MRU end.
#[derive(Debug, Default, Clone, Copy)]
struct List {
    head: Option<Token>,
    tail: Option<Token>,
    len: usize,
    weight: usize,
}

const POOLS: usize = 3;

/// A record is pinned while anything besides its lru node holds it, e.g. an outstanding cache entry.
pub fn is_pinned<K, V>(record: &Arc<Record<K, V>>) -> bool {
    Arc::strong_count(record) > 1
}

fn pool_index(pool: Priority) -> usize {
    match pool {
        Priority::High => 0,
        Priority::Low => 1,
        Priority::Bottom => 2,
    }
}

/// Lru eviction state of a shard, split into high, low and bottom priority pools.
pub struct Lru<K, V> {
    nodes: Slab<Node<K, V>>,
    pools: [List; POOLS],

    high_priority_capacity: usize,
    low_priority_capacity: usize,

    config: LruConfig,
}

impl<K, V> Lru<K, V> {
    /// Create an empty lru for a shard of `capacity`.
    ///
    /// The config must have been validated.
    pub fn new(capacity: usize, config: &LruConfig) -> Self {
        let mut lru = Self {
            nodes: Slab::default(),
            pools: [List::default(); POOLS],
            high_priority_capacity: 0,
            low_priority_capacity: 0,
            config: config.clone(),
        };
        lru.update(capacity);
        lru
    }

    /// Recalculate the pool limits for the new shard capacity and overflow the pools if needed.
    pub fn update(&mut self, capacity: usize) {
        self.high_priority_capacity = (capacity as f64 * self.config.high_priority_pool_ratio) as usize;
        self.low_priority_capacity = (capacity as f64 * self.config.low_priority_pool_ratio) as usize;
        self.rebalance();
    }

    /// Count of entries in all pools.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Push a record to the MRU end of the pool of its priority.
    pub fn push(&mut self, record: Arc<Record<K, V>>) -> Token {
        let pool = record.priority();
        let token = self.nodes.insert(Node {
            record,
            prev: None,
            next: None,
            pool,
        });
        self.link_back(token, pool);
        self.rebalance();
        token
    }

    /// Move an accessed record back to the MRU end of the pool of its priority.
    ///
    /// A record that has overflowed into a lower pool returns to its own pool.
    pub fn access(&mut self, token: Token) {
        let pool = self.nodes.get(token).record.priority();
        self.unlink(token);
        self.link_back(token, pool);
        self.rebalance();
    }

    /// Iterate the records in eviction order: the bottom pool, then the low pool, then the high pool, each from its LRU
    /// end.
    pub fn victims(&self) -> impl Iterator<Item = (Token, &Arc<Record<K, V>>)> + '_ {
        [Priority::Bottom, Priority::Low, Priority::High]
            .into_iter()
            .flat_map(move |pool| {
                successors(self.pools[pool_index(pool)].head, move |&token| self.nodes.get(token).next)
            })
            .map(move |token| (token, &self.nodes.get(token).record))
    }

    /// Pop the next victim in eviction order.
    ///
    /// Records referenced outside the lru are pinned and skipped.
    pub fn pop(&mut self) -> Option<(Token, Arc<Record<K, V>>)> {
        let token = self
            .victims()
            .find(|(_, record)| !is_pinned(record))
            .map(|(token, _)| token)?;
        let record = self.remove(token);
        Some((token, record))
    }

    /// Remove the record of the token from its pool.
    pub fn remove(&mut self, token: Token) -> Arc<Record<K, V>> {
        self.unlink(token);
        self.nodes.remove(token).record
    }

    /// Get the record of the token.
    pub fn record(&self, token: Token) -> &Arc<Record<K, V>> {
        &self.nodes.get(token).record
    }

    /// Remove all records.
    pub fn clear(&mut self) -> Vec<Arc<Record<K, V>>> {
        self.pools = [List::default(); POOLS];
        self.nodes.drain().map(|node| node.record).collect()
    }

    fn rebalance(&mut self) {
        self.overflow(Priority::High, self.high_priority_capacity, Priority::Low);
        self.overflow(Priority::Low, self.low_priority_capacity, Priority::Bottom);
    }

    fn overflow(&mut self, from: Priority, capacity: usize, to: Priority) {
        while self.pools[pool_index(from)].weight > capacity {
            let Some(token) = self.pools[pool_index(from)].head else {
                break;
            };
            self.unlink(token);
            self.link_back(token, to);
        }
    }

    fn link_back(&mut self, token: Token, pool: Priority) {
        let list = &mut self.pools[pool_index(pool)];
        let prev = list.tail;

        let node = self.nodes.get_mut(token);
        strict_assert!(node.prev.is_none() && node.next.is_none());
        node.pool = pool;
        node.prev = prev;
        node.next = None;
        let weight = node.record.charge();

        list.tail = Some(token);
        list.len += 1;
        list.weight += weight;
        match prev {
            Some(prev) => self.nodes.get_mut(prev).next = Some(token),
            None => list.head = Some(token),
        }
    }

    fn unlink(&mut self, token: Token) {
        let node = self.nodes.get_mut(token);
        let (prev, next, pool) = (node.prev.take(), node.next.take(), node.pool);
        let weight = node.record.charge();

        match prev {
            Some(prev) => self.nodes.get_mut(prev).next = next,
            None => self.pools[pool_index(pool)].head = next,
        }
        match next {
            Some(next) => self.nodes.get_mut(next).prev = prev,
            None => self.pools[pool_index(pool)].tail = prev,
        }

        let list = &mut self.pools[pool_index(pool)];
        strict_assert!(list.len > 0);
        list.len -= 1;
        list.weight -= weight;
    }
}
