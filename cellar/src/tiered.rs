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

use std::{fmt::Debug, marker::PhantomData, ops::Deref, sync::Arc};

use bytes::Bytes;
use cellar_common::{
    error::Result,
    event::{Event, EventListener},
};
use cellar_compressed::{
    CacheItemHelper, CompressedSecondaryCache, CompressedSecondaryCacheBuilder, SecondaryCache,
    SecondaryCacheResultHandle,
};
use cellar_memory::{Cache, CacheBuilder, Priority};

/// [`CacheItemHelper`] that can also materialize an item from its serialized bytes.
pub trait TieredItemHelper: CacheItemHelper + Send + Sync + 'static {
    /// Materialize an item. Returns the item and its charge in the primary cache.
    fn create(&self, buf: &[u8]) -> Result<(Self::Item, usize)>;
}

/// A value slot of the primary cache.
enum Slot<V> {
    /// The key was served by the secondary cache once and is kept there.
    Dummy,
    /// The decoded value.
    Value(Arc<V>),
}

/// Demotes values evicted from the primary cache to the secondary cache.
struct Demoter<V, H> {
    secondary: CompressedSecondaryCache,
    helper: Arc<H>,
    _marker: PhantomData<fn() -> V>,
}

impl<V, H> EventListener for Demoter<V, H>
where
    V: Send + Sync + 'static,
    H: TieredItemHelper<Item = V>,
{
    type Key = Bytes;
    type Value = Slot<V>;

    fn on_leave(&self, reason: Event, key: &Bytes, value: &Slot<V>) {
        let (Event::Evict, Slot::Value(value)) = (reason, value) else {
            return;
        };
        if let Err(e) = self.secondary.insert(key, value.as_ref(), self.helper.as_ref()) {
            tracing::debug!("[tiered]: demote evicted value failed, key: {key:?}, error: {e}");
        }
    }
}

/// Where a [`TieredEntry`] was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// Served by the primary cache.
    Primary,
    /// Materialized from the secondary cache.
    Secondary,
}

/// A value returned by [`TieredCache`].
pub struct TieredEntry<V> {
    value: Arc<V>,
    source: Source,
}

impl<V> Clone for TieredEntry<V> {
    fn clone(&self) -> Self {
        Self {
            value: self.value.clone(),
            source: self.source,
        }
    }
}

impl<V: Debug> Debug for TieredEntry<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TieredEntry")
            .field("value", &self.value)
            .field("source", &self.source)
            .finish()
    }
}

impl<V> Deref for TieredEntry<V> {
    type Target = V;

    fn deref(&self) -> &Self::Target {
        &self.value
    }
}

impl<V> TieredEntry<V> {
    /// Where the value was served from.
    pub fn source(&self) -> Source {
        self.source
    }
}

/// Builder of [`TieredCache`].
pub struct TieredCacheBuilder {
    name: String,
    primary_capacity: usize,
    primary_shard_bits: Option<usize>,
    secondary: CompressedSecondaryCacheBuilder,
}

impl TieredCacheBuilder {
    /// Create a builder of a tiered cache with a primary cache of `primary_capacity` bytes.
    pub fn new(primary_capacity: usize, secondary: CompressedSecondaryCacheBuilder) -> Self {
        Self {
            name: "cellar".to_string(),
            primary_capacity,
            primary_shard_bits: None,
            secondary,
        }
    }

    /// Set the name of the primary cache, used as the metrics label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the count of shards of the primary cache to `2 ^ shard_bits`.
    pub fn with_primary_shard_bits(mut self, shard_bits: usize) -> Self {
        self.primary_shard_bits = Some(shard_bits);
        self
    }

    /// Build the tiered cache with the helper that serializes and materializes values.
    pub fn build<V, H>(self, helper: H) -> Result<TieredCache<V, H>>
    where
        V: Send + Sync + 'static,
        H: TieredItemHelper<Item = V>,
    {
        let secondary = self.secondary.build()?;
        let helper = Arc::new(helper);

        let demoter = Demoter {
            secondary: secondary.clone(),
            helper: helper.clone(),
            _marker: PhantomData,
        };
        let mut builder = CacheBuilder::<Bytes, Slot<V>>::new(self.primary_capacity)
            .with_name(self.name)
            .with_event_listener(Arc::new(demoter));
        if let Some(shard_bits) = self.primary_shard_bits {
            builder = builder.with_shard_bits(shard_bits);
        }
        let primary = builder.build()?;

        Ok(TieredCache {
            primary,
            secondary,
            helper,
        })
    }
}

/// A primary cache of decoded values in front of a compressed secondary cache.
///
/// Values evicted from the primary cache are demoted to the secondary cache. On a primary miss, a value found in the
/// secondary cache is not promoted right away: a dummy slot charged at the value's size is left in the primary cache
/// and the value stays in the secondary cache. If the key misses again while the dummy is resident, the value is
/// promoted and erased from the secondary cache.
pub struct TieredCache<V, H>
where
    V: Send + Sync + 'static,
    H: TieredItemHelper<Item = V>,
{
    primary: Cache<Bytes, Slot<V>>,
    secondary: CompressedSecondaryCache,
    helper: Arc<H>,
}

impl<V, H> Clone for TieredCache<V, H>
where
    V: Send + Sync + 'static,
    H: TieredItemHelper<Item = V>,
{
    fn clone(&self) -> Self {
        Self {
            primary: self.primary.clone(),
            secondary: self.secondary.clone(),
            helper: self.helper.clone(),
        }
    }
}

impl<V, H> TieredCache<V, H>
where
    V: Send + Sync + 'static,
    H: TieredItemHelper<Item = V>,
{
    /// Insert a value into the primary cache.
    pub fn insert(&self, key: &[u8], value: V, charge: usize, priority: Priority) -> Result<()> {
        self.primary
            .insert(Bytes::copy_from_slice(key), Slot::Value(Arc::new(value)), charge, priority)
    }

    /// Get the value of the key from the primary cache, falling back to the secondary cache.
    pub fn get(&self, key: &[u8]) -> Option<TieredEntry<V>> {
        let dummy = match self.primary.get(key) {
            Some(entry) => match &*entry {
                Slot::Value(value) => {
                    return Some(TieredEntry {
                        value: value.clone(),
                        source: Source::Primary,
                    })
                }
                Slot::Dummy => true,
            },
            None => false,
        };

        let (handle, _) = self
            .secondary
            .lookup(key, |buf| self.helper.create(buf), true, dummy);
        let handle = handle?;
        let size = handle.size();
        let value = Arc::new(handle.into_value());

        let slot = if dummy {
            tracing::trace!("[tiered]: promote, key: {key:?}");
            Slot::Value(value.clone())
        } else {
            Slot::Dummy
        };
        if let Err(e) = self
            .primary
            .insert(Bytes::copy_from_slice(key), slot, size, Priority::Low)
        {
            tracing::debug!("[tiered]: insert into primary cache failed, key: {key:?}, error: {e}");
        }

        Some(TieredEntry {
            value,
            source: Source::Secondary,
        })
    }

    /// Remove the key from both tiers.
    pub fn remove(&self, key: &[u8]) {
        self.primary.remove(key);
        self.secondary.erase(key);
    }

    /// Returns `true` if the primary cache holds the value of the key.
    pub fn contains_in_primary(&self, key: &[u8]) -> bool {
        self.primary
            .get(key)
            .is_some_and(|entry| matches!(*entry, Slot::Value(_)))
    }

    /// The primary cache usage.
    pub fn primary_usage(&self) -> usize {
        self.primary.usage()
    }

    /// The secondary cache.
    pub fn secondary(&self) -> &CompressedSecondaryCache {
        &self.secondary
    }
}
