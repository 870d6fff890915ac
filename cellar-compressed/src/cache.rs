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

use bytes::Bytes;
use cellar_common::{
    allocator::{DefaultAllocator, MemoryAllocator},
    compress::Compression,
    error::Result,
    event::EventListener,
    metrics::Metrics,
};
use cellar_memory::{default_shard_bits, Cache, CacheBuilder};

use crate::{
    chunk::ChunkList,
    handle::ResultHandle,
    options::CompressedSecondaryCacheOptions,
    secondary::{CacheItemHelper, SecondaryCache},
    value::CompressedValue,
};

/// Builder of [`CompressedSecondaryCache`].
pub struct CompressedSecondaryCacheBuilder {
    name: String,
    options: CompressedSecondaryCacheOptions,
    allocator: Arc<dyn MemoryAllocator>,
    event_listener: Option<Arc<dyn EventListener<Key = Bytes, Value = CompressedValue>>>,
    metrics: Option<Arc<Metrics>>,
}

impl CompressedSecondaryCacheBuilder {
    /// Create a builder of a compressed secondary cache with `capacity` in bytes and default options.
    pub fn new(capacity: usize) -> Self {
        Self::with_options(CompressedSecondaryCacheOptions {
            capacity,
            ..Default::default()
        })
    }

    /// Create a builder from options.
    pub fn with_options(options: CompressedSecondaryCacheOptions) -> Self {
        Self {
            name: "cellar-secondary".to_string(),
            options,
            allocator: Arc::new(DefaultAllocator),
            event_listener: None,
            metrics: None,
        }
    }

    /// Set the name of the cache, used as the metrics label.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the count of shards to `2 ^ shard_bits`.
    pub fn with_shard_bits(mut self, shard_bits: usize) -> Self {
        self.options.num_shard_bits = Some(shard_bits);
        self
    }

    /// Reject insertions that can never fit instead of dropping them right away.
    pub fn with_strict_capacity_limit(mut self, strict_capacity_limit: bool) -> Self {
        self.options.strict_capacity_limit = strict_capacity_limit;
        self
    }

    /// Set the compression algorithm.
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.options.compression = compression;
        self
    }

    /// Split values into size-class chunks.
    pub fn with_custom_split_merge(mut self, enable: bool) -> Self {
        self.options.enable_custom_split_merge = enable;
        self
    }

    /// Set the allocator of value buffers.
    pub fn with_memory_allocator(mut self, allocator: Arc<dyn MemoryAllocator>) -> Self {
        self.allocator = allocator;
        self
    }

    /// Set the event listener that is notified of every value leaving the cache.
    pub fn with_event_listener(
        mut self,
        event_listener: Arc<dyn EventListener<Key = Bytes, Value = CompressedValue>>,
    ) -> Self {
        self.event_listener = Some(event_listener);
        self
    }

    /// Share metrics with another component instead of registering new ones.
    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the compressed secondary cache.
    pub fn build(self) -> Result<CompressedSecondaryCache> {
        self.options.validate()?;

        let shard_bits = self
            .options
            .num_shard_bits
            .unwrap_or_else(|| default_shard_bits(self.options.capacity));
        let metrics = self.metrics.unwrap_or_else(|| Arc::new(Metrics::new(&self.name)));

        let mut builder = CacheBuilder::<Bytes, CompressedValue>::new(self.options.capacity)
            .with_name(self.name)
            .with_shard_bits(shard_bits)
            .with_strict_capacity_limit(self.options.strict_capacity_limit)
            .with_high_priority_pool_ratio(self.options.high_pri_pool_ratio)
            .with_low_priority_pool_ratio(self.options.low_pri_pool_ratio)
            .with_adaptive_mutex(self.options.use_adaptive_mutex)
            .with_metadata_charge_policy(self.options.metadata_charge_policy)
            .with_metrics(metrics.clone());
        if let Some(event_listener) = self.event_listener {
            builder = builder.with_event_listener(event_listener);
        }
        let cache = builder.build()?;

        Ok(CompressedSecondaryCache {
            cache,
            options: Arc::new(self.options),
            shard_bits,
            allocator: self.allocator,
            metrics,
        })
    }
}

/// A secondary cache that keeps values compressed in memory.
///
/// Values are compressed on insertion, optionally split into size-class chunks, and stored in a sharded LRU store with
/// their charge. A lookup decompresses the value and materializes it with the caller's callback.
///
/// Dummy entries mark keys recently evicted from the primary cache. They hold no data and are never decompressed.
#[derive(Debug, Clone)]
pub struct CompressedSecondaryCache {
    cache: Cache<Bytes, CompressedValue>,
    options: Arc<CompressedSecondaryCacheOptions>,
    shard_bits: usize,
    allocator: Arc<dyn MemoryAllocator>,
    metrics: Arc<Metrics>,
}

impl CompressedSecondaryCache {
    /// Compress the serialized bytes and lay them out for storage.
    ///
    /// Bytes are stored uncompressed if compression is disabled, fails, or gives no benefit.
    fn encode(&self, raw: Vec<u8>) -> Result<CompressedValue> {
        let options = &self.options;
        self.metrics.secondary_uncompressed_bytes.increment(raw.len() as u64);

        let (payload, compression) = if options.compression.is_none() || raw.len() < options.compression_min_size {
            (raw, Compression::None)
        } else {
            match options.compression.compress(&raw, options.compress_format_version) {
                Ok(compressed) if compressed.len() < raw.len() => {
                    // Keep the payload in an exact-size buffer from the allocator.
                    let mut buf = self.allocator.allocate(compressed.len())?;
                    buf.copy_from_slice(&compressed);
                    (buf, options.compression)
                }
                Ok(compressed) => {
                    tracing::debug!(
                        "[secondary]: compression gave no benefit, store uncompressed, raw: {}, compressed: {}",
                        raw.len(),
                        compressed.len()
                    );
                    (raw, Compression::None)
                }
                Err(e) => {
                    tracing::debug!("[secondary]: compression failed, store uncompressed, error: {e}");
                    (raw, Compression::None)
                }
            }
        };

        self.metrics.secondary_compressed_bytes.increment(payload.len() as u64);

        if self.should_split(payload.len()) {
            let chunks = ChunkList::split(&payload, compression, self.allocator.as_ref())?;
            Ok(CompressedValue::Chunked(chunks))
        } else {
            Ok(CompressedValue::Contiguous { buf: payload, compression })
        }
    }

    fn should_split(&self, len: usize) -> bool {
        self.options.enable_custom_split_merge && len >= self.options.split_threshold
    }

    fn materialize<T, F>(&self, value: &CompressedValue, create: F) -> Result<(T, usize)>
    where
        F: FnOnce(&[u8]) -> Result<(T, usize)>,
    {
        value
            .uncompressed(self.allocator.as_ref(), self.options.compress_format_version)
            .and_then(|bytes| create(bytes.as_ref()))
    }

    /// Decode a value taken out of the cache by an erase-on-read lookup.
    ///
    /// A chunked value is merged, releasing its chunks, instead of copied. If decoding fails, the value is put back
    /// unless the key has been inserted again meanwhile.
    fn materialize_taken<T, F>(&self, key: &[u8], value: CompressedValue, create: F) -> Result<(T, usize)>
    where
        F: FnOnce(&[u8]) -> Result<(T, usize)>,
    {
        let value = value.into_contiguous(self.allocator.as_ref())?;
        let res = self.materialize(&value, create);
        if res.is_err() {
            self.put_back(key, value);
        }
        res
    }

    fn put_back(&self, key: &[u8], value: CompressedValue) {
        // Restore the layout the value was inserted with.
        let value = match value {
            CompressedValue::Contiguous { buf, compression } if self.should_split(buf.len()) => {
                match ChunkList::split(&buf, compression, self.allocator.as_ref()) {
                    Ok(chunks) => CompressedValue::Chunked(chunks),
                    Err(_) => CompressedValue::Contiguous { buf, compression },
                }
            }
            value => value,
        };
        let charge = value.charge();
        match self
            .cache
            .insert_if_absent(Bytes::copy_from_slice(key), value, charge, self.options.insert_priority)
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("[secondary]: key inserted again during lookup, drop the taken value, key: {key:?}")
            }
            Err(e) => tracing::warn!("[secondary]: failed to put back the taken value, key: {key:?}, error: {e}"),
        }
    }

    fn insert_value(&self, key: &[u8], value: CompressedValue) -> Result<()> {
        let charge = value.charge();
        self.cache
            .insert(Bytes::copy_from_slice(key), value, charge, self.options.insert_priority)
    }

    /// Insert a dummy marker of the key, charged only the metadata overhead.
    pub fn insert_dummy(&self, key: &[u8]) -> Result<()> {
        tracing::trace!("[secondary]: insert dummy, key: {key:?}");
        self.insert_value(key, CompressedValue::Dummy)?;
        self.metrics.secondary_insert_dummy.increment(1);
        Ok(())
    }

    /// Returns `true` if the key is resident, as a real value or a dummy marker.
    pub fn contains(&self, key: &[u8]) -> bool {
        self.cache.contains(key)
    }

    /// Returns `true` if the key is resident as a dummy marker.
    pub fn contains_dummy(&self, key: &[u8]) -> bool {
        self.cache.get(key).is_some_and(|entry| entry.is_dummy())
    }

    /// Total charge of resident entries.
    pub fn usage(&self) -> usize {
        self.cache.usage()
    }

    /// Capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Change the capacity, evicting entries until the usage fits.
    pub fn set_capacity(&self, capacity: usize) {
        self.cache.set_capacity(capacity);
    }

    /// Count of resident entries.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Returns `true` if there is no resident entry.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// The charge the store adds to every entry for its bookkeeping.
    pub fn metadata_overhead(&self) -> usize {
        self.cache.metadata_overhead()
    }

    /// The options the cache was built with.
    pub fn options(&self) -> &CompressedSecondaryCacheOptions {
        &self.options
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.cache.clear();
    }
}

impl SecondaryCache for CompressedSecondaryCache {
    type Handle<T> = ResultHandle<T>;

    fn name(&self) -> &'static str {
        "CompressedSecondaryCache"
    }

    fn insert<H>(&self, key: &[u8], item: &H::Item, helper: &H) -> Result<()>
    where
        H: CacheItemHelper,
    {
        if self.options.two_phase_admission && !self.contains(key) {
            return self.insert_dummy(key);
        }

        let size = helper.size(item);
        let mut raw = self.allocator.allocate(size)?;
        helper.save_to(item, &mut raw)?;

        let value = self.encode(raw)?;
        tracing::trace!(
            "[secondary]: insert, key: {key:?}, size: {size}, charge: {}",
            value.charge()
        );
        self.insert_value(key, value)?;
        self.metrics.secondary_insert_real.increment(1);
        Ok(())
    }

    fn lookup<T, F>(&self, key: &[u8], create: F, _wait: bool, advise_erase: bool) -> (Option<ResultHandle<T>>, bool)
    where
        F: FnOnce(&[u8]) -> Result<(T, usize)>,
    {
        let Some(entry) = self.cache.get(key) else {
            tracing::trace!("[secondary]: lookup miss, key: {key:?}");
            self.metrics.secondary_miss.increment(1);
            return (None, false);
        };

        if entry.is_dummy() {
            tracing::trace!("[secondary]: lookup dummy, key: {key:?}");
            self.metrics.secondary_dummy_hit.increment(1);
            return (None, true);
        }

        let res = if advise_erase {
            match self.cache.take(entry) {
                Ok(value) => self.materialize_taken(key, value, create),
                // Another reader holds the entry, or it has been replaced meanwhile.
                Err(entry) => {
                    let res = self.materialize(&entry, create);
                    if res.is_ok() {
                        self.cache.remove_entry(&entry);
                    }
                    res
                }
            }
        } else {
            self.materialize(&entry, create)
        };

        let (value, size) = match res {
            Ok(res) => res,
            Err(e) => {
                tracing::warn!("[secondary]: lookup failed, key: {key:?}, error: {e}");
                self.metrics.secondary_lookup_failure.increment(1);
                return (None, false);
            }
        };

        self.metrics.secondary_hit.increment(1);
        tracing::trace!("[secondary]: lookup hit, key: {key:?}, advise_erase: {advise_erase}");

        (Some(ResultHandle::new(value, size)), !advise_erase)
    }

    fn erase(&self, key: &[u8]) {
        if self.cache.remove(key).is_some() {
            tracing::trace!("[secondary]: erase, key: {key:?}");
            self.metrics.secondary_erase.increment(1);
        }
    }

    fn support_force_erase(&self) -> bool {
        true
    }

    fn wait_all<T>(&self, _: &mut [ResultHandle<T>]) {}

    fn printable_options(&self) -> String {
        self.options.printable(self.shard_bits, self.allocator.name())
    }
}
