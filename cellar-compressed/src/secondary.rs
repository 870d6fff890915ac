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

use cellar_common::error::Result;

/// Serializes items of the primary cache so that they can be stored in a secondary cache.
pub trait CacheItemHelper {
    /// The item type.
    type Item;

    /// Serialized size of the item.
    fn size(&self, item: &Self::Item) -> usize;

    /// Serialize the item into `buf`, whose length is exactly [`CacheItemHelper::size`].
    fn save_to(&self, item: &Self::Item, buf: &mut [u8]) -> Result<()>;
}

/// The result of a secondary cache lookup.
pub trait SecondaryCacheResultHandle<T> {
    /// Returns `true` if the value is ready.
    fn is_ready(&self) -> bool;

    /// Block until the value is ready.
    fn wait(&mut self);

    /// The materialized value.
    fn value(&self) -> &T;

    /// The charge of the materialized value.
    fn size(&self) -> usize;

    /// Take the materialized value.
    fn into_value(self) -> T;
}

/// A secondary cache tier behind a primary cache.
pub trait SecondaryCache: Send + Sync + 'static {
    /// The handle returned by lookups.
    type Handle<T>: SecondaryCacheResultHandle<T>;

    /// Name of the secondary cache.
    fn name(&self) -> &'static str;

    /// Insert an item evicted from the primary cache.
    fn insert<H>(&self, key: &[u8], item: &H::Item, helper: &H) -> Result<()>
    where
        H: CacheItemHelper;

    /// Look up the key and materialize the value with `create`, which returns the value and its charge.
    ///
    /// Returns the handle if found, and whether the key is still kept by the secondary cache. With `advise_erase`, a
    /// found value is erased from the secondary cache.
    fn lookup<T, F>(&self, key: &[u8], create: F, wait: bool, advise_erase: bool) -> (Option<Self::Handle<T>>, bool)
    where
        F: FnOnce(&[u8]) -> Result<(T, usize)>;

    /// Erase the key.
    fn erase(&self, key: &[u8]);

    /// Returns `true` if [`SecondaryCache::erase`] always removes the entry.
    fn support_force_erase(&self) -> bool;

    /// Wait until all handles are ready.
    fn wait_all<T>(&self, handles: &mut [Self::Handle<T>]);

    /// A human readable dump of the options.
    fn printable_options(&self) -> String;
}
