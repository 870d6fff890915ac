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

//! Tests of the coordination between the primary cache and the compressed secondary cache.

use cellar::{
    CacheItemHelper, CompressedSecondaryCacheBuilder, Compression, Priority, Result, Source, TieredCache,
    TieredCacheBuilder, TieredItemHelper,
};
use itertools::Itertools;
use rand::{rngs::SmallRng, Rng, SeedableRng};

const KB: usize = 1024;

struct BlockHelper;

impl CacheItemHelper for BlockHelper {
    type Item = Vec<u8>;

    fn size(&self, item: &Vec<u8>) -> usize {
        item.len()
    }

    fn save_to(&self, item: &Vec<u8>, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(item);
        Ok(())
    }
}

impl TieredItemHelper for BlockHelper {
    fn create(&self, buf: &[u8]) -> Result<(Vec<u8>, usize)> {
        Ok((buf.to_vec(), buf.len()))
    }
}

fn block(id: u8) -> Vec<u8> {
    vec![id; 1000]
}

fn tiered(primary_capacity: usize) -> TieredCache<Vec<u8>, BlockHelper> {
    let secondary = CompressedSecondaryCacheBuilder::new(1024 * KB)
        .with_shard_bits(0)
        .with_compression(Compression::Lz4)
        .with_custom_split_merge(true);
    TieredCacheBuilder::new(primary_capacity, secondary)
        .with_primary_shard_bits(0)
        .build(BlockHelper)
        .unwrap()
}

#[test_log::test]
fn test_demote_then_promote_on_second_access() {
    // Holds 3 blocks.
    let cache = tiered(3500);

    for id in 0..4u8 {
        cache.insert(&[id], block(id), 1000, Priority::Low).unwrap();
    }
    // Block 0 is evicted from the primary cache and demoted.
    assert!(!cache.contains_in_primary(&[0]));
    assert!(cache.secondary().contains(&[0]));
    assert!(!cache.secondary().contains_dummy(&[0]));

    // First access: served by the secondary cache, which keeps the value. The primary cache keeps a dummy and evicts
    // block 1 to make room for it.
    let entry = cache.get(&[0]).unwrap();
    assert_eq!(entry.source(), Source::Secondary);
    assert_eq!(*entry, block(0));
    assert!(!cache.contains_in_primary(&[0]));
    assert!(cache.secondary().contains(&[0]));
    assert!(cache.secondary().contains(&[1]));

    // Second access: promoted into the primary cache and erased from the secondary cache.
    let entry = cache.get(&[0]).unwrap();
    assert_eq!(entry.source(), Source::Secondary);
    assert_eq!(*entry, block(0));
    assert!(cache.contains_in_primary(&[0]));
    assert!(!cache.secondary().contains(&[0]));

    // Third access: a primary hit.
    let entry = cache.get(&[0]).unwrap();
    assert_eq!(entry.source(), Source::Primary);
    assert_eq!(*entry, block(0));
}

#[test]
fn test_miss_in_both_tiers() {
    let cache = tiered(3500);
    assert!(cache.get(b"absent").is_none());
    assert!(!cache.secondary().contains(b"absent"));
}

#[test]
fn test_remove_from_both_tiers() {
    let cache = tiered(3500);
    for id in 0..4u8 {
        cache.insert(&[id], block(id), 1000, Priority::Low).unwrap();
    }
    assert!(cache.secondary().contains(&[0]));

    cache.remove(&[0]);
    cache.remove(&[3]);
    assert!(!cache.secondary().contains(&[0]));
    assert!(!cache.contains_in_primary(&[3]));
    assert!(cache.get(&[0]).is_none());
    assert!(cache.get(&[3]).is_none());
}

#[test]
fn test_concurrent_tiered_access() {
    let cache = tiered(16 * KB);

    let handles = (0..4u64)
        .map(|t| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                let mut rng = SmallRng::seed_from_u64(t);
                for _ in 0..2000 {
                    let id = rng.random_range(0..64u8);
                    if rng.random_bool(0.3) {
                        cache.insert(&[id], block(id), 1000, Priority::Low).unwrap();
                    } else if let Some(entry) = cache.get(&[id]) {
                        assert_eq!(*entry, block(id));
                    }
                }
            })
        })
        .collect_vec();
    handles.into_iter().for_each(|h| h.join().unwrap());

    // Readers may have pinned entries during an eviction, the next insertion evicts them.
    cache.insert(&[0], block(0), 1000, Priority::Low).unwrap();
    assert!(cache.primary_usage() <= 16 * KB);
}
