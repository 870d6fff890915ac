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

//! Behavior tests of the compressed secondary cache.

use std::sync::Arc;

use cellar::{
    CacheItemHelper, ChunkList, CompressedSecondaryCache, CompressedSecondaryCacheBuilder,
    CompressedSecondaryCacheOptions, Compression, DefaultAllocator, ErrorKind, Event, MetadataChargePolicy, Result,
    SecondaryCache, SecondaryCacheResultHandle,
};
use cellar_compressed::test_utils::Recorder;
use itertools::Itertools;
use rand::{rngs::SmallRng, Rng, SeedableRng};

const KB: usize = 1024;

struct BytesHelper;

impl CacheItemHelper for BytesHelper {
    type Item = Vec<u8>;

    fn size(&self, item: &Vec<u8>) -> usize {
        item.len()
    }

    fn save_to(&self, item: &Vec<u8>, buf: &mut [u8]) -> Result<()> {
        buf.copy_from_slice(item);
        Ok(())
    }
}

fn create(buf: &[u8]) -> Result<(Vec<u8>, usize)> {
    Ok((buf.to_vec(), buf.len()))
}

fn random_bytes(rng: &mut SmallRng, len: usize) -> Vec<u8> {
    (0..len).map(|_| rng.random()).collect_vec()
}

/// Half random, half zeros, so that it compresses a bit.
fn semi_compressible_bytes(rng: &mut SmallRng, len: usize) -> Vec<u8> {
    (0..len)
        .map(|i| if i % 2 == 0 { rng.random() } else { 0 })
        .collect_vec()
}

fn cache(options: CompressedSecondaryCacheOptions) -> CompressedSecondaryCache {
    CompressedSecondaryCacheBuilder::with_options(options).build().unwrap()
}

fn all_layouts(capacity: usize) -> Vec<CompressedSecondaryCacheOptions> {
    [Compression::None, Compression::Lz4, Compression::Zstd]
        .into_iter()
        .cartesian_product([false, true])
        .cartesian_product([1, 2])
        .map(
            |((compression, enable_custom_split_merge), compress_format_version)| CompressedSecondaryCacheOptions {
                capacity,
                num_shard_bits: Some(0),
                compression,
                enable_custom_split_merge,
                compress_format_version,
                ..Default::default()
            },
        )
        .collect_vec()
}

#[test_log::test]
fn test_insert_then_lookup() {
    let mut rng = SmallRng::seed_from_u64(42);
    for options in all_layouts(4 * 1024 * KB) {
        let cache = cache(options.clone());
        let values = (0..64)
            .map(|i| semi_compressible_bytes(&mut rng, i * 1000))
            .collect_vec();

        for (i, value) in values.iter().enumerate() {
            cache.insert(format!("key-{i}").as_bytes(), value, &BytesHelper).unwrap();
        }

        for (i, value) in values.iter().enumerate() {
            let key = format!("key-{i}");
            for _ in 0..2 {
                let (handle, kept) = cache.lookup(key.as_bytes(), create, true, false);
                let handle = handle.unwrap_or_else(|| panic!("options: {options:?}, key: {key}"));
                assert!(kept);
                assert!(handle.is_ready());
                assert_eq!(handle.size(), value.len());
                assert_eq!(&handle.into_value(), value);
            }
        }
    }
}

#[test]
fn test_lookup_with_erase() {
    let mut rng = SmallRng::seed_from_u64(7);
    for options in all_layouts(1024 * KB) {
        let cache = cache(options);
        let value = semi_compressible_bytes(&mut rng, 20 * KB);
        cache.insert(b"k", &value, &BytesHelper).unwrap();

        let (handle, kept) = cache.lookup(b"k", create, true, true);
        assert_eq!(handle.unwrap().into_value(), value);
        assert!(!kept);

        let (handle, kept) = cache.lookup(b"k", create, true, true);
        assert!(handle.is_none());
        assert!(!kept);
        assert_eq!(cache.usage(), 0);
    }
}

#[test]
fn test_erase_reclaims_exact_charge() {
    let mut rng = SmallRng::seed_from_u64(9);
    let recorder = Arc::new(Recorder::default());
    let cache = CompressedSecondaryCacheBuilder::with_options(CompressedSecondaryCacheOptions {
        capacity: 1024 * KB,
        num_shard_bits: Some(0),
        enable_custom_split_merge: true,
        ..Default::default()
    })
    .with_event_listener(recorder.clone())
    .build()
    .unwrap();

    let keys = (0..32).map(|i| format!("key-{i}")).collect_vec();
    for key in keys.iter() {
        let len = rng.random_range(0..16 * KB);
        cache.insert(key.as_bytes(), &random_bytes(&mut rng, len), &BytesHelper).unwrap();
    }

    for key in keys.iter() {
        let before = cache.usage();
        cache.erase(key.as_bytes());
        let charge = recorder.events().last().map(|(_, _, charge)| *charge).unwrap();
        assert_eq!(before - cache.usage(), charge + cache.metadata_overhead());

        let (handle, kept) = cache.lookup(key.as_bytes(), create, true, false);
        assert!(handle.is_none());
        assert!(!kept);

        // Erasing an absent key is a no-op.
        let usage = cache.usage();
        cache.erase(key.as_bytes());
        cache.erase(key.as_bytes());
        assert_eq!(cache.usage(), usage);
    }

    assert_eq!(cache.usage(), 0);
    assert_eq!(recorder.count(Event::Remove), keys.len());
}

#[test]
fn test_chunked_charge_follows_size_classes() {
    let mut rng = SmallRng::seed_from_u64(5000);
    let cache = cache(CompressedSecondaryCacheOptions {
        capacity: 16 * KB,
        compression: Compression::None,
        enable_custom_split_merge: true,
        metadata_charge_policy: MetadataChargePolicy::DontCharge,
        ..Default::default()
    });

    let value = random_bytes(&mut rng, 5000);
    let chunks = ChunkList::split(&value, Compression::None, &DefaultAllocator).unwrap();
    let classes = chunks.iter().map(|chunk| chunk.size_class()).collect_vec();
    let payload = chunks.iter().map(|chunk| chunk.capacity()).sum::<usize>();
    assert!(payload >= 5000);
    assert_eq!(chunks.charge(), classes.iter().sum::<usize>());
    assert!(chunks.charge() > 5000);

    cache.insert(b"k", &value, &BytesHelper).unwrap();
    assert_eq!(cache.usage(), chunks.charge());

    let (handle, _) = cache.lookup(b"k", create, true, false);
    assert_eq!(handle.unwrap().into_value(), value);
}

#[test]
fn test_incompressible_value_round_trip() {
    let mut rng = SmallRng::seed_from_u64(1);
    for compression in [Compression::Lz4, Compression::Zstd] {
        for enable_custom_split_merge in [false, true] {
            let cache = cache(CompressedSecondaryCacheOptions {
                capacity: 1024 * KB,
                compression,
                enable_custom_split_merge,
                metadata_charge_policy: MetadataChargePolicy::DontCharge,
                ..Default::default()
            });
            let value = random_bytes(&mut rng, 3000);
            cache.insert(b"k", &value, &BytesHelper).unwrap();

            // Stored raw: the charge is the raw length or its size classes.
            let expected = if enable_custom_split_merge { 4096 } else { 3000 };
            assert_eq!(cache.usage(), expected);

            let (handle, _) = cache.lookup(b"k", create, true, false);
            assert_eq!(handle.unwrap().into_value(), value);
        }
    }
}

#[test]
fn test_dummy_entries() {
    let cache = cache(CompressedSecondaryCacheOptions {
        capacity: 1024 * KB,
        ..Default::default()
    });

    cache.insert_dummy(b"k").unwrap();
    assert_eq!(cache.usage(), cache.metadata_overhead());

    let mut called = false;
    let (handle, kept) = cache.lookup(
        b"k",
        |buf| {
            called = true;
            create(buf)
        },
        true,
        false,
    );
    assert!(handle.is_none());
    assert!(kept);
    assert!(!called);

    cache.erase(b"k");
    assert_eq!(cache.usage(), 0);
    assert!(!cache.contains(b"k"));
}

#[test]
fn test_strict_capacity_limit() {
    let mut rng = SmallRng::seed_from_u64(3);
    let cache = cache(CompressedSecondaryCacheOptions {
        capacity: 16 * KB,
        num_shard_bits: Some(0),
        strict_capacity_limit: true,
        compression: Compression::None,
        ..Default::default()
    });

    for i in 0..4 {
        cache.insert(&[i], &random_bytes(&mut rng, KB), &BytesHelper).unwrap();
    }
    let usage = cache.usage();

    let err = cache
        .insert(b"huge", &random_bytes(&mut rng, 32 * KB), &BytesHelper)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoSpace);

    assert!(!cache.contains(b"huge"));
    for i in 0..4 {
        assert!(cache.contains(&[i]));
    }
    assert_eq!(cache.usage(), usage);
}

#[test]
fn test_strict_capacity_limit_with_entry_in_use() {
    let mut rng = SmallRng::seed_from_u64(5);
    let cache = cache(CompressedSecondaryCacheOptions {
        capacity: 16384,
        num_shard_bits: Some(0),
        strict_capacity_limit: true,
        compression: Compression::None,
        metadata_charge_policy: MetadataChargePolicy::DontCharge,
        ..Default::default()
    });
    let a = random_bytes(&mut rng, 10000);
    let b = random_bytes(&mut rng, 10000);
    cache.insert(b"a", &a, &BytesHelper).unwrap();

    // `a` is in use while its lookup creates the item, so it cannot make room for `b`.
    let (handle, kept) = cache.lookup(
        b"a",
        |buf| {
            let err = cache.insert(b"b", &b, &BytesHelper).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NoSpace);
            create(buf)
        },
        true,
        false,
    );
    assert_eq!(handle.unwrap().into_value(), a);
    assert!(kept);
    assert!(cache.contains(b"a"));
    assert!(!cache.contains(b"b"));
    assert_eq!(cache.usage(), 10000);

    // Once released, `a` is evicted to admit `b`.
    cache.insert(b"b", &b, &BytesHelper).unwrap();
    assert!(!cache.contains(b"a"));
    assert!(cache.contains(b"b"));
    assert_eq!(cache.usage(), 10000);
}

#[test]
fn test_capacity_eviction() {
    let mut rng = SmallRng::seed_from_u64(11);
    let cache = cache(CompressedSecondaryCacheOptions {
        capacity: 64 * KB,
        num_shard_bits: Some(0),
        compression: Compression::None,
        enable_custom_split_merge: true,
        ..Default::default()
    });

    for i in 0..64u8 {
        cache.insert(&[i], &random_bytes(&mut rng, 2000), &BytesHelper).unwrap();
        assert!(cache.usage() <= cache.capacity());
    }
    // The latest entry is always resident, the oldest is long gone.
    assert!(cache.contains(&[63]));
    assert!(!cache.contains(&[0]));

    cache.set_capacity(8 * KB);
    assert!(cache.usage() <= 8 * KB);
    assert!(cache.contains(&[63]));
}

#[test]
fn test_concurrent_operations() {
    let cache = cache(CompressedSecondaryCacheOptions {
        capacity: 256 * KB,
        num_shard_bits: Some(2),
        use_adaptive_mutex: true,
        enable_custom_split_merge: true,
        ..Default::default()
    });

    let handles = (0..8u64)
        .map(|t| {
            let cache = cache.clone();
            std::thread::spawn(move || {
                let mut rng = SmallRng::seed_from_u64(t);
                for _ in 0..2000 {
                    let id = rng.random_range(0..256u64);
                    let key = id.to_le_bytes();
                    // The value is derived from the key so that any hit can be verified.
                    let value = vec![id as u8; (id as usize + 1) * 37];
                    match rng.random_range(0..4) {
                        0 | 1 => cache.insert(&key, &value, &BytesHelper).unwrap(),
                        2 => {
                            if let (Some(handle), _) = cache.lookup(&key, create, true, rng.random_bool(0.2)) {
                                assert_eq!(handle.into_value(), value);
                            }
                        }
                        _ => cache.erase(&key),
                    }
                }
            })
        })
        .collect_vec();
    handles.into_iter().for_each(|h| h.join().unwrap());

    // Entries pinned by readers may have held the usage above the capacity until the next eviction.
    cache.set_capacity(cache.capacity());
    assert!(cache.usage() <= cache.capacity());
}
