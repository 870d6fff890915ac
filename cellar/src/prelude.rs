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

pub use cellar_common::{
    allocator::{DefaultAllocator, MemoryAllocator},
    code::{DefaultHasher, HashBuilder, Key, Value},
    compress::{Compression, COMPRESS_FORMAT_VERSION_FIXED32, COMPRESS_FORMAT_VERSION_VARINT32},
    error::{Error, ErrorKind, Result},
    event::{Event, EventListener},
    metrics::Metrics,
};
pub use cellar_compressed::{
    CacheItemHelper, ChunkList, CompressedSecondaryCache, CompressedSecondaryCacheBuilder,
    CompressedSecondaryCacheOptions, CompressedValue, ResultHandle, SecondaryCache, SecondaryCacheResultHandle,
    CHUNK_HEADER_SIZE, SIZE_CLASSES,
};
pub use cellar_memory::{
    default_shard_bits, Cache, CacheBuilder, CacheEntry, LruConfig, MetadataChargePolicy, Priority, MAX_SHARD_BITS,
};

pub use crate::tiered::{Source, TieredCache, TieredCacheBuilder, TieredEntry, TieredItemHelper};
