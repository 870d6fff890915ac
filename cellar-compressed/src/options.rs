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

use std::fmt::Write;

use cellar_common::{
    compress::{Compression, COMPRESS_FORMAT_VERSION_FIXED32, COMPRESS_FORMAT_VERSION_VARINT32},
    error::{Error, Result},
};
use cellar_memory::{MetadataChargePolicy, Priority};
use serde::{Deserialize, Serialize};

/// Options of [`CompressedSecondaryCache`](crate::CompressedSecondaryCache).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressedSecondaryCacheOptions {
    /// Capacity in bytes.
    pub capacity: usize,
    /// The store has `2 ^ num_shard_bits` shards. Picked from the capacity if `None`.
    pub num_shard_bits: Option<usize>,
    /// Reject insertions that can never fit instead of dropping them right away.
    pub strict_capacity_limit: bool,
    /// Ratio of the capacity reserved for high priority entries.
    pub high_pri_pool_ratio: f64,
    /// Ratio of the capacity reserved for low priority entries.
    pub low_pri_pool_ratio: f64,
    /// Spin before parking on a contended shard lock.
    pub use_adaptive_mutex: bool,
    /// Whether the per-entry bookkeeping overhead is charged.
    pub metadata_charge_policy: MetadataChargePolicy,
    /// The compression algorithm.
    pub compression: Compression,
    /// The framing of compressed data, 1 or 2.
    pub compress_format_version: u32,
    /// Split values into size-class chunks.
    pub enable_custom_split_merge: bool,
    /// Values shorter than this are stored in one allocation even if chunking is enabled.
    pub split_threshold: usize,
    /// Values shorter than this are stored uncompressed.
    pub compression_min_size: usize,
    /// Admit a value only if the key is inserted again while its dummy marker is resident.
    pub two_phase_admission: bool,
    /// Priority of inserted values.
    pub insert_priority: Priority,
}

impl Default for CompressedSecondaryCacheOptions {
    fn default() -> Self {
        Self {
            capacity: 32 * 1024 * 1024,
            num_shard_bits: None,
            strict_capacity_limit: false,
            high_pri_pool_ratio: 0.5,
            low_pri_pool_ratio: 0.0,
            use_adaptive_mutex: false,
            metadata_charge_policy: MetadataChargePolicy::Full,
            compression: Compression::Lz4,
            compress_format_version: COMPRESS_FORMAT_VERSION_VARINT32,
            enable_custom_split_merge: false,
            split_threshold: 0,
            compression_min_size: 0,
            two_phase_admission: false,
            insert_priority: Priority::Low,
        }
    }
}

impl CompressedSecondaryCacheOptions {
    /// Validate the options that the store does not validate itself.
    pub fn validate(&self) -> Result<()> {
        if !matches!(
            self.compress_format_version,
            COMPRESS_FORMAT_VERSION_FIXED32 | COMPRESS_FORMAT_VERSION_VARINT32
        ) {
            return Err(Error::config("unsupported compress format version")
                .with_context("compress_format_version", self.compress_format_version));
        }
        Ok(())
    }

    /// Dump the options, one indented `name : value` line each.
    pub fn printable(&self, shard_bits: usize, allocator: &str) -> String {
        let mut s = String::new();
        let mut line = |name: &str, value: &dyn std::fmt::Display| {
            let _ = writeln!(s, "    {name} : {value}");
        };
        line("capacity", &self.capacity);
        line("num_shard_bits", &shard_bits);
        line("strict_capacity_limit", &self.strict_capacity_limit);
        line("memory_allocator", &allocator);
        line("high_pri_pool_ratio", &format_args!("{:.3}", self.high_pri_pool_ratio));
        line("low_pri_pool_ratio", &format_args!("{:.3}", self.low_pri_pool_ratio));
        line("use_adaptive_mutex", &self.use_adaptive_mutex);
        line("metadata_charge_policy", &format_args!("{:?}", self.metadata_charge_policy));
        line("compression_type", &self.compression);
        line("compress_format_version", &self.compress_format_version);
        line("enable_custom_split_merge", &self.enable_custom_split_merge);
        line("split_threshold", &self.split_threshold);
        line("compression_min_size", &self.compression_min_size);
        line("two_phase_admission", &self.two_phase_admission);
        line("insert_priority", &format_args!("{:?}", self.insert_priority));
        s
    }
}
