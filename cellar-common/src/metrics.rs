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

use std::fmt::Debug;

use metrics::{counter, gauge, Counter, Gauge};

/// Metrics of a cellar cache instance.
///
/// All metrics are registered with the global `metrics` recorder. Without an installed recorder they are no-ops.
#[derive(Clone)]
pub struct Metrics {
    /* in-memory store metrics */
    /// Entries inserted into the store.
    pub memory_insert: Counter,
    /// Entries replaced by an insertion with the same key.
    pub memory_replace: Counter,
    /// Store lookups that found the key.
    pub memory_hit: Counter,
    /// Store lookups that missed the key.
    pub memory_miss: Counter,
    /// Entries removed explicitly.
    pub memory_remove: Counter,
    /// Entries evicted for capacity.
    pub memory_evict: Counter,
    /// Insertions rejected under a strict capacity limit.
    pub memory_reject: Counter,

    /// Total charge of resident entries.
    pub memory_usage: Gauge,

    /* compressed secondary cache metrics */
    /// Real (compressed) values inserted.
    pub secondary_insert_real: Counter,
    /// Dummy markers inserted.
    pub secondary_insert_dummy: Counter,
    /// Lookups that produced a value.
    pub secondary_hit: Counter,
    /// Lookups that found a dummy marker.
    pub secondary_dummy_hit: Counter,
    /// Lookups that found nothing.
    pub secondary_miss: Counter,
    /// Lookups that found a value but failed to decompress or materialize it.
    pub secondary_lookup_failure: Counter,
    /// Explicit erasures.
    pub secondary_erase: Counter,
    /// Bytes handed to the codec on insertion.
    pub secondary_uncompressed_bytes: Counter,
    /// Bytes stored after compression.
    pub secondary_compressed_bytes: Counter,
}

impl Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish()
    }
}

impl Metrics {
    /// Create metrics with the given cache name as the `name` label.
    pub fn new(name: &str) -> Self {
        /* in-memory store metrics */

        let memory_insert = counter!("cellar_memory_op_total", "name" => name.to_string(), "op" => "insert");
        let memory_replace = counter!("cellar_memory_op_total", "name" => name.to_string(), "op" => "replace");
        let memory_hit = counter!("cellar_memory_op_total", "name" => name.to_string(), "op" => "hit");
        let memory_miss = counter!("cellar_memory_op_total", "name" => name.to_string(), "op" => "miss");
        let memory_remove = counter!("cellar_memory_op_total", "name" => name.to_string(), "op" => "remove");
        let memory_evict = counter!("cellar_memory_op_total", "name" => name.to_string(), "op" => "evict");
        let memory_reject = counter!("cellar_memory_op_total", "name" => name.to_string(), "op" => "reject");

        let memory_usage = gauge!("cellar_memory_usage", "name" => name.to_string());

        /* compressed secondary cache metrics */

        let secondary_insert_real =
            counter!("cellar_secondary_op_total", "name" => name.to_string(), "op" => "insert_real");
        let secondary_insert_dummy =
            counter!("cellar_secondary_op_total", "name" => name.to_string(), "op" => "insert_dummy");
        let secondary_hit = counter!("cellar_secondary_op_total", "name" => name.to_string(), "op" => "hit");
        let secondary_dummy_hit =
            counter!("cellar_secondary_op_total", "name" => name.to_string(), "op" => "dummy_hit");
        let secondary_miss = counter!("cellar_secondary_op_total", "name" => name.to_string(), "op" => "miss");
        let secondary_lookup_failure =
            counter!("cellar_secondary_op_total", "name" => name.to_string(), "op" => "lookup_failure");
        let secondary_erase = counter!("cellar_secondary_op_total", "name" => name.to_string(), "op" => "erase");

        let secondary_uncompressed_bytes =
            counter!("cellar_secondary_bytes_total", "name" => name.to_string(), "kind" => "uncompressed");
        let secondary_compressed_bytes =
            counter!("cellar_secondary_bytes_total", "name" => name.to_string(), "kind" => "compressed");

        Self {
            memory_insert,
            memory_replace,
            memory_hit,
            memory_miss,
            memory_remove,
            memory_evict,
            memory_reject,
            memory_usage,

            secondary_insert_real,
            secondary_insert_dummy,
            secondary_hit,
            secondary_dummy_hit,
            secondary_miss,
            secondary_lookup_failure,
            secondary_erase,
            secondary_uncompressed_bytes,
            secondary_compressed_bytes,
        }
    }
}
