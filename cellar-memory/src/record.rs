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

use serde::{Deserialize, Serialize};

/// Priority of an entry, deciding which LRU pool it is inserted into.
///
/// High priority entries are evicted after low priority entries, which are evicted after bottom priority entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Priority {
    /// Inserted into the high priority pool.
    High,
    /// Inserted into the low priority pool.
    #[default]
    Low,
    /// Inserted into the bottom pool, evicted first.
    Bottom,
}

/// Decides whether the bookkeeping overhead of an entry is charged against the capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MetadataChargePolicy {
    /// Only the caller-provided charge is accounted.
    DontCharge,
    /// The caller-provided charge plus the fixed size of the entry record is accounted.
    #[default]
    Full,
}

impl MetadataChargePolicy {
    /// The overhead added to the charge of every entry with key type `K` and value type `V`.
    pub fn overhead<K, V>(&self) -> usize {
        match self {
            Self::DontCharge => 0,
            Self::Full => std::mem::size_of::<Record<K, V>>(),
        }
    }
}

/// [`Record`] holds a cached entry and its bookkeeping.
pub struct Record<K, V> {
    key: K,
    value: V,
    hash: u64,
    charge: usize,
    priority: Priority,
}

impl<K, V> Debug for Record<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Record")
            .field("hash", &self.hash)
            .field("charge", &self.charge)
            .field("priority", &self.priority)
            .finish()
    }
}

impl<K, V> Record<K, V> {
    /// Create a record. `charge` is the total charge, metadata overhead included.
    pub fn new(key: K, value: V, hash: u64, charge: usize, priority: Priority) -> Self {
        Self {
            key,
            value,
            hash,
            charge,
            priority,
        }
    }

    /// Get the immutable reference of the record key.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Get the immutable reference of the record value.
    pub fn value(&self) -> &V {
        &self.value
    }

    /// Get the record hash.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Get the total charge of the record.
    pub fn charge(&self) -> usize {
        self.charge
    }

    /// Get the priority the record was inserted with.
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Consume the record and return its value.
    pub fn into_value(self) -> V {
        self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_overhead() {
        assert_eq!(MetadataChargePolicy::DontCharge.overhead::<u64, u64>(), 0);
        assert_eq!(
            MetadataChargePolicy::Full.overhead::<u64, u64>(),
            std::mem::size_of::<Record<u64, u64>>()
        );
        assert!(MetadataChargePolicy::Full.overhead::<u64, u64>() > 0);
    }
}
