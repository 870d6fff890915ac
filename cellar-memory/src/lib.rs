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

//! A sharded, capacity-limited in-memory store.
//!
//! Entries are charged explicitly by the caller on insertion. Each shard keeps its entries in an LRU list split into
//! high, low and bottom priority pools, and evicts from the bottom pool first.
//!
//! The store is the storage engine of the compressed secondary cache, and can also serve as a primary cache of decoded
//! values.

mod cache;
mod lru;
mod record;
mod shard;
mod slab;
mod sync;

mod prelude;
pub use prelude::*;
