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

//! A compressed secondary cache.
//!
//! The secondary cache is the compressed tier behind a primary cache of decoded values. It absorbs the values evicted
//! from the primary cache and keeps them compressed, trading CPU for effective capacity.
//!
//! Values can be split into chunks of allocator size classes to reduce fragmentation. The charge of each entry follows
//! its real memory footprint.

mod cache;
pub mod chunk;
mod handle;
mod options;
mod secondary;
mod value;

#[cfg(any(test, feature = "test_utils"))]
pub mod test_utils;

mod prelude;
pub use prelude::*;
