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

use crate::error::{Error, Result};

/// Memory allocator for cache value buffers.
///
/// Every buffer that holds a stored value (a contiguous value, a chunk payload, or a merged value) is obtained from the
/// allocator, so a custom allocator can track usage or inject failures.
pub trait MemoryAllocator: Send + Sync + Debug + 'static {
    /// Name of the allocator.
    fn name(&self) -> &'static str;

    /// Allocate a zero-filled buffer of exactly `size` bytes.
    fn allocate(&self, size: usize) -> Result<Vec<u8>>;
}

/// The default allocator backed by the global allocator.
///
/// Allocation failure is reported as an error instead of aborting the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAllocator;

impl MemoryAllocator for DefaultAllocator {
    fn name(&self) -> &'static str {
        "DefaultAllocator"
    }

    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).map_err(|e| Error::alloc(size, e))?;
        buf.resize(size, 0);
        Ok(buf)
    }
}
