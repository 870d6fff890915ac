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

use std::{borrow::Cow, fmt::Debug};

use cellar_common::{
    allocator::MemoryAllocator,
    compress::Compression,
    error::{Error, ErrorKind, Result},
};

use crate::chunk::ChunkList;

/// The stored representation of a secondary cache entry.
///
/// The value owns its buffers. Dropping it is the only way they are released, whichever path removed it from the
/// cache.
pub enum CompressedValue {
    /// A marker that the key was recently evicted from the primary cache. Holds no data.
    Dummy,
    /// The payload in one allocation.
    Contiguous {
        /// The payload.
        buf: Vec<u8>,
        /// The compression applied to the payload.
        compression: Compression,
    },
    /// The payload split into a chain of size-class chunks.
    Chunked(ChunkList),
}

impl Debug for CompressedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dummy => write!(f, "Dummy"),
            Self::Contiguous { buf, compression } => f
                .debug_struct("Contiguous")
                .field("len", &buf.len())
                .field("compression", compression)
                .finish(),
            Self::Chunked(chunks) => f.debug_tuple("Chunked").field(chunks).finish(),
        }
    }
}

impl CompressedValue {
    /// The charge of the value, without the metadata overhead of the store.
    ///
    /// A contiguous value is charged its exact length, a chunked value the sum of its size classes, a dummy nothing.
    pub fn charge(&self) -> usize {
        match self {
            Self::Dummy => 0,
            Self::Contiguous { buf, .. } => buf.len(),
            Self::Chunked(chunks) => chunks.charge(),
        }
    }

    /// Returns `true` if the value is a dummy marker.
    pub fn is_dummy(&self) -> bool {
        matches!(self, Self::Dummy)
    }

    /// The compression applied to the payload, `None` for a dummy.
    pub fn compression(&self) -> Option<Compression> {
        match self {
            Self::Dummy => None,
            Self::Contiguous { compression, .. } => Some(*compression),
            Self::Chunked(chunks) => Some(chunks.compression()),
        }
    }

    /// The stored payload in one buffer, still compressed. A chunked payload is copied out.
    pub fn payload(&self, allocator: &dyn MemoryAllocator) -> Result<Cow<'_, [u8]>> {
        match self {
            Self::Dummy => Err(Error::new(ErrorKind::Unsupported, "dummy value holds no payload")),
            Self::Contiguous { buf, .. } => Ok(Cow::Borrowed(buf.as_slice())),
            Self::Chunked(chunks) => chunks.to_contiguous(allocator).map(Cow::Owned),
        }
    }

    /// The uncompressed bytes of the value.
    pub fn uncompressed(&self, allocator: &dyn MemoryAllocator, format_version: u32) -> Result<Cow<'_, [u8]>> {
        let payload = self.payload(allocator)?;
        match self.compression() {
            Some(compression) if !compression.is_none() => {
                compression.decompress(&payload, format_version).map(Cow::Owned)
            }
            _ => Ok(payload),
        }
    }

    /// Convert a chunked value into a contiguous one, releasing the chunks as they are copied.
    pub fn into_contiguous(self, allocator: &dyn MemoryAllocator) -> Result<Self> {
        match self {
            Self::Chunked(chunks) => {
                let compression = chunks.compression();
                let (buf, _) = chunks.merge(allocator)?;
                Ok(Self::Contiguous { buf, compression })
            }
            value => Ok(value),
        }
    }
}
