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

//! Chunked layout of compressed values.
//!
//! A large buffer is hard on a size-class allocator: it lands in a huge class and wastes the tail. Splitting it into
//! chunks that each fill one size class keeps every allocation in a class the allocator serves well. The charge of a
//! chunked value is the sum of the size classes of its chunks, so that internal fragmentation is accounted.

use std::{fmt::Debug, iter::successors, mem::size_of};

use cellar_common::{allocator::MemoryAllocator, compress::Compression, error::Result, strict_assert};

/// The allocation size classes of chunks, ascending.
pub const SIZE_CLASSES: [usize; 8] = [128, 256, 512, 1024, 2048, 4096, 8192, 16384];

/// The bookkeeping size of a chunk: the link to the next chunk and the used payload length.
pub const CHUNK_HEADER_SIZE: usize = 2 * size_of::<usize>();

/// Usable payload size of a chunk of the given size class.
pub const fn chunk_payload_capacity(size_class: usize) -> usize {
    size_class - CHUNK_HEADER_SIZE
}

/// Pick the smallest size class that holds `remaining` bytes, or the largest size class if none does.
fn pick_size_class(remaining: usize) -> usize {
    SIZE_CLASSES
        .iter()
        .copied()
        .find(|&class| chunk_payload_capacity(class) >= remaining)
        .unwrap_or(SIZE_CLASSES[SIZE_CLASSES.len() - 1])
}

/// A chunk of a [`ChunkList`].
///
/// Every chunk but the last of a list is full.
pub struct Chunk {
    next: Option<Box<Chunk>>,
    size_class: usize,
    used: usize,
    data: Vec<u8>,
}

impl Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("size_class", &self.size_class)
            .field("used", &self.used)
            .finish()
    }
}

impl Chunk {
    /// The size class the chunk is allocated in.
    pub fn size_class(&self) -> usize {
        self.size_class
    }

    /// The used payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.used]
    }

    /// The usable payload size of the chunk.
    pub fn capacity(&self) -> usize {
        chunk_payload_capacity(self.size_class)
    }
}

/// An exclusively owned, singly linked chain of chunks that holds one value in order.
///
/// Dropping the list releases every chunk in a single pass over the chain.
pub struct ChunkList {
    head: Option<Box<Chunk>>,
    len: usize,
    payload_len: usize,
    charge: usize,
    compression: Compression,
}

impl Debug for ChunkList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkList")
            .field("len", &self.len)
            .field("payload_len", &self.payload_len)
            .field("charge", &self.charge)
            .field("compression", &self.compression)
            .finish()
    }
}

impl Drop for ChunkList {
    fn drop(&mut self) {
        // Unlink before release, or a long chain would release recursively.
        let mut next = self.head.take();
        while let Some(mut chunk) = next {
            next = chunk.next.take();
        }
    }
}

impl ChunkList {
    /// Split `data` into a chain of chunks.
    ///
    /// Each step takes the smallest size class whose payload holds the rest of the data, or the largest size class if
    /// none does and continues with the remaining bytes. Empty data still takes one chunk of the smallest size class.
    ///
    /// On allocation failure, the chunks built so far are released and the error is returned.
    pub fn split(data: &[u8], compression: Compression, allocator: &dyn MemoryAllocator) -> Result<Self> {
        let mut chunks = vec![];
        let mut charge = 0;
        let mut rest = data;

        loop {
            let size_class = pick_size_class(rest.len());
            let used = rest.len().min(chunk_payload_capacity(size_class));

            let mut buf = allocator.allocate(chunk_payload_capacity(size_class))?;
            buf[..used].copy_from_slice(&rest[..used]);
            chunks.push(Chunk {
                next: None,
                size_class,
                used,
                data: buf,
            });
            charge += size_class;

            rest = &rest[used..];
            if rest.is_empty() {
                break;
            }
        }

        let len = chunks.len();
        let head = chunks.into_iter().rev().fold(None, |next, mut chunk| {
            chunk.next = next;
            Some(Box::new(chunk))
        });

        Ok(Self {
            head,
            len,
            payload_len: data.len(),
            charge,
            compression,
        })
    }

    /// Merge the chain into one contiguous buffer of exactly the payload length.
    ///
    /// Each chunk is released right after its bytes are copied. Returns the buffer and its charge, the buffer length.
    pub fn merge(mut self, allocator: &dyn MemoryAllocator) -> Result<(Vec<u8>, usize)> {
        let mut buf = allocator.allocate(self.payload_len)?;
        let mut offset = 0;

        let mut next = self.head.take();
        while let Some(mut chunk) = next {
            next = chunk.next.take();
            let payload = chunk.payload();
            buf[offset..offset + payload.len()].copy_from_slice(payload);
            offset += payload.len();
        }
        strict_assert!(offset == buf.len());

        let charge = buf.len();
        Ok((buf, charge))
    }

    /// Copy the chain into one contiguous buffer of exactly the payload length, leaving the chain untouched.
    pub fn to_contiguous(&self, allocator: &dyn MemoryAllocator) -> Result<Vec<u8>> {
        let mut buf = allocator.allocate(self.payload_len)?;
        let mut offset = 0;
        for chunk in self.iter() {
            let payload = chunk.payload();
            buf[offset..offset + payload.len()].copy_from_slice(payload);
            offset += payload.len();
        }
        strict_assert!(offset == buf.len());
        Ok(buf)
    }

    /// Iterate the chunks in order.
    pub fn iter(&self) -> impl Iterator<Item = &Chunk> {
        successors(self.head.as_deref(), |chunk| chunk.next.as_deref())
    }

    /// Count of chunks.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`, a list holds at least one chunk.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total used payload bytes.
    pub fn payload_len(&self) -> usize {
        self.payload_len
    }

    /// Sum of the size classes of the chunks.
    pub fn charge(&self) -> usize {
        self.charge
    }

    /// The compression applied to the payload.
    pub fn compression(&self) -> Compression {
        self.compression
    }
}

#[cfg(test)]
mod tests {
    use cellar_common::{allocator::DefaultAllocator, error::ErrorKind};
    use itertools::Itertools;
    use rand::{rngs::SmallRng, Rng, SeedableRng};

    use super::*;
    use crate::test_utils::FailingAllocator;

    fn classes(list: &ChunkList) -> Vec<usize> {
        list.iter().map(|chunk| chunk.size_class()).collect_vec()
    }

    fn random_bytes(len: usize) -> Vec<u8> {
        let mut rng = SmallRng::seed_from_u64(len as u64);
        (0..len).map(|_| rng.random()).collect_vec()
    }

    #[test]
    fn test_pick_size_class() {
        assert_eq!(pick_size_class(0), 128);
        assert_eq!(pick_size_class(128 - CHUNK_HEADER_SIZE), 128);
        assert_eq!(pick_size_class(128 - CHUNK_HEADER_SIZE + 1), 256);
        // The smallest class whose payload holds the rest, not the largest class below it.
        assert_eq!(pick_size_class(5000), 8192);
        assert_eq!(pick_size_class(16384 - CHUNK_HEADER_SIZE), 16384);
        assert_eq!(pick_size_class(1 << 20), 16384);
    }

    #[test]
    fn test_split_empty() {
        let list = ChunkList::split(&[], Compression::None, &DefaultAllocator).unwrap();
        assert_eq!(classes(&list), vec![128]);
        assert_eq!(list.charge(), 128);
        assert_eq!(list.payload_len(), 0);
        assert!(list.iter().all(|chunk| chunk.payload().is_empty()));

        let (buf, charge) = list.merge(&DefaultAllocator).unwrap();
        assert!(buf.is_empty());
        assert_eq!(charge, 0);
    }

    #[test]
    fn test_split_layout() {
        let max = chunk_payload_capacity(16384);

        let cases = [
            (1, vec![128]),
            // One 8192 chunk holds all 5000 bytes, so no 4096 + 1024 chain.
            (5000, vec![8192]),
            (max, vec![16384]),
            (max + 1, vec![16384, 128]),
            (2 * max + 300, vec![16384, 16384, 512]),
        ];

        for (len, expected) in cases {
            let data = random_bytes(len);
            let list = ChunkList::split(&data, Compression::Lz4, &DefaultAllocator).unwrap();
            assert_eq!(classes(&list), expected, "len: {len}");
            assert_eq!(list.charge(), expected.iter().sum::<usize>());
            assert_eq!(list.len(), expected.len());
            assert_eq!(list.compression(), Compression::Lz4);

            // Every chunk but the last is full.
            let chunks = list.iter().collect_vec();
            for chunk in &chunks[..chunks.len() - 1] {
                assert_eq!(chunk.payload().len(), chunk.capacity());
            }
            assert!(chunks[chunks.len() - 1].payload().len() <= chunks[chunks.len() - 1].capacity());
        }
    }

    #[test]
    fn test_split_merge() {
        for len in (0..40_000).step_by(997) {
            let data = random_bytes(len);
            let list = ChunkList::split(&data, Compression::None, &DefaultAllocator).unwrap();
            let split_charge = list.charge();

            assert_eq!(list.to_contiguous(&DefaultAllocator).unwrap(), data);

            let (buf, charge) = list.merge(&DefaultAllocator).unwrap();
            assert_eq!(buf, data);
            assert_eq!(charge, len);
            assert!(split_charge >= charge);
        }
    }

    #[test]
    fn test_split_allocation_failure() {
        let data = random_bytes(3 * chunk_payload_capacity(16384));
        let allocator = FailingAllocator::new(2);

        let err = ChunkList::split(&data, Compression::None, &allocator).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Alloc);
        assert_eq!(allocator.allocations(), 2);
        assert_eq!(allocator.failures(), 1);
    }
}
