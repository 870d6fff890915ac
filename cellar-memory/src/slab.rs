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

/// A token that can be used to access the allocated entry in [`Slab`].
///
/// [`Token`] can be used like an index. It is stale once the entry is removed from the slab, and the slot may be
/// reused by a later insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token(usize);

enum Entry<T> {
    Vacant(usize),
    Occupied(T),
}

/// A slab allocator for typed data structures to keep allocation/deallocation ops cheap.
///
/// Vacant slots form a free list threaded through the slab, so a removed slot is reused by the next insertion.
pub struct Slab<T> {
    entries: Vec<Entry<T>>,
    /// Allocated entry count.
    len: usize,
    /// Next slot to allocate.
    next: usize,
}

impl<T> Debug for Slab<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Slab")
            .field("capacity", &self.entries.len())
            .field("len", &self.len)
            .field("next", &self.next)
            .finish()
    }
}

impl<T> Default for Slab<T> {
    fn default() -> Self {
        Self {
            entries: vec![],
            len: 0,
            next: 0,
        }
    }
}

impl<T> Slab<T> {
    /// The count of allocated entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Insert a new entry into the slab.
    pub fn insert(&mut self, val: T) -> Token {
        let index = self.next;

        if index == self.entries.len() {
            self.entries.push(Entry::Occupied(val));
            self.next = index + 1;
        } else {
            self.next = match &self.entries[index] {
                &Entry::Vacant(next) => next,
                _ => panic!("invalid index (unexpected occupied): {index}"),
            };
            self.entries[index] = Entry::Occupied(val);
        }

        self.len += 1;

        Token(index)
    }

    /// Remove an inserted entry from the slab.
    ///
    /// # Panics
    ///
    /// Panics if the token is stale.
    pub fn remove(&mut self, token: Token) -> T {
        let index = token.0;
        match std::mem::replace(&mut self.entries[index], Entry::Vacant(self.next)) {
            Entry::Occupied(val) => {
                self.next = index;
                self.len -= 1;
                val
            }
            Entry::Vacant(next) => {
                self.entries[index] = Entry::Vacant(next);
                panic!("invalid index (unexpected vacant): {index}")
            }
        }
    }

    /// Get the reference of an entry.
    ///
    /// # Panics
    ///
    /// Panics if the token is stale.
    pub fn get(&self, token: Token) -> &T {
        match &self.entries[token.0] {
            Entry::Occupied(val) => val,
            Entry::Vacant(_) => panic!("invalid index (unexpected vacant): {}", token.0),
        }
    }

    /// Get the mutable reference of an entry.
    ///
    /// # Panics
    ///
    /// Panics if the token is stale.
    pub fn get_mut(&mut self, token: Token) -> &mut T {
        match &mut self.entries[token.0] {
            Entry::Occupied(val) => val,
            Entry::Vacant(_) => panic!("invalid index (unexpected vacant): {}", token.0),
        }
    }

    /// Remove all entries, returning them in slot order.
    pub fn drain(&mut self) -> impl Iterator<Item = T> + '_ {
        self.len = 0;
        self.next = 0;
        self.entries.drain(..).filter_map(|entry| match entry {
            Entry::Occupied(val) => Some(val),
            Entry::Vacant(_) => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slab_reuse() {
        let mut slab = Slab::default();
        let t0 = slab.insert(0);
        let t1 = slab.insert(1);
        let t2 = slab.insert(2);
        assert_eq!(slab.len(), 3);

        assert_eq!(slab.remove(t1), 1);
        assert_eq!(slab.len(), 2);

        // The vacant slot is reused first.
        let t3 = slab.insert(3);
        assert_eq!(t3, t1);
        assert_eq!(*slab.get(t3), 3);

        *slab.get_mut(t0) = 10;
        assert_eq!(*slab.get(t0), 10);

        assert_eq!(slab.remove(t2), 2);
        assert_eq!(slab.remove(t0), 10);
        let t4 = slab.insert(4);
        assert_eq!(t4, t0);

        let mut drained = slab.drain().collect::<Vec<_>>();
        drained.sort();
        assert_eq!(drained, vec![3, 4]);
        assert_eq!(slab.len(), 0);
    }

    #[test]
    #[should_panic]
    fn test_slab_stale_token() {
        let mut slab = Slab::default();
        let t = slab.insert(1);
        slab.remove(t);
        slab.get(t);
    }
}
