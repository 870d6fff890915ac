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

//! Utilities for testing.

use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use cellar_common::{
    allocator::{DefaultAllocator, MemoryAllocator},
    error::{Error, Result},
    event::{Event, EventListener},
};
use parking_lot::{Mutex, MutexGuard};

use crate::value::CompressedValue;

/// An allocator that fails every allocation after the given count of successful ones.
#[derive(Debug)]
pub struct FailingAllocator {
    budget: usize,
    allocations: AtomicUsize,
    failures: AtomicUsize,
}

impl FailingAllocator {
    /// Create an allocator that serves `budget` allocations before failing.
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            allocations: AtomicUsize::new(0),
            failures: AtomicUsize::new(0),
        }
    }

    /// Count of successful allocations.
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Count of failed allocations.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::Relaxed)
    }
}

impl MemoryAllocator for FailingAllocator {
    fn name(&self) -> &'static str {
        "FailingAllocator"
    }

    fn allocate(&self, size: usize) -> Result<Vec<u8>> {
        let granted = self
            .allocations
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| (n < self.budget).then_some(n + 1))
            .is_ok();
        if !granted {
            self.failures.fetch_add(1, Ordering::Relaxed);
            return Err(Error::alloc(size, std::io::Error::other("injected allocation failure")));
        }
        DefaultAllocator.allocate(size)
    }
}

/// An event listener that records the events, keys and charges of all values leaving the cache.
#[derive(Debug, Default)]
pub struct Recorder {
    events: Mutex<Vec<(Event, Bytes, usize)>>,
}

impl Recorder {
    /// Get all recorded events.
    pub fn events(&self) -> MutexGuard<'_, Vec<(Event, Bytes, usize)>> {
        self.events.lock()
    }

    /// Count of the recorded events of the given kind.
    pub fn count(&self, event: Event) -> usize {
        self.events.lock().iter().filter(|(e, _, _)| *e == event).count()
    }
}

impl EventListener for Recorder {
    type Key = Bytes;
    type Value = CompressedValue;

    fn on_leave(&self, reason: Event, key: &Bytes, value: &CompressedValue) {
        self.events.lock().push((reason, key.clone(), value.charge()));
    }
}
