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

use parking_lot::{Mutex, MutexGuard};

/// Count of `try_lock` attempts before an adaptive lock parks the thread.
const ADAPTIVE_SPIN_LIMIT: usize = 100;

/// The lock that guards a shard.
///
/// An adaptive lock spins on `try_lock` for a while before parking, which helps when critical sections are short and
/// contended.
#[derive(Debug)]
pub struct ShardLock<T> {
    inner: Mutex<T>,
    adaptive: bool,
}

impl<T> ShardLock<T> {
    pub fn new(val: T, adaptive: bool) -> Self {
        Self {
            inner: Mutex::new(val),
            adaptive,
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, T> {
        if self.adaptive {
            for _ in 0..ADAPTIVE_SPIN_LIMIT {
                if let Some(guard) = self.inner.try_lock() {
                    return guard;
                }
                std::hint::spin_loop();
            }
        }
        self.inner.lock()
    }
}
