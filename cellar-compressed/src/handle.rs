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

use crate::secondary::SecondaryCacheResultHandle;

/// The handle of a value materialized by a compressed secondary cache lookup.
///
/// The value is materialized before the handle is returned, so the handle is always ready.
#[derive(Debug)]
pub struct ResultHandle<T> {
    value: T,
    size: usize,
}

impl<T> ResultHandle<T> {
    /// Create a ready handle.
    pub fn new(value: T, size: usize) -> Self {
        Self { value, size }
    }
}

impl<T> SecondaryCacheResultHandle<T> for ResultHandle<T> {
    fn is_ready(&self) -> bool {
        true
    }

    fn wait(&mut self) {}

    fn value(&self) -> &T {
        &self.value
    }

    fn size(&self) -> usize {
        self.size
    }

    fn into_value(self) -> T {
        self.value
    }
}
