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

//! Shared components for cellar.

/// Memory allocator abstraction for cache values.
pub mod allocator;
/// Assertion helpers.
pub mod assert;
/// Key and hasher traits.
pub mod code;
/// Compression codecs for cache values.
pub mod compress;
/// The error type of cellar.
pub mod error;
/// Cache events and event listener.
pub mod event;
/// Metrics for cellar.
pub mod metrics;
