// Copyright 2025 eraflo
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

//! # Lode Data
//!
//! The memory-side data structures of the loading engine: byte-budgeted object
//! pools for pixel buffers and byte arrays, the LRU memory cache, simple disk
//! cache adapters and the calculator that derives all of their budgets.

#![warn(missing_docs)]

pub mod disk;
pub mod memory_cache;
pub mod pool;
pub mod sizing;

pub use disk::{InMemoryDiskCache, NoopDiskCache};
pub use memory_cache::{LruCache, LruResourceCache, MemoryCache};
pub use pool::{
    AttributeStrategy, BucketStrategy, ByteArrayPool, LruPool, PixelBuffer, PixelBufferPool,
    PixelFormat, PoolStats, PooledPixelResource, SizeFormatStrategy,
};
pub use sizing::{MemoryBudgets, MemorySizeCalculator};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks `mutex`, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
