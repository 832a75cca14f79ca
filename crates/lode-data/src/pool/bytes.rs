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

//! A pool of byte arrays used as scratch space by decoders and encoders.

use super::{BucketStrategy, LruPool, PoolStats};
use crate::lock;
use lode_core::cache::TrimLevel;
use std::sync::Mutex;

const MAX_OVER_SIZE_MULTIPLE: usize = 8;
/// Arrays larger than `max_size / SINGLE_ARRAY_MAX_DIVISOR` are never pooled.
const SINGLE_ARRAY_MAX_DIVISOR: usize = 2;

/// Buckets arrays by length.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteArrayStrategy;

impl BucketStrategy for ByteArrayStrategy {
    type Item = Vec<u8>;
    type Request = usize;
    type Bucket = usize;

    fn bucket_of(&self, item: &Vec<u8>) -> usize {
        item.len()
    }

    fn bucket_for(&self, request: &usize) -> usize {
        *request
    }

    fn largest_compatible(&self, request: &usize) -> usize {
        request.saturating_mul(MAX_OVER_SIZE_MULTIPLE)
    }

    fn size_of(&self, item: &Vec<u8>) -> usize {
        item.len()
    }

    fn is_reusable(&self, item: &Vec<u8>) -> bool {
        !item.is_empty()
    }

    fn max_item_size(&self, max_size: usize) -> usize {
        max_size / SINGLE_ARRAY_MAX_DIVISOR
    }
}

/// A thread-safe pool of `Vec<u8>`.
///
/// Reused arrays keep their previous content.
#[derive(Debug)]
pub struct ByteArrayPool {
    inner: Mutex<LruPool<ByteArrayStrategy>>,
}

impl ByteArrayPool {
    /// Creates a pool holding at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        log::debug!("ByteArrayPool: created with a budget of {max_size} bytes.");
        Self {
            inner: Mutex::new(LruPool::new(ByteArrayStrategy, max_size)),
        }
    }

    /// Returns an array of at least `size` and at most eight times `size` bytes.
    pub fn get(&self, size: usize) -> Vec<u8> {
        lock(&self.inner)
            .get(&size)
            .unwrap_or_else(|| vec![0; size])
    }

    /// Returns an array of exactly `size` bytes.
    pub fn get_exact(&self, size: usize) -> Vec<u8> {
        lock(&self.inner)
            .get_exact(&size)
            .unwrap_or_else(|| vec![0; size])
    }

    /// Offers `array` to the pool, handing it back when rejected.
    pub fn put(&self, array: Vec<u8>) -> Result<(), Vec<u8>> {
        lock(&self.inner).put(array)
    }

    /// Scales the budget relative to its initial value.
    pub fn set_size_multiplier(&self, multiplier: f32) {
        lock(&self.inner).set_size_multiplier(multiplier);
    }

    /// Reacts to memory pressure.
    pub fn trim_memory(&self, level: TrimLevel) {
        lock(&self.inner).trim_memory(level);
    }

    /// Drops every pooled array.
    pub fn clear_memory(&self) {
        lock(&self.inner).clear_memory();
    }

    /// Bytes currently pooled.
    pub fn current_size(&self) -> usize {
        lock(&self.inner).current_size()
    }

    /// Usage counters.
    pub fn stats(&self) -> PoolStats {
        lock(&self.inner).stats()
    }
}
