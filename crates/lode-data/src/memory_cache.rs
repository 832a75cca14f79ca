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

//! The byte-budgeted LRU memory cache.
//!
//! Nothing here recycles values: every operation that drops entries returns
//! them so the owner can recycle them outside of the cache lock.

use crate::lock;
use lode_core::cache::TrimLevel;
use std::fmt;
use std::hash::Hash;
use std::sync::Mutex;

/// Computes the byte footprint of a cached value.
pub type SizeOf<V> = Box<dyn Fn(&V) -> usize + Send + Sync>;

/// A least-recently-used map bounded by the sum of its entries' sizes.
pub struct LruCache<K: Hash + Eq, V> {
    entries: hashlink::LruCache<K, V>,
    size_of: SizeOf<V>,
    initial_max_size: usize,
    max_size: usize,
    current_size: usize,
}

impl<K: Hash + Eq + Clone, V> LruCache<K, V> {
    /// Creates an empty cache of at most `max_size` bytes.
    pub fn new(max_size: usize, size_of: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        Self {
            entries: hashlink::LruCache::new_unbounded(),
            size_of: Box::new(size_of),
            initial_max_size: max_size,
            max_size,
            current_size: 0,
        }
    }

    /// Returns the value for `key`, marking it most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    /// Returns the value for `key` without touching the LRU order.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.peek(key)
    }

    /// Whether `key` is cached.
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Inserts `value`, returning every entry pushed out by it.
    ///
    /// A value larger than the whole budget is not stored and comes straight
    /// back in the returned list, as does a value it replaces.
    pub fn put(&mut self, key: K, value: V) -> Vec<(K, V)> {
        let size = (self.size_of)(&value);
        if size > self.max_size {
            return vec![(key, value)];
        }

        let mut evicted = Vec::new();
        self.current_size += size;
        if let Some(previous) = self.entries.insert(key.clone(), value) {
            self.current_size = self.current_size.saturating_sub((self.size_of)(&previous));
            evicted.push((key, previous));
        }
        self.trim_into(self.max_size, &mut evicted);
        evicted
    }

    /// Removes and returns the value for `key`.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        self.current_size = self.current_size.saturating_sub((self.size_of)(&value));
        Some(value)
    }

    /// Evicts least recently used entries until at most `size` bytes remain.
    pub fn trim_to_size(&mut self, size: usize) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        self.trim_into(size, &mut evicted);
        evicted
    }

    fn trim_into(&mut self, size: usize, evicted: &mut Vec<(K, V)>) {
        while self.current_size > size {
            let Some((key, value)) = self.entries.remove_lru() else {
                self.current_size = 0;
                break;
            };
            self.current_size = self.current_size.saturating_sub((self.size_of)(&value));
            evicted.push((key, value));
        }
    }

    /// Scales the budget to `multiplier` times the initial budget.
    pub fn set_size_multiplier(&mut self, multiplier: f32) -> Vec<(K, V)> {
        self.max_size =
            (self.initial_max_size as f64 * multiplier.max(0.0) as f64).round() as usize;
        self.trim_to_size(self.max_size)
    }

    /// Removes every entry.
    pub fn clear(&mut self) -> Vec<(K, V)> {
        self.trim_to_size(0)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes currently cached.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// The current byte budget.
    pub fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<K: Hash + Eq, V> fmt::Debug for LruCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruCache")
            .field("len", &self.entries.len())
            .field("current_size", &self.current_size)
            .field("max_size", &self.max_size)
            .finish()
    }
}

/// The second in-memory cache tier, consulted after the active resources.
///
/// Every method that drops entries returns them; the caller recycles them.
pub trait MemoryCache<K, V>: Send + Sync {
    /// Removes and returns the entry for `key`.
    fn remove(&self, key: &K) -> Option<V>;

    /// Inserts an entry, returning whatever had to leave.
    fn put(&self, key: K, value: V) -> Vec<(K, V)>;

    /// Whether `key` is cached.
    fn contains(&self, key: &K) -> bool;

    /// Reacts to memory pressure.
    fn trim_memory(&self, level: TrimLevel) -> Vec<(K, V)>;

    /// Removes every entry.
    fn clear_memory(&self) -> Vec<(K, V)>;

    /// Scales the budget relative to its initial value.
    fn set_size_multiplier(&self, multiplier: f32) -> Vec<(K, V)>;

    /// Bytes currently cached.
    fn current_size(&self) -> usize;

    /// The current byte budget.
    fn max_size(&self) -> usize;
}

/// A thread-safe [`MemoryCache`] over an [`LruCache`].
pub struct LruResourceCache<K: Hash + Eq, V> {
    inner: Mutex<LruCache<K, V>>,
}

impl<K: Hash + Eq + Clone, V> LruResourceCache<K, V> {
    /// Creates a cache of at most `max_size` bytes.
    pub fn new(max_size: usize, size_of: impl Fn(&V) -> usize + Send + Sync + 'static) -> Self {
        log::debug!("LruResourceCache: created with a budget of {max_size} bytes.");
        Self {
            inner: Mutex::new(LruCache::new(max_size, size_of)),
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

impl<K, V> MemoryCache<K, V> for LruResourceCache<K, V>
where
    K: Hash + Eq + Clone + Send,
    V: Send,
{
    fn remove(&self, key: &K) -> Option<V> {
        lock(&self.inner).remove(key)
    }

    fn put(&self, key: K, value: V) -> Vec<(K, V)> {
        lock(&self.inner).put(key, value)
    }

    fn contains(&self, key: &K) -> bool {
        lock(&self.inner).contains(key)
    }

    fn trim_memory(&self, level: TrimLevel) -> Vec<(K, V)> {
        let mut cache = lock(&self.inner);
        if level.should_clear() {
            log::debug!("LruResourceCache: clearing for {level:?}.");
            cache.clear()
        } else if level.should_halve() {
            let half = cache.max_size() / 2;
            cache.trim_to_size(half)
        } else {
            Vec::new()
        }
    }

    fn clear_memory(&self) -> Vec<(K, V)> {
        lock(&self.inner).clear()
    }

    fn set_size_multiplier(&self, multiplier: f32) -> Vec<(K, V)> {
        lock(&self.inner).set_size_multiplier(multiplier)
    }

    fn current_size(&self) -> usize {
        lock(&self.inner).current_size()
    }

    fn max_size(&self) -> usize {
        lock(&self.inner).max_size()
    }
}

impl<K: Hash + Eq, V> fmt::Debug for LruResourceCache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("LruResourceCache")
            .field(&*lock(&self.inner))
            .finish()
    }
}
