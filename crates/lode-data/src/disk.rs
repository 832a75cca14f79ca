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

//! Ready-made [`DiskCache`] implementations.

use crate::lock;
use crate::memory_cache::LruCache;
use lode_core::cache::{DiskCache, DiskCacheWriter};
use lode_core::key::DiskKey;
use std::sync::Mutex;

/// A disk cache that stores nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopDiskCache;

impl DiskCache for NoopDiskCache {
    fn get(&self, _key: &DiskKey) -> Option<Vec<u8>> {
        None
    }

    fn put(&self, _key: &DiskKey, _writer: &dyn DiskCacheWriter) {}

    fn delete(&self, _key: &DiskKey) {}

    fn clear(&self) {}
}

/// A byte-budgeted disk cache kept in memory.
///
/// Useful for ephemeral sessions and tests; entries do not survive the
/// process.
#[derive(Debug)]
pub struct InMemoryDiskCache {
    entries: Mutex<LruCache<DiskKey, Vec<u8>>>,
}

impl InMemoryDiskCache {
    /// Creates a cache holding at most `max_size` bytes.
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(max_size, |bytes: &Vec<u8>| bytes.len())),
        }
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        lock(&self.entries).is_empty()
    }

    /// Bytes currently stored.
    pub fn current_size(&self) -> usize {
        lock(&self.entries).current_size()
    }
}

impl DiskCache for InMemoryDiskCache {
    fn get(&self, key: &DiskKey) -> Option<Vec<u8>> {
        let mut entries = lock(&self.entries);
        let found = entries.get(key).cloned();
        log::trace!("InMemoryDiskCache: get {key:?} -> {}", found.is_some());
        found
    }

    fn put(&self, key: &DiskKey, writer: &dyn DiskCacheWriter) {
        // Write outside of the lock; encoders can be slow.
        let mut bytes = Vec::new();
        if !writer.write(&mut bytes) {
            log::debug!("InMemoryDiskCache: writer aborted the put for {key:?}.");
            return;
        }
        let evicted = lock(&self.entries).put(*key, bytes);
        if !evicted.is_empty() {
            log::trace!("InMemoryDiskCache: {} entries evicted.", evicted.len());
        }
    }

    fn delete(&self, key: &DiskKey) {
        lock(&self.entries).remove(key);
    }

    fn clear(&self) {
        lock(&self.entries).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn key(byte: u8) -> DiskKey {
        DiskKey::from_bytes([byte; 32])
    }

    #[test]
    fn put_get_delete() {
        let cache = InMemoryDiskCache::new(1024);
        cache.put(&key(1), &|sink: &mut dyn Write| sink.write_all(b"hello").is_ok());

        assert_eq!(cache.get(&key(1)).as_deref(), Some(&b"hello"[..]));
        assert_eq!(cache.get(&key(2)), None);

        cache.delete(&key(1));
        assert!(cache.is_empty());
    }

    #[test]
    fn aborted_writes_store_nothing() {
        let cache = InMemoryDiskCache::new(1024);
        cache.put(&key(1), &|sink: &mut dyn Write| {
            let _ = sink.write_all(b"partial");
            false
        });
        assert_eq!(cache.get(&key(1)), None);
    }

    #[test]
    fn budget_is_enforced() {
        let cache = InMemoryDiskCache::new(8);
        cache.put(&key(1), &|sink: &mut dyn Write| sink.write_all(&[0; 6]).is_ok());
        cache.put(&key(2), &|sink: &mut dyn Write| sink.write_all(&[0; 6]).is_ok());
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(2)).is_some());
    }

    #[test]
    fn noop_cache_never_hits() {
        let cache = NoopDiskCache;
        cache.put(&key(1), &|_: &mut dyn Write| true);
        assert_eq!(cache.get(&key(1)), None);
    }
}
