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

//! Byte-budgeted object pools.
//!
//! [`LruPool`] is the generic engine: it groups pooled items into buckets
//! chosen by a [`BucketStrategy`] and keeps the buckets in least-recently-used
//! order. The concrete pools ([`PixelBufferPool`], [`ByteArrayPool`]) wrap it
//! behind a mutex so decoders on any executor thread can share them.

mod bytes;
mod pixel;

pub use bytes::{ByteArrayPool, ByteArrayStrategy};
pub use pixel::{
    AttributeStrategy, PixelBuffer, PixelBufferPool, PixelFormat, PixelRequest,
    PooledPixelResource, SizeFormatStrategy,
};

use hashlink::LinkedHashMap;
use lode_core::cache::TrimLevel;
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::hash::Hash;

/// Decides how pooled items are grouped and matched against requests.
///
/// Buckets are ordered: a request may be served from any non-empty bucket
/// between [`BucketStrategy::bucket_for`] and
/// [`BucketStrategy::largest_compatible`], smallest first.
pub trait BucketStrategy: Send + 'static {
    /// The pooled item.
    type Item: Send;
    /// What a caller asks for.
    type Request: fmt::Debug;
    /// The grouping key.
    type Bucket: Ord + Hash + Clone + fmt::Debug + Send;

    /// The bucket an item is stored in.
    fn bucket_of(&self, item: &Self::Item) -> Self::Bucket;

    /// The exact bucket for a request.
    fn bucket_for(&self, request: &Self::Request) -> Self::Bucket;

    /// The largest bucket whose items can still serve `request`.
    fn largest_compatible(&self, request: &Self::Request) -> Self::Bucket {
        self.bucket_for(request)
    }

    /// Byte footprint of an item, counted against the pool budget.
    fn size_of(&self, item: &Self::Item) -> usize;

    /// Whether an item may be pooled at all.
    fn is_reusable(&self, _item: &Self::Item) -> bool {
        true
    }

    /// Largest single item accepted by a pool whose budget is `max_size`.
    fn max_item_size(&self, max_size: usize) -> usize {
        max_size
    }

    /// Adjusts an item taken from the pool to match `request`.
    fn prepare(&self, _item: &mut Self::Item, _request: &Self::Request) {}
}

/// Counters describing how a pool has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Requests served from the pool.
    pub hits: u64,
    /// Requests the pool could not serve.
    pub misses: u64,
    /// Items accepted by `put`.
    pub puts: u64,
    /// Items refused by `put`.
    pub rejections: u64,
    /// Items dropped to stay within budget.
    pub evictions: u64,
    /// Bytes currently pooled.
    pub current_size: usize,
    /// Current byte budget.
    pub max_size: usize,
}

/// A generic pool keeping items grouped by bucket in LRU order.
///
/// Both `get` and `put` refresh the touched bucket. Eviction takes the oldest
/// item of the least recently used bucket. Within a bucket, `get` returns the
/// most recently `put` item.
pub struct LruPool<S: BucketStrategy> {
    strategy: S,
    groups: LinkedHashMap<S::Bucket, VecDeque<S::Item>>,
    non_empty: BTreeSet<S::Bucket>,
    initial_max_size: usize,
    max_size: usize,
    current_size: usize,
    stats: PoolStats,
}

impl<S: BucketStrategy> LruPool<S> {
    /// Creates an empty pool holding at most `max_size` bytes.
    pub fn new(strategy: S, max_size: usize) -> Self {
        Self {
            strategy,
            groups: LinkedHashMap::new(),
            non_empty: BTreeSet::new(),
            initial_max_size: max_size,
            max_size,
            current_size: 0,
            stats: PoolStats::default(),
        }
    }

    /// The bucketing strategy.
    pub fn strategy(&self) -> &S {
        &self.strategy
    }

    /// Takes the smallest compatible item for `request`, if any.
    pub fn get(&mut self, request: &S::Request) -> Option<S::Item> {
        let lo = self.strategy.bucket_for(request);
        let hi = self.strategy.largest_compatible(request).max(lo.clone());
        let bucket = self.non_empty.range(lo..=hi).next().cloned();
        self.take(bucket, request)
    }

    /// Takes an item from exactly the request's bucket, if any.
    pub fn get_exact(&mut self, request: &S::Request) -> Option<S::Item> {
        let bucket = self.strategy.bucket_for(request);
        let bucket = self.non_empty.contains(&bucket).then_some(bucket);
        self.take(bucket, request)
    }

    fn take(&mut self, bucket: Option<S::Bucket>, request: &S::Request) -> Option<S::Item> {
        let Some(bucket) = bucket else {
            self.stats.misses += 1;
            return None;
        };
        let (item, emptied) = {
            let group = self.groups.to_back(&bucket)?;
            let item = group.pop_back()?;
            (item, group.is_empty())
        };
        if emptied {
            self.groups.remove(&bucket);
            self.non_empty.remove(&bucket);
        }
        let mut item = item;
        self.current_size = self
            .current_size
            .saturating_sub(self.strategy.size_of(&item));
        self.strategy.prepare(&mut item, request);
        self.stats.hits += 1;
        log::trace!("LruPool: hit in bucket {bucket:?} for {request:?}");
        Some(item)
    }

    /// Offers `item` to the pool.
    ///
    /// Returns the item back when it is rejected: the budget is zero, the item is
    /// larger than the strategy allows, or it is not reusable.
    pub fn put(&mut self, item: S::Item) -> Result<(), S::Item> {
        let size = self.strategy.size_of(&item);
        if self.max_size == 0
            || size > self.strategy.max_item_size(self.max_size)
            || !self.strategy.is_reusable(&item)
        {
            self.stats.rejections += 1;
            return Err(item);
        }

        let bucket = self.strategy.bucket_of(&item);
        self.groups
            .entry(bucket.clone())
            .or_insert_with(VecDeque::new)
            .push_back(item);
        self.groups.to_back(&bucket);
        self.non_empty.insert(bucket);
        self.current_size += size;
        self.stats.puts += 1;

        self.evict_to(self.max_size);
        Ok(())
    }

    /// Scales the budget to `multiplier` times the initial budget, evicting as
    /// needed.
    pub fn set_size_multiplier(&mut self, multiplier: f32) {
        self.max_size = (self.initial_max_size as f64 * multiplier.max(0.0) as f64).round() as usize;
        self.evict_to(self.max_size);
    }

    /// Reacts to memory pressure.
    pub fn trim_memory(&mut self, level: TrimLevel) {
        if level.should_clear() {
            self.clear_memory();
        } else if level.should_halve() {
            self.evict_to(self.max_size / 2);
        }
    }

    /// Drops every pooled item.
    pub fn clear_memory(&mut self) {
        self.evict_to(0);
    }

    /// Bytes currently pooled.
    pub fn current_size(&self) -> usize {
        self.current_size
    }

    /// The current byte budget.
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Usage counters.
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            current_size: self.current_size,
            max_size: self.max_size,
            ..self.stats
        }
    }

    fn evict_to(&mut self, target: usize) {
        while self.current_size > target {
            let Some(bucket) = self.groups.front().map(|(bucket, _)| bucket.clone()) else {
                break;
            };
            let (evicted, emptied) = match self.groups.get_mut(&bucket) {
                Some(group) => (group.pop_front(), group.is_empty()),
                None => (None, true),
            };
            if emptied {
                self.groups.remove(&bucket);
                self.non_empty.remove(&bucket);
            }
            if let Some(item) = evicted {
                self.current_size = self
                    .current_size
                    .saturating_sub(self.strategy.size_of(&item));
                self.stats.evictions += 1;
                log::trace!("LruPool: evicted an item from bucket {bucket:?}");
            }
        }
        if self.groups.is_empty() {
            self.current_size = 0;
        }
    }
}

impl<S: BucketStrategy> fmt::Debug for LruPool<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LruPool")
            .field("buckets", &self.non_empty.len())
            .field("current_size", &self.current_size)
            .field("max_size", &self.max_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Items are plain sizes; buckets are the sizes themselves.
    struct BySize;

    impl BucketStrategy for BySize {
        type Item = (usize, u32);
        type Request = usize;
        type Bucket = usize;

        fn bucket_of(&self, item: &Self::Item) -> usize {
            item.0
        }
        fn bucket_for(&self, request: &usize) -> usize {
            *request
        }
        fn largest_compatible(&self, request: &usize) -> usize {
            request * 2
        }
        fn size_of(&self, item: &Self::Item) -> usize {
            item.0
        }
    }

    #[test]
    fn get_after_put_returns_the_same_item() {
        let mut pool = LruPool::new(BySize, 100);
        pool.put((10, 1)).expect("fits");
        pool.put((10, 2)).expect("fits");

        assert_eq!(pool.get(&10), Some((10, 2)));
        assert_eq!(pool.get(&10), Some((10, 1)));
        assert_eq!(pool.get(&10), None);
        assert_eq!(pool.current_size(), 0);
    }

    #[test]
    fn get_uses_smallest_compatible_bucket() {
        let mut pool = LruPool::new(BySize, 100);
        pool.put((30, 1)).expect("fits");
        pool.put((16, 2)).expect("fits");

        assert_eq!(pool.get(&8), Some((16, 2)));
        assert_eq!(pool.get(&8), None, "30 is more than twice 8");
        assert_eq!(pool.get_exact(&30), Some((30, 1)));
    }

    #[test]
    fn oversize_and_zero_budget_are_rejected() {
        let mut pool = LruPool::new(BySize, 20);
        assert_eq!(pool.put((21, 1)), Err((21, 1)));

        let mut empty = LruPool::new(BySize, 0);
        assert_eq!(empty.put((1, 1)), Err((1, 1)));
        assert_eq!(empty.stats().rejections, 1);
    }

    #[test]
    fn eviction_takes_least_recently_used_bucket() {
        let mut pool = LruPool::new(BySize, 30);
        pool.put((10, 1)).expect("fits");
        pool.put((11, 2)).expect("fits");
        // Touch bucket 10 so bucket 11 becomes the oldest.
        pool.put((10, 3)).expect("fits");
        pool.put((9, 4)).expect("fits");

        assert!(pool.current_size() <= 30);
        assert_eq!(pool.get_exact(&11), None);
        assert_eq!(pool.get_exact(&9), Some((9, 4)));
    }

    #[test]
    fn trim_and_multiplier_shrink_the_pool() {
        let mut pool = LruPool::new(BySize, 100);
        for i in 0..10 {
            pool.put((10, i)).expect("fits");
        }
        pool.trim_memory(TrimLevel::UiHidden);
        assert!(pool.current_size() <= 50);

        pool.set_size_multiplier(0.2);
        assert_eq!(pool.max_size(), 20);
        assert!(pool.current_size() <= 20);

        pool.trim_memory(TrimLevel::Complete);
        assert_eq!(pool.current_size(), 0);
    }
}
