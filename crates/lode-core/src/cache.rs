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

//! Cache-tier contracts: the disk cache interface, disk caching strategies and
//! memory pressure levels.

use crate::key::DiskKey;
use crate::pipeline::{DataSource, EncodeStrategy};
use serde::{Deserialize, Serialize};
use std::io::Write;

/// Streams one entry into the disk cache.
pub trait DiskCacheWriter {
    /// Writes the entry; returning `false` aborts the put.
    fn write(&self, sink: &mut dyn Write) -> bool;
}

impl<F> DiskCacheWriter for F
where
    F: Fn(&mut dyn Write) -> bool,
{
    fn write(&self, sink: &mut dyn Write) -> bool {
        self(sink)
    }
}

/// Persistent storage of encoded bytes, addressed by [`DiskKey`].
///
/// Implementations must be safe to call from several executor threads. The
/// byte layout of entries is owned by the encoders; the cache only stores it.
pub trait DiskCache: Send + Sync {
    /// Returns the stored bytes for `key`, if any.
    fn get(&self, key: &DiskKey) -> Option<Vec<u8>>;

    /// Stores whatever `writer` produces under `key`. A writer returning
    /// `false` leaves the cache unchanged.
    fn put(&self, key: &DiskKey, writer: &dyn DiskCacheWriter);

    /// Removes the entry for `key`.
    fn delete(&self, key: &DiskKey);

    /// Removes every entry.
    fn clear(&self);
}

/// Which artifacts a load reads from and writes to the disk cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiskCacheStrategy {
    /// Cache remote source data and transformed resources.
    All,
    /// Never touch the disk cache.
    None,
    /// Cache unmodified source data only.
    Data,
    /// Cache transformed resources only.
    Resource,
    /// Cache remote data, and transformed resources for local data.
    #[default]
    Automatic,
}

impl DiskCacheStrategy {
    /// Whether source data from `source` should be written to the disk cache.
    pub fn is_data_cacheable(self, source: DataSource) -> bool {
        match self {
            DiskCacheStrategy::All | DiskCacheStrategy::Automatic => source == DataSource::Remote,
            DiskCacheStrategy::Data => {
                source != DataSource::DataDiskCache && source != DataSource::MemoryCache
            }
            DiskCacheStrategy::None | DiskCacheStrategy::Resource => false,
        }
    }

    /// Whether a transformed resource should be written to the disk cache.
    pub fn is_resource_cacheable(
        self,
        from_alternate_key: bool,
        source: DataSource,
        encode_strategy: EncodeStrategy,
    ) -> bool {
        match self {
            DiskCacheStrategy::All | DiskCacheStrategy::Resource => {
                source != DataSource::ResourceDiskCache && source != DataSource::MemoryCache
            }
            DiskCacheStrategy::Automatic => {
                ((from_alternate_key && source == DataSource::DataDiskCache)
                    || source == DataSource::Local)
                    && encode_strategy == EncodeStrategy::Transformed
            }
            DiskCacheStrategy::None | DiskCacheStrategy::Data => false,
        }
    }

    /// Whether cached transformed resources may be decoded.
    pub fn decode_cached_resource(self) -> bool {
        matches!(
            self,
            DiskCacheStrategy::All | DiskCacheStrategy::Resource | DiskCacheStrategy::Automatic
        )
    }

    /// Whether cached source data may be decoded.
    pub fn decode_cached_data(self) -> bool {
        matches!(
            self,
            DiskCacheStrategy::All | DiskCacheStrategy::Data | DiskCacheStrategy::Automatic
        )
    }

    /// Whether a load with this strategy starts with a disk-cache lookup.
    pub fn reads_disk_cache(self) -> bool {
        self.decode_cached_resource() || self.decode_cached_data()
    }
}

/// Memory pressure reported by the host, from mildest to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TrimLevel {
    /// Running, memory getting tight.
    RunningModerate,
    /// Running, memory low.
    RunningLow,
    /// Running, memory critically low.
    RunningCritical,
    /// The UI is no longer visible.
    UiHidden,
    /// The process is in the background.
    Background,
    /// The process is in the middle of the background list.
    Moderate,
    /// The process is next to be reclaimed.
    Complete,
}

impl TrimLevel {
    /// Caches and pools should drop everything.
    pub fn should_clear(self) -> bool {
        self >= TrimLevel::Background
    }

    /// Caches and pools should shrink to half their budget.
    pub fn should_halve(self) -> bool {
        !self.should_clear() && (self >= TrimLevel::UiHidden || self == TrimLevel::RunningCritical)
    }
}
