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

//! Resources currently held by at least one lease.

use crate::resource::EngineResource;
use ahash::AHashMap;
use lode_core::key::Key;
use lode_core::pipeline::DataSource;
use lode_core::resource::ErasedResource;
use std::sync::{Arc, Mutex, Weak};

struct ActiveEntry {
    resource: Weak<EngineResource>,
    // Keeps the payload alive when every lease is dropped without release.
    payload: Arc<ErasedResource>,
    memory_cacheable: bool,
}

impl ActiveEntry {
    fn new(resource: &Arc<EngineResource>) -> Self {
        Self {
            resource: Arc::downgrade(resource),
            payload: resource.payload().clone(),
            memory_cacheable: resource.is_memory_cacheable(),
        }
    }

    fn revive(&self, key: &Key, acquired: usize) -> Arc<EngineResource> {
        Arc::new(EngineResource::new(
            key.clone(),
            self.payload.clone(),
            self.memory_cacheable,
            DataSource::MemoryCache,
            acquired,
        ))
    }
}

/// Key to resource map of everything with outstanding leases.
///
/// Ownership lives in the leases; the map only holds weak references plus
/// the payloads, so payloads of abandoned leases can be recovered by
/// [`ActiveResources::sweep`].
#[derive(Default)]
pub struct ActiveResources {
    entries: Mutex<AHashMap<Key, ActiveEntry>>,
}

impl ActiveResources {
    /// An empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `resource`. A previous entry for the same key is returned
    /// with its payload when it was abandoned.
    pub fn activate(&self, resource: &Arc<EngineResource>) -> Option<Arc<EngineResource>> {
        let key = resource.key().clone();
        let previous = crate::lock(&self.entries).insert(key.clone(), ActiveEntry::new(resource))?;
        if previous.resource.upgrade().is_some() {
            return None;
        }
        Some(previous.revive(&key, 0))
    }

    /// Acquires the resource for `key` if it is active.
    ///
    /// An entry whose leases were all dropped is revived with a count of one.
    pub fn acquire(&self, key: &Key) -> Option<Arc<EngineResource>> {
        let mut entries = crate::lock(&self.entries);
        let entry = entries.get_mut(key)?;
        if let Some(resource) = entry.resource.upgrade() {
            resource.acquire();
            return Some(resource);
        }
        log::debug!("ActiveResources: reviving abandoned resource {key}");
        let revived = entry.revive(key, 1);
        entry.resource = Arc::downgrade(&revived);
        Some(revived)
    }

    /// Releases one lease on `resource`.
    ///
    /// When the count reaches zero the entry is removed and `on_idle` runs
    /// with the resource before the map is unlocked, so a concurrent
    /// [`ActiveResources::acquire`] either sees the entry or whatever `on_idle`
    /// did with it.
    pub fn release<T>(
        &self,
        resource: Arc<EngineResource>,
        on_idle: impl FnOnce(Arc<EngineResource>) -> T,
    ) -> Option<T> {
        let mut entries = crate::lock(&self.entries);
        if resource.release() > 0 {
            return None;
        }
        let owned = entries
            .get(resource.key())
            .is_some_and(|entry| std::ptr::eq(entry.resource.as_ptr(), Arc::as_ptr(&resource)));
        if owned {
            entries.remove(resource.key());
        }
        Some(on_idle(resource))
    }

    /// Removes every entry whose leases were dropped without release and
    /// hands their payloads to `on_abandoned`, one idle resource each.
    ///
    /// Returns how many entries were recovered.
    pub fn sweep(&self, mut on_abandoned: impl FnMut(Arc<EngineResource>)) -> usize {
        let mut entries = crate::lock(&self.entries);
        let dead: Vec<Key> = entries
            .iter()
            .filter(|(_, entry)| entry.resource.strong_count() == 0)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &dead {
            if let Some(entry) = entries.remove(key) {
                let ActiveEntry {
                    payload,
                    memory_cacheable,
                    ..
                } = entry;
                on_abandoned(Arc::new(EngineResource::new(
                    key.clone(),
                    payload,
                    memory_cacheable,
                    DataSource::MemoryCache,
                    0,
                )));
            }
        }
        if !dead.is_empty() {
            log::debug!("ActiveResources: recovered {} abandoned resource(s)", dead.len());
        }
        dead.len()
    }

    /// Whether `key` is active.
    pub fn contains(&self, key: &Key) -> bool {
        crate::lock(&self.entries).contains_key(key)
    }

    /// Number of active entries, abandoned ones included.
    pub fn len(&self) -> usize {
        crate::lock(&self.entries).len()
    }

    /// Whether nothing is active.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lode_core::key::Dimensions;
    use lode_core::model::ModelRef;
    use lode_core::resource::SimpleResource;

    fn resource(model: &'static str, acquired: usize) -> Arc<EngineResource> {
        let payload = Arc::new(ErasedResource::new(SimpleResource::boxed(
            model.to_string(),
            8,
        )));
        Arc::new(EngineResource::new(
            Key::new(&ModelRef::new(model), Dimensions::new(4, 4)),
            payload,
            true,
            DataSource::Remote,
            acquired,
        ))
    }

    #[test]
    fn acquire_and_release_track_the_count() {
        let active = ActiveResources::new();
        let first = resource("a", 1);
        assert!(active.activate(&first).is_none());

        let second = active.acquire(first.key()).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.acquired(), 2);

        assert!(active.release(second, |_| ()).is_none());
        assert!(active.contains(first.key()));

        let idle = active.release(first, |idle| idle).unwrap();
        assert_eq!(idle.acquired(), 0);
        assert!(active.is_empty());
    }

    #[test]
    fn sweep_recovers_abandoned_payloads() {
        let active = ActiveResources::new();
        let abandoned = resource("lost", 1);
        let kept = resource("kept", 1);
        active.activate(&abandoned);
        active.activate(&kept);
        drop(abandoned);

        let mut recovered = Vec::new();
        assert_eq!(active.sweep(|resource| recovered.push(resource)), 1);
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].get::<String>().map(String::as_str), Some("lost"));
        assert_eq!(recovered[0].acquired(), 0);
        assert_eq!(active.len(), 1);
        assert_eq!(active.sweep(|_| {}), 0);
        drop(kept);
    }

    #[test]
    fn abandoned_entry_is_revived_on_acquire() {
        let active = ActiveResources::new();
        let key = {
            let dropped = resource("again", 1);
            active.activate(&dropped);
            dropped.key().clone()
        };
        let revived = active.acquire(&key).unwrap();
        assert_eq!(revived.acquired(), 1);
        assert_eq!(revived.get::<String>().map(String::as_str), Some("again"));
        assert_eq!(active.sweep(|_| {}), 0);
    }
}
