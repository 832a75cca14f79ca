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

//! Reference-counted resources handed out by the engine.

use lode_core::key::Key;
use lode_core::pipeline::DataSource;
use lode_core::resource::ErasedResource;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A decoded payload plus the count of leases currently holding it.
///
/// While the count is above zero the payload is neither recycled nor placed in
/// the memory cache. The count only changes inside the engine.
pub struct EngineResource {
    key: Key,
    payload: Arc<ErasedResource>,
    acquired: AtomicUsize,
    memory_cacheable: bool,
    source: DataSource,
}

impl EngineResource {
    pub(crate) fn new(
        key: Key,
        payload: Arc<ErasedResource>,
        memory_cacheable: bool,
        source: DataSource,
        acquired: usize,
    ) -> Self {
        Self {
            key,
            payload,
            acquired: AtomicUsize::new(acquired),
            memory_cacheable,
            source,
        }
    }

    /// The key the resource was loaded for.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Number of outstanding leases.
    pub fn acquired(&self) -> usize {
        self.acquired.load(Ordering::SeqCst)
    }

    /// Whether the resource goes to the memory cache once unreferenced.
    pub fn is_memory_cacheable(&self) -> bool {
        self.memory_cacheable
    }

    /// Where the data came from when the resource was produced.
    pub fn data_source(&self) -> DataSource {
        self.source
    }

    /// Estimated byte footprint, used by the memory cache.
    pub fn size(&self) -> usize {
        self.payload.size()
    }

    /// The payload, if it is a `Z`.
    pub fn get<Z: 'static>(&self) -> Option<&Z> {
        self.payload.downcast_ref::<Z>()
    }

    pub(crate) fn payload(&self) -> &Arc<ErasedResource> {
        &self.payload
    }

    pub(crate) fn acquire(&self) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    /// Returns the remaining count.
    pub(crate) fn release(&self) -> usize {
        let previous = self
            .acquired
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |count| count.checked_sub(1));
        match previous {
            Ok(previous) => previous - 1,
            Err(_) => {
                log::error!("EngineResource {}: released more often than acquired", self.key);
                0
            }
        }
    }
}

impl fmt::Debug for EngineResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineResource")
            .field("key", &self.key)
            .field("acquired", &self.acquired())
            .field("memory_cacheable", &self.memory_cacheable)
            .field("payload", &self.payload)
            .finish()
    }
}

/// Recycles the payload of an unreferenced resource.
///
/// Nothing is recycled while another handle to the resource or its payload is
/// alive; the payload is then simply dropped with its last owner.
pub(crate) fn recycle(resource: Arc<EngineResource>) {
    let resource = match Arc::try_unwrap(resource) {
        Ok(resource) => resource,
        Err(shared) => {
            log::warn!(
                "EngineResource {}: still shared, skipping recycle",
                shared.key
            );
            return;
        }
    };
    let EngineResource { key, payload, .. } = resource;
    match Arc::try_unwrap(payload) {
        Ok(payload) => {
            log::trace!("EngineResource {key}: recycled");
            payload.recycle();
        }
        Err(_) => log::warn!("EngineResource {key}: payload still shared, skipping recycle"),
    }
}

/// One caller's hold on an [`EngineResource`].
///
/// Give it back with [`crate::Engine::release`]. A lease that is simply dropped
/// is abandoned: its count is never decremented and the payload is recovered
/// by the next [`crate::Engine::sweep_abandoned`].
pub struct ResourceLease {
    resource: Arc<EngineResource>,
    source: DataSource,
    released: bool,
}

impl ResourceLease {
    pub(crate) fn new(resource: Arc<EngineResource>, source: DataSource) -> Self {
        Self {
            resource,
            source,
            released: false,
        }
    }

    /// The payload, if it is a `Z`.
    pub fn get<Z: 'static>(&self) -> Option<&Z> {
        self.resource.get::<Z>()
    }

    /// Whether the payload is a `Z`.
    pub fn is<Z: 'static>(&self) -> bool {
        self.resource.payload.is::<Z>()
    }

    /// Type name of the payload.
    pub fn payload_type_name(&self) -> &'static str {
        self.resource.payload.payload_type_name()
    }

    /// The key the resource was loaded for.
    pub fn key(&self) -> &Key {
        self.resource.key()
    }

    /// Where this delivery came from; [`DataSource::MemoryCache`] for hits on
    /// the active set or the memory cache.
    pub fn data_source(&self) -> DataSource {
        self.source
    }

    /// The shared resource behind this lease.
    pub fn resource(&self) -> &Arc<EngineResource> {
        &self.resource
    }

    pub(crate) fn into_resource(mut self) -> Arc<EngineResource> {
        self.released = true;
        self.resource.clone()
    }
}

impl Drop for ResourceLease {
    fn drop(&mut self) {
        if !self.released {
            log::debug!(
                "ResourceLease {}: dropped without release, left for the sweep",
                self.resource.key
            );
        }
    }
}

impl fmt::Debug for ResourceLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceLease")
            .field("key", self.resource.key())
            .field("released", &self.released)
            .finish()
    }
}
