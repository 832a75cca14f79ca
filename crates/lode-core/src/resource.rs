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

//! Decoded artifacts and their recycling contract.

use std::any::{Any, TypeId};
use std::fmt;

/// A decoded artifact owning a payload of type `T`.
///
/// Recycling consumes the resource: once [`Resource::recycle`] has been called
/// the payload cannot be read again, and it cannot be recycled twice. Pooled
/// implementations hand their backing buffer back to a pool on recycle.
pub trait Resource<T>: Send + Sync {
    /// Borrows the payload.
    fn get(&self) -> &T;

    /// Estimated byte footprint of the payload, used for cache budgets.
    fn size(&self) -> usize;

    /// Releases the payload, returning reusable storage where possible.
    fn recycle(self: Box<Self>);
}

/// An owned, boxed resource.
pub type BoxedResource<T> = Box<dyn Resource<T>>;

/// A resource whose recycling is a plain drop.
#[derive(Debug)]
pub struct SimpleResource<T> {
    value: T,
    size: usize,
}

impl<T: Send + Sync> SimpleResource<T> {
    /// Wraps `value`, reporting `size` bytes to the caches.
    pub fn new(value: T, size: usize) -> Self {
        Self { value, size }
    }

    /// Wraps and boxes `value`.
    pub fn boxed(value: T, size: usize) -> BoxedResource<T>
    where
        T: 'static,
    {
        Box::new(Self::new(value, size))
    }
}

impl<T: Send + Sync> Resource<T> for SimpleResource<T> {
    fn get(&self) -> &T {
        &self.value
    }

    fn size(&self) -> usize {
        self.size
    }

    fn recycle(self: Box<Self>) {}
}

trait ErasedInner: Send + Sync {
    fn payload(&self) -> &(dyn Any + Send + Sync);
    fn size(&self) -> usize;
    fn recycle(self: Box<Self>);
    fn as_any(&self) -> &(dyn Any + Send + Sync);
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

struct Typed<T: Send + Sync + 'static>(BoxedResource<T>);

impl<T: Send + Sync + 'static> ErasedInner for Typed<T> {
    fn payload(&self) -> &(dyn Any + Send + Sync) {
        self.0.get()
    }

    fn size(&self) -> usize {
        self.0.size()
    }

    fn recycle(self: Box<Self>) {
        self.0.recycle();
    }

    fn as_any(&self) -> &(dyn Any + Send + Sync) {
        &self.0
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        Box::new(self.0)
    }
}

/// A resource whose payload type is only known at runtime.
///
/// The pipeline moves resources between stages as `ErasedResource`s; callers
/// recover the payload with [`ErasedResource::downcast_ref`] or take the typed
/// resource back with [`ErasedResource::into_typed`].
pub struct ErasedResource {
    inner: Box<dyn ErasedInner>,
    type_id: TypeId,
    type_name: &'static str,
}

impl ErasedResource {
    /// Erases the payload type of `resource`.
    pub fn new<T: Send + Sync + 'static>(resource: BoxedResource<T>) -> Self {
        Self {
            inner: Box::new(Typed(resource)),
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` of the payload.
    pub fn payload_type_id(&self) -> TypeId {
        self.type_id
    }

    /// The type name of the payload.
    pub fn payload_type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns `true` if the payload is a `T`.
    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Borrows the payload as a `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.inner.payload().downcast_ref::<T>()
    }

    /// Borrows the typed resource.
    pub fn as_resource<T: Send + Sync + 'static>(&self) -> Option<&dyn Resource<T>> {
        self.inner
            .as_any()
            .downcast_ref::<BoxedResource<T>>()
            .map(|boxed| boxed.as_ref())
    }

    /// Estimated byte footprint.
    pub fn size(&self) -> usize {
        self.inner.size()
    }

    /// Recycles the underlying resource.
    pub fn recycle(self) {
        self.inner.recycle();
    }

    /// Recovers the typed resource, or returns `self` if the payload is not a `T`.
    pub fn into_typed<T: Send + Sync + 'static>(self) -> Result<BoxedResource<T>, Self> {
        if !self.is::<T>() {
            return Err(self);
        }
        let (type_id, type_name) = (self.type_id, self.type_name);
        match self.inner.into_any().downcast::<BoxedResource<T>>() {
            Ok(typed) => Ok(*typed),
            Err(_) => unreachable!(
                "payload type id {type_id:?} ({type_name}) matched but downcast failed"
            ),
        }
    }
}

impl fmt::Debug for ErasedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErasedResource")
            .field("type", &self.type_name)
            .field("size", &self.size())
            .finish()
    }
}
