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

//! Runtime type descriptors used to key the registry.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Raw data moved between a fetcher and the decoders, with its type erased.
pub type ErasedData = Box<dyn Any + Send>;

/// The data type produced by disk-cache reads.
pub type Bytes = Vec<u8>;

/// A `TypeId` paired with the type's name, for lookups and diagnostics.
#[derive(Clone, Copy)]
pub struct TypeInfo {
    id: TypeId,
    name: &'static str,
}

impl TypeInfo {
    /// Describes `T`.
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub(crate) fn from_parts(id: TypeId, name: &'static str) -> Self {
        Self { id, name }
    }

    /// The `TypeId`.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// The full type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether this describes `T`.
    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }
}

impl PartialEq for TypeInfo {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TypeInfo {}

impl Hash for TypeInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// The resource type a load asks for.
///
/// `Any` lets the registry pick every decodable resource type that can be
/// transcoded into the requested output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Whatever the decoders produce.
    Any,
    /// Exactly this type.
    Exact(TypeInfo),
}

impl ResourceType {
    /// Asks for exactly `R`.
    pub fn of<R: 'static>() -> Self {
        ResourceType::Exact(TypeInfo::of::<R>())
    }

    /// Whether a decoder producing `candidate` satisfies this request.
    pub fn accepts(&self, candidate: TypeInfo) -> bool {
        match self {
            ResourceType::Any => true,
            ResourceType::Exact(wanted) => *wanted == candidate,
        }
    }

    /// The name mixed into keys, `*` for `Any`.
    pub fn name(&self) -> &'static str {
        match self {
            ResourceType::Any => "*",
            ResourceType::Exact(info) => info.name(),
        }
    }

    pub(crate) fn memo_id(&self) -> Option<TypeId> {
        match self {
            ResourceType::Any => None,
            ResourceType::Exact(info) => Some(info.id()),
        }
    }
}
