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

//! Models: the things callers ask the engine to load.

use std::any::{Any, TypeId};
use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A marker trait for types that can be handed to the engine as a load source.
///
/// The identity must be stable: two models with the same identity and type are
/// considered the same source for caching and deduplication.
///
/// # Examples
///
/// ```
/// use lode_core::model::Model;
/// use std::borrow::Cow;
///
/// struct AssetPath(String);
///
/// impl Model for AssetPath {
///     fn identity(&self) -> Cow<'_, str> {
///         Cow::Borrowed(&self.0)
///     }
/// }
/// ```
pub trait Model: Send + Sync + 'static {
    /// Returns the stable identity of this model.
    fn identity(&self) -> Cow<'_, str>;
}

impl Model for String {
    fn identity(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl Model for &'static str {
    fn identity(&self) -> Cow<'_, str> {
        Cow::Borrowed(self)
    }
}

impl Model for PathBuf {
    fn identity(&self) -> Cow<'_, str> {
        self.to_string_lossy()
    }
}

impl Model for Vec<u8> {
    fn identity(&self) -> Cow<'_, str> {
        Cow::Owned(blake3::hash(self).to_hex().to_string())
    }
}

/// A cheap, clonable, type-erased handle to a model.
///
/// The engine passes `ModelRef`s around without knowing the concrete model
/// type; model loaders recover it with [`ModelRef::downcast_ref`].
#[derive(Clone)]
pub struct ModelRef {
    identity: Arc<str>,
    type_id: TypeId,
    type_name: &'static str,
    value: Arc<dyn Any + Send + Sync>,
}

impl ModelRef {
    /// Wraps a model.
    pub fn new<M: Model>(model: M) -> Self {
        let identity: Arc<str> = Arc::from(model.identity().as_ref());
        Self {
            identity,
            type_id: TypeId::of::<M>(),
            type_name: std::any::type_name::<M>(),
            value: Arc::new(model),
        }
    }

    /// The stable identity of the wrapped model.
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The `TypeId` of the wrapped model.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// The type name of the wrapped model.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the wrapped model if it is of type `M`.
    pub fn downcast_ref<M: Model>(&self) -> Option<&M> {
        self.value.downcast_ref::<M>()
    }
}

impl PartialEq for ModelRef {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id && self.identity == other.identity
    }
}

impl Eq for ModelRef {}

impl fmt::Debug for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRef")
            .field("identity", &self.identity)
            .field("type", &self.type_name)
            .finish()
    }
}
