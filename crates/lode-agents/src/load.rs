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

//! Everything one call to [`crate::Engine::load`] asks for.

use lode_core::cache::DiskCacheStrategy;
use lode_core::key::{Dimensions, Key, Options, Signature};
use lode_core::model::{Model, ModelRef};
use lode_core::pipeline::{Priority, Transformation};
use lode_lanes::{DecodeSpec, ResourceType, TransformationSet, TypeInfo};

/// The parameters of one load.
///
/// Two loads with equal [`LoadSpec::key`]s share one job and one resource.
#[derive(Debug, Clone)]
pub struct LoadSpec {
    /// What to load.
    pub model: ModelRef,
    /// Requested size, or [`Dimensions::ORIGINAL`].
    pub dimensions: Dimensions,
    /// Caller-supplied cache signature.
    pub signature: Signature,
    /// Transformations, in application order.
    pub transformations: TransformationSet,
    /// The decoded resource type.
    pub resource_type: ResourceType,
    /// The delivered type.
    pub transcode_type: TypeInfo,
    /// Decode options.
    pub options: Options,
    /// Disk-cache policy.
    pub strategy: DiskCacheStrategy,
    /// Whether the result may be served from and kept in memory.
    pub memory_cacheable: bool,
    /// Passed to fetchers.
    pub priority: Priority,
    /// Run the source stage on the animation executor.
    pub use_animation_pool: bool,
    /// Run the source stage on the unlimited executor.
    pub use_unlimited_source_pool: bool,
    /// Fail instead of fetching when the caches miss.
    pub only_retrieve_from_cache: bool,
}

impl LoadSpec {
    /// Loads `model` at its original size as a `Z`, decoding into whatever
    /// resource type can be transcoded to `Z`.
    pub fn new<Z: 'static>(model: impl Model) -> Self {
        Self::for_model::<Z>(ModelRef::new(model))
    }

    /// Like [`LoadSpec::new`] for an already wrapped model.
    pub fn for_model<Z: 'static>(model: ModelRef) -> Self {
        Self {
            model,
            dimensions: Dimensions::ORIGINAL,
            signature: Signature::default(),
            transformations: TransformationSet::new(),
            resource_type: ResourceType::Any,
            transcode_type: TypeInfo::of::<Z>(),
            options: Options::new(),
            strategy: DiskCacheStrategy::default(),
            memory_cacheable: true,
            priority: Priority::Normal,
            use_animation_pool: false,
            use_unlimited_source_pool: false,
            only_retrieve_from_cache: false,
        }
    }

    /// Sets the requested size.
    pub fn with_dimensions(mut self, dimensions: Dimensions) -> Self {
        self.dimensions = dimensions;
        self
    }

    /// Decodes into exactly `R`.
    pub fn decode_as<R: 'static>(mut self) -> Self {
        self.resource_type = ResourceType::of::<R>();
        self
    }

    /// Appends a transformation for resources of type `R`.
    pub fn transform<R, T>(mut self, transformation: T) -> Self
    where
        R: Send + Sync + 'static,
        T: Transformation<R> + 'static,
    {
        self.transformations.push::<R, T>(transformation);
        self
    }

    /// Replaces the transformations.
    pub fn with_transformations(mut self, transformations: TransformationSet) -> Self {
        self.transformations = transformations;
        self
    }

    /// Sets the signature.
    pub fn with_signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// Sets the decode options.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Sets the disk-cache strategy.
    pub fn with_strategy(mut self, strategy: DiskCacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets memory cacheability.
    pub fn memory_cacheable(mut self, memory_cacheable: bool) -> Self {
        self.memory_cacheable = memory_cacheable;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Runs the source stage on the animation executor.
    pub fn use_animation_pool(mut self, enabled: bool) -> Self {
        self.use_animation_pool = enabled;
        self
    }

    /// Runs the source stage on the unlimited executor.
    pub fn use_unlimited_source_pool(mut self, enabled: bool) -> Self {
        self.use_unlimited_source_pool = enabled;
        self
    }

    /// Only reads the caches.
    pub fn only_retrieve_from_cache(mut self, enabled: bool) -> Self {
        self.only_retrieve_from_cache = enabled;
        self
    }

    /// The key identifying the produced artifact.
    pub fn key(&self) -> Key {
        Key::new(&self.model, self.dimensions)
            .with_stages(self.transformations.ids())
            .with_signature(self.signature.clone())
            .with_types(self.resource_type.name(), self.transcode_type.name())
            .with_options(self.options.clone())
    }

    pub(crate) fn into_decode_spec(self, key: Key) -> DecodeSpec {
        DecodeSpec {
            key,
            model: self.model,
            signature: self.signature,
            options: self.options,
            transformations: self.transformations,
            resource_type: self.resource_type,
            transcode_type: self.transcode_type,
            strategy: self.strategy,
            priority: self.priority,
            only_retrieve_from_cache: self.only_retrieve_from_cache,
            use_animation_pool: self.use_animation_pool,
            use_unlimited_source_pool: self.use_unlimited_source_pool,
        }
    }
}
