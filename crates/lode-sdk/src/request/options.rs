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

//! Per-request settings.

use lode_agents::LoadSpec;
use lode_core::cache::DiskCacheStrategy;
use lode_core::key::{Dimensions, Options, Signature};
use lode_core::model::ModelRef;
use lode_core::pipeline::{Priority, Transformation};
use lode_lanes::{ResourceType, TransformationSet};
use std::fmt;
use std::rc::Rc;

/// What a request shows and how it loads.
pub struct RequestOptions<Z> {
    placeholder: Option<Rc<Z>>,
    error: Option<Rc<Z>>,
    fallback: Option<Rc<Z>>,
    override_size: Option<Dimensions>,
    size_multiplier: f32,
    signature: Signature,
    options: Options,
    transformations: TransformationSet,
    resource_type: ResourceType,
    strategy: DiskCacheStrategy,
    skip_memory_cache: bool,
    priority: Priority,
    only_retrieve_from_cache: bool,
    use_animation_pool: bool,
    use_unlimited_source_pool: bool,
}

impl<Z> Default for RequestOptions<Z> {
    fn default() -> Self {
        Self {
            placeholder: None,
            error: None,
            fallback: None,
            override_size: None,
            size_multiplier: 1.0,
            signature: Signature::default(),
            options: Options::new(),
            transformations: TransformationSet::new(),
            resource_type: ResourceType::Any,
            strategy: DiskCacheStrategy::default(),
            skip_memory_cache: false,
            priority: Priority::Normal,
            only_retrieve_from_cache: false,
            use_animation_pool: false,
            use_unlimited_source_pool: false,
        }
    }
}

impl<Z> Clone for RequestOptions<Z> {
    fn clone(&self) -> Self {
        Self {
            placeholder: self.placeholder.clone(),
            error: self.error.clone(),
            fallback: self.fallback.clone(),
            override_size: self.override_size,
            size_multiplier: self.size_multiplier,
            signature: self.signature.clone(),
            options: self.options.clone(),
            transformations: self.transformations.clone(),
            resource_type: self.resource_type.clone(),
            strategy: self.strategy,
            skip_memory_cache: self.skip_memory_cache,
            priority: self.priority,
            only_retrieve_from_cache: self.only_retrieve_from_cache,
            use_animation_pool: self.use_animation_pool,
            use_unlimited_source_pool: self.use_unlimited_source_pool,
        }
    }
}

impl<Z: 'static> RequestOptions<Z> {
    /// Default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Shown while loading.
    pub fn placeholder(mut self, placeholder: Z) -> Self {
        self.placeholder = Some(Rc::new(placeholder));
        self
    }

    /// Shown when the load fails.
    pub fn error(mut self, error: Z) -> Self {
        self.error = Some(Rc::new(error));
        self
    }

    /// Shown when the load fails and no error placeholder is set.
    pub fn fallback(mut self, fallback: Z) -> Self {
        self.fallback = Some(Rc::new(fallback));
        self
    }

    /// Loads at `dimensions` instead of asking the target.
    pub fn override_size(mut self, dimensions: Dimensions) -> Self {
        self.override_size = Some(dimensions);
        self
    }

    /// Scales the target size before loading.
    pub fn size_multiplier(mut self, multiplier: f32) -> Self {
        self.size_multiplier = multiplier.clamp(0.0, 1.0);
        self
    }

    /// Sets the cache signature.
    pub fn signature(mut self, signature: Signature) -> Self {
        self.signature = signature;
        self
    }

    /// Sets the decode options.
    pub fn options(mut self, options: Options) -> Self {
        self.options = options;
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

    /// Decodes into exactly `R` before transcoding to `Z`.
    pub fn decode_as<R: 'static>(mut self) -> Self {
        self.resource_type = ResourceType::of::<R>();
        self
    }

    /// Sets the disk-cache strategy.
    pub fn strategy(mut self, strategy: DiskCacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Bypasses the active set and the memory cache.
    pub fn skip_memory_cache(mut self, skip: bool) -> Self {
        self.skip_memory_cache = skip;
        self
    }

    /// Sets the fetch priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Fails instead of fetching on a cache miss.
    pub fn only_retrieve_from_cache(mut self, enabled: bool) -> Self {
        self.only_retrieve_from_cache = enabled;
        self
    }

    /// Decodes on the animation executor.
    pub fn use_animation_pool(mut self, enabled: bool) -> Self {
        self.use_animation_pool = enabled;
        self
    }

    /// Decodes on the unlimited source executor.
    pub fn use_unlimited_source_pool(mut self, enabled: bool) -> Self {
        self.use_unlimited_source_pool = enabled;
        self
    }

    /// The configured disk-cache strategy.
    pub fn disk_cache_strategy(&self) -> DiskCacheStrategy {
        self.strategy
    }

    pub(crate) fn size_override(&self) -> Option<Dimensions> {
        self.override_size
    }

    pub(crate) fn loading_placeholder(&self) -> Option<Rc<Z>> {
        self.placeholder.clone()
    }

    pub(crate) fn failure_placeholder(&self) -> Option<Rc<Z>> {
        self.error
            .clone()
            .or_else(|| self.fallback.clone())
            .or_else(|| self.placeholder.clone())
    }

    pub(crate) fn load_spec(&self, model: &ModelRef, size: Dimensions) -> LoadSpec {
        let mut spec = LoadSpec::for_model::<Z>(model.clone())
            .with_dimensions(size.scaled(self.size_multiplier))
            .with_signature(self.signature.clone())
            .with_options(self.options.clone())
            .with_transformations(self.transformations.clone())
            .with_strategy(self.strategy)
            .memory_cacheable(!self.skip_memory_cache)
            .with_priority(self.priority)
            .only_retrieve_from_cache(self.only_retrieve_from_cache)
            .use_animation_pool(self.use_animation_pool)
            .use_unlimited_source_pool(self.use_unlimited_source_pool);
        spec.resource_type = self.resource_type.clone();
        spec
    }
}

impl<Z> fmt::Debug for RequestOptions<Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("override_size", &self.override_size)
            .field("size_multiplier", &self.size_multiplier)
            .field("transformations", &self.transformations)
            .field("strategy", &self.strategy)
            .field("skip_memory_cache", &self.skip_memory_cache)
            .field("only_retrieve_from_cache", &self.only_retrieve_from_cache)
            .finish_non_exhaustive()
    }
}
