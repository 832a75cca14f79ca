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

//! The engine context: one engine with its caches, pools and registry.

use crate::config::EngineConfig;
use crate::request::{RequestDispatcher, RequestOptions, SingleRequest};
use anyhow::Context;
use lode_agents::{Engine, EngineMetrics, EngineResource, ResourceMemoryCache};
use lode_core::cache::{DiskCache, TrimLevel};
use lode_core::event::EngineEvent;
use lode_core::key::Key;
use lode_core::model::{Model, ModelRef};
use lode_core::target::Target;
use lode_data::{ByteArrayPool, InMemoryDiskCache, LruResourceCache, NoopDiskCache, PixelBufferPool};
use lode_lanes::{DecodeContext, ExecutorSet, PipelineMetrics, Registry, RegistryBuilder};
use lode_telemetry::MetricsRegistry;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

/// How much memory the caches and pools may use relative to their budgets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemoryCategory {
    /// Half the budget.
    Low,
    /// The configured budget.
    #[default]
    Normal,
    /// One and a half times the budget.
    High,
}

impl MemoryCategory {
    /// The factor applied to every budget.
    pub fn multiplier(self) -> f32 {
        match self {
            MemoryCategory::Low => 0.5,
            MemoryCategory::Normal => 1.0,
            MemoryCategory::High => 1.5,
        }
    }
}

/// Configures and creates an [`EngineContext`].
pub struct EngineContextBuilder {
    config: EngineConfig,
    registry: RegistryBuilder,
    disk_cache: Option<Arc<dyn DiskCache>>,
    executors: Option<ExecutorSet>,
    metrics: Option<Arc<MetricsRegistry>>,
    events: Option<flume::Sender<EngineEvent>>,
}

impl EngineContextBuilder {
    /// Starts from `config` and an empty registry.
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: RegistryBuilder::new(),
            disk_cache: None,
            executors: None,
            metrics: None,
            events: None,
        }
    }

    /// Applies every component module linked into the binary.
    pub fn with_linked_modules(mut self) -> Self {
        self.registry = self.registry.with_linked_modules();
        self
    }

    /// Registers components directly.
    pub fn register(mut self, register: impl FnOnce(&mut RegistryBuilder)) -> Self {
        register(&mut self.registry);
        self
    }

    /// Uses `disk_cache` instead of the one described by the config.
    pub fn with_disk_cache(mut self, disk_cache: Arc<dyn DiskCache>) -> Self {
        self.disk_cache = Some(disk_cache);
        self
    }

    /// Uses `executors` instead of thread pools sized by the config.
    pub fn with_executors(mut self, executors: ExecutorSet) -> Self {
        self.executors = Some(executors);
        self
    }

    /// Records engine and pipeline metrics in `metrics`.
    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Publishes engine events to `events`.
    pub fn with_events(mut self, events: flume::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Freezes the registry and creates the caches, pools, executors and
    /// engine.
    pub fn build(self) -> anyhow::Result<EngineContext> {
        let config = self.config;
        config.validate().context("invalid engine configuration")?;
        let budgets = config.memory.budgets();

        let executors = match self.executors {
            Some(executors) => executors,
            None => ExecutorSet::threaded(config.executors).context("failed to start the executors")?,
        };
        let disk_cache: Arc<dyn DiskCache> = match (self.disk_cache, config.disk_cache_size) {
            (Some(disk_cache), _) => disk_cache,
            (None, Some(size)) => Arc::new(InMemoryDiskCache::new(size)),
            (None, None) => Arc::new(NoopDiskCache),
        };
        let (pipeline_metrics, engine_metrics) = match &self.metrics {
            Some(registry) => (
                Some(PipelineMetrics::new(registry).context("failed to register pipeline metrics")?),
                Some(EngineMetrics::new(registry).context("failed to register engine metrics")?),
            ),
            None => (None, None),
        };

        let registry = Arc::new(self.registry.freeze());
        let memory_cache: Arc<ResourceMemoryCache> = Arc::new(
            LruResourceCache::<Key, Arc<EngineResource>>::new(budgets.memory_cache_size, |resource| {
                resource.size()
            }),
        );
        let decode = DecodeContext {
            registry: registry.clone(),
            disk_cache,
            executors,
            metrics: pipeline_metrics,
        };

        let mut engine = Engine::builder(decode, memory_cache);
        if let Some(events) = self.events {
            engine = engine.with_events(events);
        }
        if let Some(metrics) = engine_metrics {
            engine = engine.with_metrics(metrics);
        }
        if let Some(interval) = config.sweep_interval() {
            engine = engine.with_sweep_interval(interval);
        }
        let engine = engine.build().context("failed to start the engine")?;

        let context = EngineContext {
            engine,
            registry,
            pixel_pool: Arc::new(PixelBufferPool::new(budgets.pixel_pool_size)),
            array_pool: Arc::new(ByteArrayPool::new(budgets.array_pool_size)),
            category: Mutex::new(MemoryCategory::Normal),
            config,
        };
        context.apply_multiplier(MemoryCategory::Normal);
        log::info!("EngineContext: ready with budgets {budgets:?}");
        Ok(context)
    }
}

/// An engine plus everything it shares with components: the frozen registry
/// and the buffer pools.
pub struct EngineContext {
    engine: Engine,
    registry: Arc<Registry>,
    pixel_pool: Arc<PixelBufferPool>,
    array_pool: Arc<ByteArrayPool>,
    category: Mutex<MemoryCategory>,
    config: EngineConfig,
}

impl EngineContext {
    /// A builder over `config`.
    pub fn builder(config: EngineConfig) -> EngineContextBuilder {
        EngineContextBuilder::new(config)
    }

    /// The engine.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// The frozen registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The pixel buffer pool.
    pub fn pixel_pool(&self) -> &Arc<PixelBufferPool> {
        &self.pixel_pool
    }

    /// The byte array pool.
    pub fn array_pool(&self) -> &Arc<ByteArrayPool> {
        &self.array_pool
    }

    /// The configuration the context was built from.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A dispatcher owned by the calling thread.
    pub fn dispatcher(&self) -> Rc<RequestDispatcher> {
        RequestDispatcher::new(self.engine.clone())
    }

    /// Request options using the configured default strategy.
    pub fn default_options<Z: 'static>(&self) -> RequestOptions<Z> {
        RequestOptions::new().strategy(self.config.default_strategy)
    }

    /// Creates a request of `model` into `target`. Call
    /// [`SingleRequest::begin`] to start it.
    pub fn request<Z: 'static>(
        &self,
        dispatcher: &Rc<RequestDispatcher>,
        model: impl Model,
        target: Rc<dyn Target<Z>>,
        options: RequestOptions<Z>,
    ) -> SingleRequest<Z> {
        SingleRequest::new(dispatcher, ModelRef::new(model), target, options)
    }

    /// Shrinks the memory cache and pools according to `level`.
    pub fn trim_memory(&self, level: TrimLevel) {
        log::debug!("EngineContext: trimming memory ({level:?})");
        self.engine.trim_memory(level);
        self.pixel_pool.trim_memory(level);
        self.array_pool.trim_memory(level);
    }

    /// Empties the memory cache and pools.
    pub fn clear_memory(&self) {
        log::debug!("EngineContext: clearing memory");
        self.engine.clear_memory();
        self.pixel_pool.clear_memory();
        self.array_pool.clear_memory();
    }

    /// Scales the memory cache and pools; returns the previous category.
    pub fn set_memory_category(&self, category: MemoryCategory) -> MemoryCategory {
        let previous = std::mem::replace(&mut *crate::lock(&self.category), category);
        self.apply_multiplier(category);
        previous
    }

    /// The current memory category.
    pub fn memory_category(&self) -> MemoryCategory {
        *crate::lock(&self.category)
    }

    fn apply_multiplier(&self, category: MemoryCategory) {
        let multiplier = self.config.size_multiplier * category.multiplier();
        self.engine.set_size_multiplier(multiplier);
        self.pixel_pool.set_size_multiplier(multiplier);
        self.array_pool.set_size_multiplier(multiplier);
    }

    /// Cancels every job, stops the executors and empties the caches and
    /// pools.
    pub fn shutdown(&self) {
        self.engine.shutdown();
        self.pixel_pool.clear_memory();
        self.array_pool.clear_memory();
        log::info!("EngineContext: shut down");
    }
}

impl fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineContext")
            .field("engine", &self.engine)
            .field("category", &self.memory_category())
            .finish_non_exhaustive()
    }
}
