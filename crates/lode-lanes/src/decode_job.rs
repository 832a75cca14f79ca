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

//! The stage machine that produces one resource.
//!
//! ```text
//! Initialize -> ResourceCache -> DataCache -> Source -> (notify) -> Encode -> Finished
//! ```
//!
//! Cache stages run on the disk-cache executor. When the job reaches the
//! source stage there it reschedules itself onto the source executor (or the
//! animation or unlimited one). Cancellation is checked between stages and
//! between fetch attempts; a running fetch is asked to cancel as well.

use crate::erased::{ErasedFetcher, ErasedLoadData};
use crate::executor::ExecutorSet;
use crate::metrics::{bump, PipelineMetrics};
use crate::path::LoadPath;
use crate::registry::Registry;
use crate::transform::TransformationSet;
use crate::types::{Bytes, ResourceType, TypeInfo};
use lode_core::cache::{DiskCache, DiskCacheStrategy};
use lode_core::error::LoadError;
use lode_core::executor::Executor;
use lode_core::key::{
    CacheKey, DataCacheKey, Dimensions, DiskKey, Key, Options, ResourceCacheKey, Signature,
};
use lode_core::model::ModelRef;
use lode_core::pipeline::{DataSource, EncodeStrategy, Priority};
use lode_core::resource::ErasedResource;
use lode_telemetry::ScopedMetricTimer;
use std::any::Any;
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Everything a decode job needs to know about the load.
#[derive(Debug, Clone)]
pub struct DecodeSpec {
    /// The key of the artifact.
    pub key: Key,
    /// What to load.
    pub model: ModelRef,
    /// Caller signature, part of every disk-cache key.
    pub signature: Signature,
    /// Decode options.
    pub options: Options,
    /// Transformations to apply after decoding.
    pub transformations: TransformationSet,
    /// The decoded resource type.
    pub resource_type: ResourceType,
    /// The type delivered to callers.
    pub transcode_type: TypeInfo,
    /// Disk-cache policy.
    pub strategy: DiskCacheStrategy,
    /// Passed to fetchers.
    pub priority: Priority,
    /// Fail instead of fetching from the source when the caches miss.
    pub only_retrieve_from_cache: bool,
    /// Run the source stage on the animation executor.
    pub use_animation_pool: bool,
    /// Run the source stage on the unlimited executor.
    pub use_unlimited_source_pool: bool,
}

impl DecodeSpec {
    fn dimensions(&self) -> Dimensions {
        self.key.dimensions()
    }

    fn resource_cache_key(&self, source_id: &str, resource_type: &'static str) -> DiskKey {
        ResourceCacheKey {
            source_id: source_id.to_string(),
            signature: self.signature.clone(),
            dimensions: self.dimensions(),
            stages: self.key.stages().to_vec(),
            resource_type,
            options: self.options.clone(),
        }
        .digest()
    }

    fn data_cache_key(&self, source_id: &str) -> DiskKey {
        DataCacheKey {
            source_id: source_id.to_string(),
            signature: self.signature.clone(),
        }
        .digest()
    }

    fn no_pipeline(&self, data: TypeInfo) -> LoadError {
        LoadError::NoPipeline {
            data: data.name(),
            resource: self.resource_type.name(),
            transcode: self.transcode_type.name(),
        }
    }
}

/// Shared services of every decode job of one engine.
pub struct DecodeContext {
    /// The frozen registry.
    pub registry: Arc<Registry>,
    /// Where encoded data and resources are persisted.
    pub disk_cache: Arc<dyn DiskCache>,
    /// Where stages run.
    pub executors: ExecutorSet,
    /// Optional pipeline metrics.
    pub metrics: Option<PipelineMetrics>,
}

impl fmt::Debug for DecodeContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeContext")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// A produced resource and where its data came from.
#[derive(Debug)]
pub struct Decoded {
    /// The transcoded resource.
    pub resource: ErasedResource,
    /// Where the data came from.
    pub source: DataSource,
}

/// How a decode job ended.
#[derive(Debug)]
pub enum DecodeOutcome {
    /// A resource was produced.
    Ready(Decoded),
    /// Every attempt failed.
    Failed(LoadError),
    /// The job was cancelled before it produced anything.
    Cancelled,
}

/// Receives the outcome of a decode job, exactly once.
pub type DecodeCallback = Box<dyn FnOnce(DecodeOutcome) + Send + 'static>;

#[derive(Default)]
struct CancelState {
    cancelled: AtomicBool,
    fetcher: Mutex<Option<Arc<dyn ErasedFetcher>>>,
}

/// Shared cancellation flag of one decode job.
#[derive(Clone, Default)]
pub struct CancelToken {
    inner: Arc<CancelState>,
}

impl CancelToken {
    /// A token that is not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the job and the fetch it is running, if any. Idempotent.
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        let running = crate::lock(&self.inner.fetcher).clone();
        if let Some(fetcher) = running {
            fetcher.cancel();
        }
    }

    /// Whether [`CancelToken::cancel`] was called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    fn attach(&self, fetcher: &Arc<dyn ErasedFetcher>) {
        *crate::lock(&self.inner.fetcher) = Some(fetcher.clone());
        if self.is_cancelled() {
            fetcher.cancel();
        }
    }

    fn detach(&self) {
        crate::lock(&self.inner.fetcher).take();
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The stages of a decode job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Resolving the model loaders.
    Initialize,
    /// Looking up the transformed resource in the disk cache.
    ResourceCache,
    /// Looking up the source data in the disk cache.
    DataCache,
    /// Fetching from the source.
    Source,
    /// Writing the transformed resource to the disk cache.
    Encode,
    /// Done.
    Finished,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunningOn {
    DiskCache,
    Source,
}

struct DeferredEncode {
    key: DiskKey,
    bytes: Vec<u8>,
}

enum SourceAttempt {
    Decoded(Decoded),
    Exhausted,
    Cancelled,
}

/// One run of the pipeline for one key.
pub struct DecodeJob {
    spec: Arc<DecodeSpec>,
    context: Arc<DecodeContext>,
    cancel: CancelToken,
    stage: Stage,
    running_on: RunningOn,
    load_data: Vec<ErasedLoadData>,
    errors: Vec<LoadError>,
    deferred: Option<DeferredEncode>,
    on_complete: Option<DecodeCallback>,
}

impl DecodeJob {
    /// Prepares a job; nothing runs until [`DecodeJob::start`].
    pub fn new(
        spec: Arc<DecodeSpec>,
        context: Arc<DecodeContext>,
        cancel: CancelToken,
        on_complete: DecodeCallback,
    ) -> Self {
        Self {
            spec,
            context,
            cancel,
            stage: Stage::Initialize,
            running_on: RunningOn::DiskCache,
            load_data: Vec::new(),
            errors: Vec::new(),
            deferred: None,
            on_complete: Some(on_complete),
        }
    }

    /// Whether the first stage after initialization reads the disk cache.
    pub fn will_decode_from_cache(&self) -> bool {
        matches!(
            self.next_stage(Stage::Initialize),
            Stage::ResourceCache | Stage::DataCache
        )
    }

    /// Submits the job to the disk-cache executor when it starts with a cache
    /// lookup, otherwise to the source executor.
    pub fn start(mut self) {
        let executor = if self.will_decode_from_cache() {
            self.running_on = RunningOn::DiskCache;
            self.context.executors.disk_cache.clone()
        } else {
            self.running_on = RunningOn::Source;
            self.source_executor()
        };
        log::trace!("DecodeJob {}: starting on {}", self.spec.key, executor.name());
        executor.execute(Box::new(move || self.run()));
    }

    fn source_executor(&self) -> Arc<dyn Executor> {
        self.context
            .executors
            .active_source(
                self.spec.use_unlimited_source_pool,
                self.spec.use_animation_pool,
            )
            .clone()
    }

    fn next_stage(&self, current: Stage) -> Stage {
        match current {
            Stage::Initialize => {
                if self.spec.strategy.decode_cached_resource() {
                    Stage::ResourceCache
                } else {
                    self.next_stage(Stage::ResourceCache)
                }
            }
            Stage::ResourceCache => {
                if self.spec.strategy.decode_cached_data() {
                    Stage::DataCache
                } else {
                    self.next_stage(Stage::DataCache)
                }
            }
            Stage::DataCache => {
                if self.spec.only_retrieve_from_cache {
                    Stage::Finished
                } else {
                    Stage::Source
                }
            }
            Stage::Source | Stage::Encode | Stage::Finished => Stage::Finished,
        }
    }

    /// Runs stages until the job completes or moves to another executor.
    pub fn run(mut self) {
        loop {
            if self.cancel.is_cancelled() {
                log::debug!("DecodeJob {}: cancelled at {:?}", self.spec.key, self.stage);
                self.notify(DecodeOutcome::Cancelled);
                return;
            }
            let stage = self.stage;
            match stage {
                Stage::Initialize => {
                    let built = self.context.registry.build_load_data(
                        &self.spec.model,
                        self.spec.dimensions(),
                        &self.spec.options,
                    );
                    match built {
                        Ok(load_data) => self.load_data = load_data,
                        Err(error) => {
                            self.notify(DecodeOutcome::Failed(error));
                            return;
                        }
                    }
                    self.stage = self.next_stage(stage);
                }
                Stage::ResourceCache => match self.decode_from_resource_cache() {
                    Some(decoded) => self.complete(decoded),
                    None => self.stage = self.next_stage(stage),
                },
                Stage::DataCache => match self.decode_from_data_cache() {
                    Some(decoded) => self.complete(decoded),
                    None => self.stage = self.next_stage(stage),
                },
                Stage::Source => {
                    let target = self.source_executor();
                    if self.running_on == RunningOn::DiskCache
                        && !Arc::ptr_eq(&self.context.executors.disk_cache, &target)
                    {
                        log::trace!(
                            "DecodeJob {}: rescheduling onto {}",
                            self.spec.key,
                            target.name()
                        );
                        self.running_on = RunningOn::Source;
                        target.execute(Box::new(move || self.run()));
                        return;
                    }
                    match self.decode_from_source() {
                        SourceAttempt::Decoded(decoded) => self.complete(decoded),
                        SourceAttempt::Exhausted => self.stage = self.next_stage(stage),
                        SourceAttempt::Cancelled => {
                            self.notify(DecodeOutcome::Cancelled);
                            return;
                        }
                    }
                }
                Stage::Encode => {
                    self.write_deferred();
                    self.stage = Stage::Finished;
                    return;
                }
                Stage::Finished => {
                    self.fail();
                    return;
                }
            }
        }
    }

    fn complete(&mut self, decoded: Decoded) {
        log::debug!(
            "DecodeJob {}: produced from {:?}",
            self.spec.key,
            decoded.source
        );
        self.notify(DecodeOutcome::Ready(decoded));
        self.stage = Stage::Encode;
    }

    fn fail(&mut self) {
        let mut causes = std::mem::take(&mut self.errors);
        if self.spec.only_retrieve_from_cache {
            causes.push(LoadError::CacheOnlyMiss);
        }
        if causes.is_empty() {
            causes.push(LoadError::NoModelLoader {
                model: self.spec.model.identity().to_string(),
                model_type: self.spec.model.type_name(),
            });
        }
        let error = LoadError::aggregate("failed to load resource", causes);
        log::debug!("DecodeJob {}: failed: {error}", self.spec.key);
        self.notify(DecodeOutcome::Failed(error));
    }

    fn notify(&mut self, outcome: DecodeOutcome) {
        if let Some(on_complete) = self.on_complete.take() {
            on_complete(outcome);
        } else if let DecodeOutcome::Ready(decoded) = outcome {
            decoded.resource.recycle();
        }
    }

    /// Source ids to look up in the disk cache, each flagged with whether it
    /// is an alternate id.
    fn cache_ids(&self) -> Vec<(String, bool)> {
        let mut ids: Vec<(String, bool)> = Vec::new();
        for load_data in &self.load_data {
            let candidates = std::iter::once((&load_data.source_id, false))
                .chain(load_data.alternate_ids.iter().map(|id| (id, true)));
            for (id, alternate) in candidates {
                if !ids.iter().any(|(known, _)| known == id) {
                    ids.push((id.clone(), alternate));
                }
            }
        }
        ids
    }

    fn decode_from_resource_cache(&mut self) -> Option<Decoded> {
        let registry = self.context.registry.clone();
        let model_type =
            TypeInfo::from_parts(self.spec.model.type_id(), self.spec.model.type_name());
        let resource_types = registry.registered_resource_types(
            model_type,
            self.spec.resource_type,
            self.spec.transcode_type,
        );
        for (source_id, _) in self.cache_ids() {
            for resource_type in &resource_types {
                let key = self.spec.resource_cache_key(&source_id, resource_type.name());
                let Some(bytes) = self.context.disk_cache.get(&key) else {
                    continue;
                };
                let Some(path) = registry.load_path(
                    TypeInfo::of::<Bytes>(),
                    ResourceType::Exact(*resource_type),
                    self.spec.transcode_type,
                ) else {
                    continue;
                };
                match self.decode_with(
                    &path,
                    &bytes,
                    DataSource::ResourceDiskCache,
                    false,
                    &source_id,
                ) {
                    Ok(resource) => {
                        bump(self.context.metrics.as_ref().map(|m| &m.resource_cache_hits));
                        return Some(Decoded {
                            resource,
                            source: DataSource::ResourceDiskCache,
                        });
                    }
                    Err(error) => self.errors.push(error),
                }
            }
        }
        None
    }

    fn decode_from_data_cache(&mut self) -> Option<Decoded> {
        let registry = self.context.registry.clone();
        for (source_id, alternate) in self.cache_ids() {
            let Some(bytes) = self.context.disk_cache.get(&self.spec.data_cache_key(&source_id))
            else {
                continue;
            };
            let bytes_type = TypeInfo::of::<Bytes>();
            let Some(path) = registry.load_path(
                bytes_type,
                self.spec.resource_type,
                self.spec.transcode_type,
            ) else {
                self.errors.push(self.spec.no_pipeline(bytes_type));
                continue;
            };
            match self.decode_with(&path, &bytes, DataSource::DataDiskCache, alternate, &source_id)
            {
                Ok(resource) => {
                    bump(self.context.metrics.as_ref().map(|m| &m.data_cache_hits));
                    return Some(Decoded {
                        resource,
                        source: DataSource::DataDiskCache,
                    });
                }
                Err(error) => self.errors.push(error),
            }
        }
        None
    }

    fn decode_from_source(&mut self) -> SourceAttempt {
        let registry = self.context.registry.clone();
        for load_data in self.load_data.clone() {
            if self.cancel.is_cancelled() {
                return SourceAttempt::Cancelled;
            }
            let data_type = load_data.data_type();
            let Some(path) = registry.load_path(
                data_type,
                self.spec.resource_type,
                self.spec.transcode_type,
            ) else {
                self.errors.push(self.spec.no_pipeline(data_type));
                continue;
            };

            let fetcher = load_data.fetcher.clone();
            self.cancel.attach(&fetcher);
            let fetched = fetcher.load_data(self.spec.priority);
            self.cancel.detach();
            bump(self.context.metrics.as_ref().map(|m| &m.source_fetches));

            let data = match fetched {
                Ok(data) => data,
                Err(cause) => {
                    fetcher.cleanup();
                    log::debug!("DecodeJob {}: fetch of '{}' failed: {cause}", self.spec.key, load_data.source_id);
                    self.errors.push(LoadError::Fetch {
                        source_id: load_data.source_id.clone(),
                        cause,
                    });
                    continue;
                }
            };
            if self.cancel.is_cancelled() {
                fetcher.cleanup();
                return SourceAttempt::Cancelled;
            }

            let source = fetcher.data_source();
            if self.spec.strategy.is_data_cacheable(source) {
                self.cache_source_data(&load_data, data.as_ref());
            }
            let result = self.decode_with(&path, data.as_ref(), source, false, &load_data.source_id);
            drop(data);
            fetcher.cleanup();
            match result {
                Ok(resource) => return SourceAttempt::Decoded(Decoded { resource, source }),
                Err(error) => self.errors.push(error),
            }
        }
        SourceAttempt::Exhausted
    }

    fn cache_source_data(&self, load_data: &ErasedLoadData, data: &(dyn Any + Send)) {
        let Some(encoder) = self.context.registry.source_encoder(load_data.data_type()) else {
            log::trace!(
                "DecodeJob {}: no encoder for {:?}, source data not cached",
                self.spec.key,
                load_data.data_type()
            );
            return;
        };
        let options = &self.spec.options;
        let writer = |sink: &mut dyn Write| encoder.encode(data, sink, options);
        self.context
            .disk_cache
            .put(&self.spec.data_cache_key(&load_data.source_id), &writer);
        bump(self.context.metrics.as_ref().map(|m| &m.disk_writes));
    }

    /// Decodes with `path`; transformations and the encode decision happen
    /// between decoding and transcoding.
    fn decode_with(
        &mut self,
        path: &LoadPath,
        data: &(dyn Any + Send),
        source: DataSource,
        from_alternate: bool,
        source_id: &str,
    ) -> Result<ErasedResource, LoadError> {
        let context = self.context.clone();
        let spec = self.spec.clone();
        let _timer = ScopedMetricTimer::maybe(context.metrics.as_ref().map(|m| &m.decode_time));
        let mut deferred = None;
        let mut on_decoded = |decoded: ErasedResource| -> Result<ErasedResource, LoadError> {
            let transformed = if source == DataSource::ResourceDiskCache {
                decoded
            } else {
                spec.transformations.apply(decoded, spec.dimensions())?
            };
            deferred = prepare_encode(
                &context.registry,
                &spec,
                &transformed,
                source,
                from_alternate,
                source_id,
            );
            Ok(transformed)
        };
        let result = path.load(data, spec.dimensions(), &spec.options, &mut on_decoded);
        if result.is_ok() {
            self.deferred = deferred;
        }
        result
    }

    fn write_deferred(&mut self) {
        let Some(DeferredEncode { key, bytes }) = self.deferred.take() else {
            return;
        };
        let writer = |sink: &mut dyn Write| sink.write_all(&bytes).is_ok();
        self.context.disk_cache.put(&key, &writer);
        bump(self.context.metrics.as_ref().map(|m| &m.disk_writes));
        log::trace!("DecodeJob {}: wrote {} byte(s) to the disk cache", self.spec.key, bytes.len());
    }
}

/// Encodes `resource` up front when the strategy wants it in the disk cache;
/// the bytes are written after callers were notified.
fn prepare_encode(
    registry: &Registry,
    spec: &DecodeSpec,
    resource: &ErasedResource,
    source: DataSource,
    from_alternate: bool,
    source_id: &str,
) -> Option<DeferredEncode> {
    let resource_type = TypeInfo::from_parts(resource.payload_type_id(), resource.payload_type_name());
    let encoder = registry.resource_encoder(resource_type)?;
    let encode_strategy = encoder.encode_strategy(&spec.options);
    if !spec
        .strategy
        .is_resource_cacheable(from_alternate, source, encode_strategy)
    {
        return None;
    }
    let key = match encode_strategy {
        EncodeStrategy::Transformed => spec.resource_cache_key(source_id, resource_type.name()),
        EncodeStrategy::Source => spec.data_cache_key(source_id),
        EncodeStrategy::None => return None,
    };
    let mut bytes = Vec::new();
    if !encoder.encode(resource, &mut bytes, &spec.options) {
        log::debug!("DecodeJob {}: resource encoder wrote nothing", spec.key);
        return None;
    }
    Some(DeferredEncode { key, bytes })
}

// Still holding `on_complete` here means a component panicked or a stopped
// executor discarded the job.
impl Drop for DecodeJob {
    fn drop(&mut self) {
        let Some(on_complete) = self.on_complete.take() else {
            return;
        };
        if std::thread::panicking() {
            log::error!("DecodeJob {}: panicked during {:?}", self.spec.key, self.stage);
            on_complete(DecodeOutcome::Failed(LoadError::Panicked {
                stage: format!("{:?}", self.stage),
            }));
        } else {
            log::debug!("DecodeJob {}: dropped before running", self.spec.key);
            on_complete(DecodeOutcome::Cancelled);
        }
    }
}

impl fmt::Debug for DecodeJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeJob")
            .field("key", &self.spec.key)
            .field("stage", &self.stage)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}
