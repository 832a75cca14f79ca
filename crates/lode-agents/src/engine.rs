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

//! The engine: load deduplication and cache-tier orchestration.
//!
//! A load is answered from the first tier that has its key:
//!
//! 1. the active set (acquired, delivered synchronously),
//! 2. the memory cache (moved to the active set, delivered synchronously),
//! 3. a job already running for the key (the callback joins it),
//! 4. a new job, started on the disk-cache executor when its strategy reads
//!    the disk cache and on the source executor otherwise.
//!
//! Locks are always taken in the order job map, active set, memory cache, and
//! none of them is held while a pipeline runs or a callback is called.

use crate::active::ActiveResources;
use crate::job::{CallbackId, EngineJob, JobStatus, LoadCallback, LoadResult, PendingCallback};
use crate::load::LoadSpec;
use crate::metrics::{bump, record_bytes, EngineMetrics};
use crate::resource::{recycle, EngineResource, ResourceLease};
use crate::status::LoadStatus;
use ahash::AHashMap;
use crossbeam_channel::RecvTimeoutError;
use lode_core::cache::TrimLevel;
use lode_core::event::EngineEvent;
use lode_core::executor::Executor;
use lode_core::key::Key;
use lode_core::pipeline::DataSource;
use lode_data::memory_cache::MemoryCache;
use lode_lanes::{DecodeContext, DecodeJob, DecodeOutcome, ExecutorSet, Registry};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// The memory cache the engine parks unreferenced resources in.
pub type ResourceMemoryCache = dyn MemoryCache<Key, Arc<EngineResource>>;

#[derive(Default)]
struct JobMap {
    jobs: AHashMap<Key, Arc<EngineJob>>,
    only_cache_jobs: AHashMap<Key, Arc<EngineJob>>,
}

impl JobMap {
    fn map(&mut self, only_cache: bool) -> &mut AHashMap<Key, Arc<EngineJob>> {
        if only_cache {
            &mut self.only_cache_jobs
        } else {
            &mut self.jobs
        }
    }

    fn get(&mut self, key: &Key, only_cache: bool) -> Option<Arc<EngineJob>> {
        self.map(only_cache).get(key).cloned()
    }

    fn insert(&mut self, job: Arc<EngineJob>) {
        let only_cache = job.only_retrieve_from_cache();
        self.map(only_cache).insert(job.key().clone(), job);
    }

    fn remove_if_same(&mut self, job: &Arc<EngineJob>) {
        let map = self.map(job.only_retrieve_from_cache());
        if map.get(job.key()).is_some_and(|known| Arc::ptr_eq(known, job)) {
            map.remove(job.key());
        }
    }

    fn len(&self) -> usize {
        self.jobs.len() + self.only_cache_jobs.len()
    }

    fn drain(&mut self) -> Vec<Arc<EngineJob>> {
        self.jobs
            .drain()
            .chain(self.only_cache_jobs.drain())
            .map(|(_, job)| job)
            .collect()
    }
}

struct Sweeper {
    stop: crossbeam_channel::Sender<()>,
    handle: JoinHandle<()>,
}

impl Sweeper {
    fn spawn(engine: Weak<EngineInner>, interval: Duration) -> std::io::Result<Self> {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let handle = thread::Builder::new()
            .name("lode-sweeper".into())
            .spawn(move || {
                log::debug!("Sweeper: started, every {interval:?}");
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(inner) = engine.upgrade() else {
                        break;
                    };
                    inner.sweep_abandoned();
                }
                log::debug!("Sweeper: stopped");
            })?;
        Ok(Self { stop, handle })
    }

    fn stop(self) {
        let _ = self.stop.send(());
        if self.handle.thread().id() == thread::current().id() {
            return;
        }
        if self.handle.join().is_err() {
            log::error!("Sweeper: thread panicked");
        }
    }
}

pub(crate) struct EngineInner {
    decode: Arc<DecodeContext>,
    jobs: Mutex<JobMap>,
    active: ActiveResources,
    memory_cache: Arc<ResourceMemoryCache>,
    events: Option<flume::Sender<EngineEvent>>,
    metrics: Option<EngineMetrics>,
    next_job: AtomicU64,
    sweeper: Mutex<Option<Sweeper>>,
}

impl EngineInner {
    fn publish(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            if events.send(event).is_err() {
                log::trace!("Engine: no event listener left");
            }
        }
    }

    fn record_memory_size(&self) {
        record_bytes(
            self.metrics.as_ref().map(|m| &m.memory_cache_bytes),
            self.memory_cache.current_size(),
        );
    }

    /// Parks an unreferenced resource in the memory cache, or returns it for
    /// recycling. Runs under the active-set lock.
    fn park(&self, resource: Arc<EngineResource>) -> (bool, Vec<Arc<EngineResource>>) {
        if !resource.is_memory_cacheable() {
            return (false, vec![resource]);
        }
        let key = resource.key().clone();
        let evicted = self.memory_cache.put(key, resource);
        (true, evicted.into_iter().map(|(_, resource)| resource).collect())
    }

    fn recycle_all(&self, resources: Vec<Arc<EngineResource>>) {
        for resource in resources {
            recycle(resource);
        }
    }

    fn complete(&self, job: &Arc<EngineJob>, outcome: DecodeOutcome) {
        let mut jobs = crate::lock(&self.jobs);
        jobs.remove_if_same(job);
        match outcome {
            DecodeOutcome::Ready(decoded) => {
                let callbacks = job.finish(JobStatus::Done);
                if callbacks.is_empty() {
                    drop(jobs);
                    log::debug!("Engine: job {} was cancelled, recycling its result", job.id());
                    decoded.resource.recycle();
                    return;
                }
                let source = decoded.source;
                let resource = Arc::new(EngineResource::new(
                    job.key().clone(),
                    Arc::new(decoded.resource),
                    job.is_memory_cacheable(),
                    source,
                    callbacks.len(),
                ));
                let displaced = if job.is_memory_cacheable() {
                    self.active.activate(&resource)
                } else {
                    None
                };
                drop(jobs);
                if let Some(displaced) = displaced {
                    log::debug!("Engine: {} replaced an abandoned active entry", job.key());
                    recycle(displaced);
                }
                log::debug!(
                    "Engine: job {} done from {source:?}, notifying {} callback(s)",
                    job.id(),
                    callbacks.len()
                );
                self.publish(EngineEvent::JobCompleted {
                    key: job.key().clone(),
                    source,
                });
                for pending in callbacks {
                    let lease = ResourceLease::new(resource.clone(), source);
                    let callback = pending.callback;
                    pending
                        .executor
                        .execute(Box::new(move || callback(Ok(lease))));
                }
            }
            DecodeOutcome::Failed(error) => {
                let callbacks = job.finish(JobStatus::Failed);
                drop(jobs);
                if callbacks.is_empty() {
                    return;
                }
                bump(self.metrics.as_ref().map(|m| &m.jobs_failed));
                error.log_root_causes(&format!("Engine job {}", job.id()));
                self.publish(EngineEvent::JobFailed {
                    key: job.key().clone(),
                    message: error.to_string(),
                });
                let error = Arc::new(error);
                for pending in callbacks {
                    let error = error.clone();
                    let callback = pending.callback;
                    pending
                        .executor
                        .execute(Box::new(move || callback(Err(error))));
                }
            }
            DecodeOutcome::Cancelled => {
                let dropped = job.finish(JobStatus::Cancelled);
                drop(jobs);
                log::debug!(
                    "Engine: job {} stopped after cancellation ({} callback(s) dropped)",
                    job.id(),
                    dropped.len()
                );
            }
        }
    }

    pub(crate) fn remove_callback(&self, job: &Arc<EngineJob>, id: CallbackId) {
        let mut jobs = crate::lock(&self.jobs);
        if job.remove_callback(id) {
            jobs.remove_if_same(job);
            drop(jobs);
            self.publish(EngineEvent::JobCancelled {
                key: job.key().clone(),
            });
        }
    }

    pub(crate) fn release(&self, lease: ResourceLease) {
        let resource = lease.into_resource();
        let key = resource.key().clone();
        let Some((cached, to_recycle)) = self.active.release(resource, |idle| self.park(idle)) else {
            return;
        };
        self.recycle_all(to_recycle);
        if cached {
            self.record_memory_size();
        }
        log::trace!("Engine: {key} released (cached: {cached})");
        self.publish(EngineEvent::ResourceReleased { key, cached });
    }

    fn sweep_abandoned(&self) -> usize {
        let mut to_recycle = Vec::new();
        let recovered = self.active.sweep(|resource| {
            let (_, evicted) = self.park(resource);
            to_recycle.extend(evicted);
        });
        self.recycle_all(to_recycle);
        if recovered > 0 {
            log::warn!("Engine: recovered {recovered} resource(s) whose leases were never released");
            self.record_memory_size();
            self.publish(EngineEvent::AbandonedRecovered { count: recovered });
        }
        recovered
    }

    fn stop_sweeper(&self) {
        if let Some(sweeper) = crate::lock(&self.sweeper).take() {
            sweeper.stop();
        }
    }
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        self.stop_sweeper();
    }
}

/// Configures and creates an [`Engine`].
pub struct EngineBuilder {
    decode: DecodeContext,
    memory_cache: Arc<ResourceMemoryCache>,
    events: Option<flume::Sender<EngineEvent>>,
    metrics: Option<EngineMetrics>,
    sweep_interval: Option<Duration>,
}

impl EngineBuilder {
    /// Publishes lifecycle events to `events`.
    pub fn with_events(mut self, events: flume::Sender<EngineEvent>) -> Self {
        self.events = Some(events);
        self
    }

    /// Updates `metrics`.
    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Runs [`Engine::sweep_abandoned`] on a background thread every
    /// `interval`.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    /// Creates the engine, starting the sweeper thread if one was asked for.
    pub fn build(self) -> std::io::Result<Engine> {
        let inner = Arc::new(EngineInner {
            decode: Arc::new(self.decode),
            jobs: Mutex::new(JobMap::default()),
            active: ActiveResources::new(),
            memory_cache: self.memory_cache,
            events: self.events,
            metrics: self.metrics,
            next_job: AtomicU64::new(1),
            sweeper: Mutex::new(None),
        });
        if let Some(interval) = self.sweep_interval {
            let sweeper = Sweeper::spawn(Arc::downgrade(&inner), interval)?;
            *crate::lock(&inner.sweeper) = Some(sweeper);
        }
        log::debug!("Engine: created");
        Ok(Engine { inner })
    }
}

/// Loads resources, deduplicating concurrent loads of one key and serving
/// repeated loads from the active set and the memory cache.
///
/// Cloning is cheap; clones share everything.
#[derive(Clone)]
pub struct Engine {
    pub(crate) inner: Arc<EngineInner>,
}

impl Engine {
    /// Starts a builder over the pipeline services and the memory cache.
    pub fn builder(decode: DecodeContext, memory_cache: Arc<ResourceMemoryCache>) -> EngineBuilder {
        EngineBuilder {
            decode,
            memory_cache,
            events: None,
            metrics: None,
            sweep_interval: None,
        }
    }

    /// Loads `spec`, calling `callback` exactly once unless the load is
    /// cancelled.
    ///
    /// Hits on the active set and the memory cache call `callback` on this
    /// thread before returning. Otherwise it is called on `callback_executor`
    /// when the job finishes, after callbacks registered earlier for the same
    /// key.
    pub fn load<F>(&self, spec: LoadSpec, callback: F, callback_executor: Arc<dyn Executor>) -> LoadStatus
    where
        F: FnOnce(LoadResult) + Send + 'static,
    {
        let inner = &self.inner;
        bump(inner.metrics.as_ref().map(|m| &m.loads));
        let key = spec.key();
        let mut jobs = crate::lock(&inner.jobs);

        if spec.memory_cacheable {
            if let Some(resource) = inner.active.acquire(&key) {
                drop(jobs);
                bump(inner.metrics.as_ref().map(|m| &m.active_hits));
                log::trace!("Engine: {key} served from active resources");
                callback(Ok(ResourceLease::new(resource, DataSource::MemoryCache)));
                return LoadStatus::none();
            }
            if let Some(resource) = inner.memory_cache.remove(&key) {
                resource.acquire();
                let displaced = inner.active.activate(&resource);
                drop(jobs);
                if let Some(displaced) = displaced {
                    recycle(displaced);
                }
                bump(inner.metrics.as_ref().map(|m| &m.memory_hits));
                inner.record_memory_size();
                log::trace!("Engine: {key} served from the memory cache");
                callback(Ok(ResourceLease::new(resource, DataSource::MemoryCache)));
                return LoadStatus::none();
            }
        }

        let mut pending = PendingCallback {
            callback: Box::new(callback) as LoadCallback,
            executor: callback_executor,
        };
        if let Some(job) = jobs.get(&key, spec.only_retrieve_from_cache) {
            match job.add_callback(pending) {
                Ok(id) => {
                    drop(jobs);
                    bump(inner.metrics.as_ref().map(|m| &m.jobs_joined));
                    log::trace!("Engine: {key} joined job {}", job.id());
                    return LoadStatus::bound(Arc::downgrade(inner), job, id);
                }
                Err(returned) => pending = returned,
            }
        }

        let job = Arc::new(EngineJob::new(
            inner.next_job.fetch_add(1, Ordering::Relaxed),
            key.clone(),
            spec.memory_cacheable,
            spec.only_retrieve_from_cache,
            pending,
        ));
        jobs.insert(job.clone());
        job.mark_running();
        drop(jobs);

        bump(inner.metrics.as_ref().map(|m| &m.jobs_started));
        log::debug!("Engine: starting job {} for {key}", job.id());
        inner.publish(EngineEvent::JobStarted { key: key.clone() });

        let engine = Arc::downgrade(inner);
        let finished = job.clone();
        let on_complete = Box::new(move |outcome: DecodeOutcome| match engine.upgrade() {
            Some(inner) => inner.complete(&finished, outcome),
            None => {
                if let DecodeOutcome::Ready(decoded) = outcome {
                    decoded.resource.recycle();
                }
            }
        });
        DecodeJob::new(
            Arc::new(spec.into_decode_spec(key)),
            inner.decode.clone(),
            job.cancel_token(),
            on_complete,
        )
        .start();
        LoadStatus::bound(Arc::downgrade(inner), job, CallbackId::FIRST)
    }

    /// Gives a lease back.
    ///
    /// When the last lease of a resource is released it moves to the memory
    /// cache if it is memory-cacheable, and is recycled otherwise.
    pub fn release(&self, lease: ResourceLease) {
        self.inner.release(lease);
    }

    /// Recovers resources whose leases were all dropped without
    /// [`Engine::release`]. Returns how many were recovered.
    pub fn sweep_abandoned(&self) -> usize {
        self.inner.sweep_abandoned()
    }

    /// Empties the disk cache.
    pub fn clear_disk_cache(&self) {
        log::debug!("Engine: clearing the disk cache");
        self.inner.decode.disk_cache.clear();
    }

    /// Recycles everything in the memory cache.
    pub fn clear_memory(&self) {
        let evicted = self.inner.memory_cache.clear_memory();
        self.recycle_evicted(evicted);
    }

    /// Shrinks the memory cache according to `level`.
    pub fn trim_memory(&self, level: TrimLevel) {
        let evicted = self.inner.memory_cache.trim_memory(level);
        self.recycle_evicted(evicted);
    }

    /// Scales the memory-cache budget.
    pub fn set_size_multiplier(&self, multiplier: f32) {
        let evicted = self.inner.memory_cache.set_size_multiplier(multiplier);
        self.recycle_evicted(evicted);
    }

    fn recycle_evicted(&self, evicted: Vec<(Key, Arc<EngineResource>)>) {
        if !evicted.is_empty() {
            log::debug!("Engine: recycling {} evicted resource(s)", evicted.len());
        }
        self.inner
            .recycle_all(evicted.into_iter().map(|(_, resource)| resource).collect());
        self.inner.record_memory_size();
    }

    /// Cancels every running job, stops the sweeper, shuts the executors down
    /// and empties the memory cache.
    pub fn shutdown(&self) {
        log::info!("Engine: shutting down");
        self.inner.stop_sweeper();
        let jobs = crate::lock(&self.inner.jobs).drain();
        for job in jobs {
            job.cancel_all();
        }
        self.inner.decode.executors.shutdown();
        self.clear_memory();
    }

    /// Whether `key` is in the active set.
    pub fn is_active(&self, key: &Key) -> bool {
        self.inner.active.contains(key)
    }

    /// Number of entries in the active set.
    pub fn active_count(&self) -> usize {
        self.inner.active.len()
    }

    /// Whether `key` is in the memory cache.
    pub fn is_memory_cached(&self, key: &Key) -> bool {
        self.inner.memory_cache.contains(key)
    }

    /// Bytes held by the memory cache.
    pub fn memory_cache_size(&self) -> usize {
        self.inner.memory_cache.current_size()
    }

    /// Number of jobs in flight.
    pub fn job_count(&self) -> usize {
        crate::lock(&self.inner.jobs).len()
    }

    /// The frozen registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.inner.decode.registry
    }

    /// The executors jobs run on.
    pub fn executors(&self) -> &ExecutorSet {
        &self.inner.decode.executors
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("jobs", &self.job_count())
            .field("active", &self.active_count())
            .field("memory_cache_bytes", &self.memory_cache_size())
            .finish()
    }
}
