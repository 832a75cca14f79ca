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

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender};
use lode_agents::{
    Engine, EngineResource, JobStatus, LoadResult, LoadSpec, ResourceLease, ResourceMemoryCache,
};
use lode_core::cache::{DiskCache, DiskCacheStrategy};
use lode_core::error::{BoxError, LoadError};
use lode_core::event::{EngineEvent, EventBus};
use lode_core::executor::Executor;
use lode_core::key::{Dimensions, Key, Options};
use lode_core::pipeline::{
    DataSource, Decoder, EncodeStrategy, Encoder, Fetcher, LoadData, ModelLoader, Priority,
    ResourceEncoder, Transformation,
};
use lode_core::resource::{BoxedResource, Resource, SimpleResource};
use lode_data::{InMemoryDiskCache, LruResourceCache};
use lode_lanes::{DecodeContext, DirectExecutor, ExecutorSet, Registry, SpawningExecutor};
use std::borrow::Cow;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

// --- Test components: text fetched from "mem://" models ---

struct MemFetcher {
    url: String,
    gate: Option<Receiver<()>>,
    fetches: Arc<AtomicUsize>,
}

impl Fetcher<Vec<u8>> for MemFetcher {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.url)
    }

    fn load_data(&self, _priority: Priority) -> Result<Vec<u8>, BoxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            // Opened by dropping every sender.
            let _ = gate.recv_timeout(WAIT);
        }
        match self.url.strip_prefix("mem://") {
            Some(body) => Ok(body.as_bytes().to_vec()),
            None => Err("unsupported url".into()),
        }
    }

    fn data_source(&self) -> DataSource {
        DataSource::Remote
    }
}

struct MemLoader {
    gate: Option<Receiver<()>>,
    fetches: Arc<AtomicUsize>,
}

impl ModelLoader<String, Vec<u8>> for MemLoader {
    fn handles(&self, model: &String) -> bool {
        model.starts_with("mem://")
    }

    fn build_load_data(
        &self,
        model: &String,
        _dimensions: Dimensions,
        _options: &Options,
    ) -> Option<LoadData<Vec<u8>>> {
        Some(LoadData::new(Arc::new(MemFetcher {
            url: model.clone(),
            gate: self.gate.clone(),
            fetches: self.fetches.clone(),
        })))
    }
}

/// Text whose recycling is counted.
struct TrackedText {
    text: String,
    recycled: Arc<AtomicUsize>,
}

impl Resource<String> for TrackedText {
    fn get(&self) -> &String {
        &self.text
    }

    fn size(&self) -> usize {
        self.text.len()
    }

    fn recycle(self: Box<Self>) {
        self.recycled.fetch_add(1, Ordering::SeqCst);
    }
}

/// Decodes UTF-8. Panics on "boom"; "held" signals `started` and then waits
/// for `release` to open.
struct Utf8Decoder {
    recycled: Arc<AtomicUsize>,
    started: Sender<()>,
    release: Receiver<()>,
}

impl Decoder<Vec<u8>, String> for Utf8Decoder {
    fn handles(&self, _data: &Vec<u8>, _options: &Options) -> Result<bool, BoxError> {
        Ok(true)
    }

    fn decode(
        &self,
        data: &Vec<u8>,
        _dimensions: Dimensions,
        _options: &Options,
    ) -> Result<Option<BoxedResource<String>>, BoxError> {
        let text = String::from_utf8(data.clone())?;
        match text.as_str() {
            "boom" => panic!("decoder blew up"),
            "held" => {
                let _ = self.started.send(());
                let _ = self.release.recv_timeout(WAIT);
            }
            _ => {}
        }
        Ok(Some(Box::new(TrackedText {
            text,
            recycled: self.recycled.clone(),
        })))
    }
}

struct RawBytes;

impl Encoder<Vec<u8>> for RawBytes {
    fn encode(&self, data: &Vec<u8>, sink: &mut dyn Write, _options: &Options) -> bool {
        sink.write_all(data).is_ok()
    }
}

struct TextEncoder;

impl ResourceEncoder<String> for TextEncoder {
    fn encode(&self, resource: &dyn Resource<String>, sink: &mut dyn Write, _options: &Options) -> bool {
        sink.write_all(resource.get().as_bytes()).is_ok()
    }

    fn encode_strategy(&self, _options: &Options) -> EncodeStrategy {
        EncodeStrategy::Transformed
    }
}

/// Keeps the middle of the text, at most `dimensions.width` characters.
struct CenterCrop;

impl Transformation<String> for CenterCrop {
    fn id(&self) -> String {
        "CenterCrop".to_string()
    }

    fn transform(
        &self,
        resource: &dyn Resource<String>,
        dimensions: Dimensions,
    ) -> Result<Option<BoxedResource<String>>, BoxError> {
        let text = resource.get();
        let keep = (dimensions.width as usize).min(text.len());
        let start = (text.len() - keep) / 2;
        let cropped = text[start..start + keep].to_string();
        let size = cropped.len();
        Ok(Some(SimpleResource::boxed(cropped, size)))
    }
}

// --- Harness ---

struct Harness {
    engine: Engine,
    fetches: Arc<AtomicUsize>,
    recycled: Arc<AtomicUsize>,
    events: EventBus<EngineEvent>,
    gate: Option<Sender<()>>,
    decode_started: Receiver<()>,
    decode_gate: Option<Sender<()>>,
}

impl Harness {
    /// Jobs and callbacks run inline.
    fn direct() -> Self {
        Self::build(ExecutorSet::direct(), false, Arc::new(InMemoryDiskCache::new(1 << 20)))
    }

    /// Jobs run on their own thread and block in the fetcher until
    /// [`Harness::open_gate`].
    fn gated() -> Self {
        let executor: Arc<dyn Executor> = Arc::new(SpawningExecutor::new("test"));
        Self::build(
            ExecutorSet::uniform(executor),
            true,
            Arc::new(InMemoryDiskCache::new(1 << 20)),
        )
    }

    fn build(executors: ExecutorSet, gated: bool, disk: Arc<InMemoryDiskCache>) -> Self {
        Self::build_with_budget(executors, gated, disk, 1 << 20)
    }

    fn build_with_budget(
        executors: ExecutorSet,
        gated: bool,
        disk: Arc<InMemoryDiskCache>,
        memory_budget: usize,
    ) -> Self {
        let fetches = Arc::new(AtomicUsize::new(0));
        let recycled = Arc::new(AtomicUsize::new(0));
        let (started, decode_started) = crossbeam_channel::unbounded();
        let (decode_gate, release) = crossbeam_channel::bounded(0);
        let (gate, gate_rx) = if gated {
            let (tx, rx) = crossbeam_channel::bounded(0);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let mut builder = Registry::builder();
        builder
            .append_model_loader::<String, Vec<u8>, _>(MemLoader {
                gate: gate_rx,
                fetches: fetches.clone(),
            })
            .append_decoder::<Vec<u8>, String, _>(Utf8Decoder {
                recycled: recycled.clone(),
                started,
                release,
            })
            .append_encoder::<Vec<u8>, _>(RawBytes)
            .append_resource_encoder::<String, _>(TextEncoder);
        let disk_cache: Arc<dyn DiskCache> = disk;
        let decode = DecodeContext {
            registry: Arc::new(builder.freeze()),
            disk_cache,
            executors,
            metrics: None,
        };
        let memory_cache: Arc<ResourceMemoryCache> =
            Arc::new(LruResourceCache::<Key, Arc<EngineResource>>::new(memory_budget, |resource| {
                resource.size()
            }));
        let events = EventBus::new();
        let engine = Engine::builder(decode, memory_cache)
            .with_events(events.sender())
            .build()
            .expect("engine should build");
        Self {
            engine,
            fetches,
            recycled,
            events,
            gate,
            decode_started,
            decode_gate: Some(decode_gate),
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn recycled(&self) -> usize {
        self.recycled.load(Ordering::SeqCst)
    }

    fn open_gate(&mut self) {
        self.gate = None;
    }

    /// Lets a decode of "held" finish.
    fn open_decode_gate(&mut self) {
        self.decode_gate = None;
    }

    /// Loads and waits for the callback.
    fn load(&self, spec: LoadSpec) -> LoadResult {
        let rx = self.start(spec);
        rx.recv_timeout(WAIT).expect("load never completed")
    }

    fn start(&self, spec: LoadSpec) -> Receiver<LoadResult> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.engine.load(
            spec,
            move |result| {
                let _ = tx.send(result);
            },
            Arc::new(DirectExecutor),
        );
        rx
    }

    fn events(&self) -> Vec<EngineEvent> {
        self.events.drain()
    }
}

fn text(body: &str) -> LoadSpec {
    LoadSpec::new::<String>(format!("mem://{body}")).with_strategy(DiskCacheStrategy::None)
}

fn lease(result: LoadResult) -> ResourceLease {
    match result {
        Ok(lease) => lease,
        Err(error) => panic!("load failed: {error}"),
    }
}

#[test]
fn concurrent_loads_share_one_job_and_one_resource() {
    let mut harness = Harness::gated();
    let receivers: Vec<_> = (0..3).map(|_| harness.start(text("shared"))).collect();
    assert_eq!(harness.engine.job_count(), 1);

    harness.open_gate();
    let leases: Vec<_> = receivers
        .iter()
        .map(|rx| lease(rx.recv_timeout(WAIT).expect("load never completed")))
        .collect();

    assert_eq!(harness.fetches(), 1);
    assert!(leases
        .windows(2)
        .all(|pair| Arc::ptr_eq(pair[0].resource(), pair[1].resource())));
    assert_eq!(leases[0].resource().acquired(), 3);
    assert_eq!(leases[0].get::<String>().map(String::as_str), Some("shared"));
    assert_eq!(leases[0].data_source(), DataSource::Remote);
    assert_eq!(harness.engine.job_count(), 0);

    let key = leases[0].key().clone();
    for lease in leases {
        harness.engine.release(lease);
    }
    assert!(!harness.engine.is_active(&key));
    assert!(harness.engine.is_memory_cached(&key));
}

#[test]
fn different_transformations_are_different_resources() {
    let harness = Harness::direct();
    let a = text("abcdefgh").with_dimensions(Dimensions::new(4, 4));
    let b = a.clone().transform::<String, _>(CenterCrop);
    assert_ne!(a.key(), b.key());

    let plain = lease(harness.load(a));
    let cropped = lease(harness.load(b));

    assert_eq!(plain.get::<String>().map(String::as_str), Some("abcdefgh"));
    assert_eq!(cropped.get::<String>().map(String::as_str), Some("cdef"));
    assert_eq!(harness.fetches(), 2);
    assert_eq!(harness.engine.active_count(), 2);
}

#[test]
fn released_resources_are_promoted_back_from_memory() {
    let harness = Harness::direct();
    let first = lease(harness.load(text("hot")));
    let key = first.key().clone();
    assert!(harness.engine.is_active(&key));

    harness.engine.release(first);
    assert!(harness.engine.is_memory_cached(&key));
    assert!(harness.engine.memory_cache_size() > 0);

    let again = lease(harness.load(text("hot")));
    assert_eq!(again.data_source(), DataSource::MemoryCache);
    assert_eq!(harness.fetches(), 1);
    assert!(harness.engine.is_active(&key));
    assert!(!harness.engine.is_memory_cached(&key));

    // Served from the active set while still held.
    let shared = lease(harness.load(text("hot")));
    assert!(Arc::ptr_eq(again.resource(), shared.resource()));
    assert_eq!(shared.resource().acquired(), 2);

    let events = harness.events();
    assert!(events.contains(&EngineEvent::ResourceReleased { key, cached: true }));
}

#[test]
fn memory_uncacheable_loads_rerun_the_pipeline() {
    let harness = Harness::direct();
    let spec = text("cold").memory_cacheable(false);

    let first = lease(harness.load(spec.clone()));
    let key = first.key().clone();
    assert!(!harness.engine.is_active(&key));
    harness.engine.release(first);
    assert!(!harness.engine.is_memory_cached(&key));

    let second = lease(harness.load(spec));
    assert_eq!(second.data_source(), DataSource::Remote);
    assert_eq!(harness.fetches(), 2);
    harness.engine.release(second);
}

#[test]
fn disk_cache_survives_a_new_engine() {
    let disk = Arc::new(InMemoryDiskCache::new(1 << 20));
    let spec = || LoadSpec::new::<String>("mem://persisted".to_string()).with_strategy(DiskCacheStrategy::All);

    let first = Harness::build(ExecutorSet::direct(), false, disk.clone());
    let lease_one = lease(first.load(spec()));
    assert_eq!(lease_one.data_source(), DataSource::Remote);
    first.engine.release(lease_one);

    let second = Harness::build(ExecutorSet::direct(), false, disk.clone());
    let lease_two = lease(second.load(spec()));
    assert_eq!(lease_two.data_source(), DataSource::ResourceDiskCache);
    assert_eq!(lease_two.get::<String>().map(String::as_str), Some("persisted"));
    assert_eq!(second.fetches(), 0);

    second.engine.clear_disk_cache();
    assert!(disk.is_empty());
}

#[test]
fn cache_only_loads_fail_without_fetching() {
    let harness = Harness::direct();
    let result = harness.load(
        LoadSpec::new::<String>("mem://nowhere".to_string()).only_retrieve_from_cache(true),
    );

    let error = result.err().expect("a cache-only miss should fail");
    assert!(matches!(*error, LoadError::CacheOnlyMiss));
    assert_eq!(harness.fetches(), 0);
    assert!(harness
        .events()
        .iter()
        .any(|event| matches!(event, EngineEvent::JobFailed { .. })));
}

#[test]
fn missing_pipeline_fails_the_load() {
    let harness = Harness::direct();
    let result = harness.load(text("number").decode_as::<u64>());

    let error = result.err().expect("no pipeline decodes text into u64");
    assert!(matches!(*error, LoadError::NoPipeline { .. }));
}

#[test]
fn cancelling_the_only_callback_cancels_the_job() {
    let mut harness = Harness::gated();
    let (tx, rx) = crossbeam_channel::unbounded::<LoadResult>();
    let status = harness.engine.load(
        text("unwanted"),
        move |result| {
            let _ = tx.send(result);
        },
        Arc::new(DirectExecutor),
    );
    assert!(status.is_bound());
    assert_eq!(status.job_status(), Some(JobStatus::Running));

    status.cancel();
    status.cancel();
    assert_eq!(status.job_status(), Some(JobStatus::Cancelled));
    assert_eq!(harness.engine.job_count(), 0);

    harness.open_gate();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert_eq!(harness.engine.active_count(), 0);
    assert_eq!(
        harness
            .events()
            .iter()
            .filter(|event| matches!(event, EngineEvent::JobCancelled { .. }))
            .count(),
        1
    );
}

#[test]
fn a_job_cancelled_during_decode_recycles_its_result() {
    let mut harness = Harness::gated();
    harness.open_gate();
    let (tx, rx) = crossbeam_channel::unbounded::<LoadResult>();
    let status = harness.engine.load(
        text("held"),
        move |result| {
            let _ = tx.send(result);
        },
        Arc::new(DirectExecutor),
    );
    harness
        .decode_started
        .recv_timeout(WAIT)
        .expect("decode never started");

    status.cancel();
    harness.open_decode_gate();

    let deadline = std::time::Instant::now() + WAIT;
    while harness.recycled() == 0 && std::time::Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(harness.recycled(), 1);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(harness.engine.active_count(), 0);
    assert_eq!(harness.engine.memory_cache_size(), 0);
    assert_eq!(harness.engine.job_count(), 0);
}

#[test]
fn a_panicking_decoder_fails_every_waiting_load() {
    let mut harness = Harness::gated();
    let first = harness.start(text("boom"));
    let second = harness.start(text("boom"));
    assert_eq!(harness.engine.job_count(), 1);

    harness.open_gate();
    for rx in [&first, &second] {
        let error = rx
            .recv_timeout(WAIT)
            .expect("load never completed")
            .err()
            .expect("a panicking decoder should fail the load");
        assert!(matches!(*error, LoadError::Panicked { .. }));
    }
    assert_eq!(harness.engine.job_count(), 0);

    // The key is not left behind a dead job.
    let retry = harness.load(text("boom"));
    assert!(retry.is_err());
    assert_eq!(harness.fetches(), 2);
}

#[test]
fn memory_cache_evicts_and_recycles_the_least_recent_resource() {
    let harness = Harness::build_with_budget(
        ExecutorSet::direct(),
        false,
        Arc::new(InMemoryDiskCache::new(1 << 20)),
        8,
    );
    let first = lease(harness.load(text("first!")));
    let first_key = first.key().clone();
    harness.engine.release(first);
    assert!(harness.engine.is_memory_cached(&first_key));

    let second = lease(harness.load(text("second")));
    let second_key = second.key().clone();
    harness.engine.release(second);

    assert!(!harness.engine.is_memory_cached(&first_key));
    assert!(harness.engine.is_memory_cached(&second_key));
    assert_eq!(harness.engine.memory_cache_size(), 6);
    assert_eq!(harness.recycled(), 1);

    let reloaded = lease(harness.load(text("first!")));
    assert_eq!(reloaded.data_source(), DataSource::Remote);
    assert_eq!(harness.fetches(), 3);
}

#[test]
fn abandoned_leases_are_swept_into_memory() {
    let harness = Harness::direct();
    let dropped = lease(harness.load(text("forgotten")));
    let key = dropped.key().clone();
    drop(dropped);
    assert_eq!(harness.engine.active_count(), 1);

    assert_eq!(harness.engine.sweep_abandoned(), 1);
    assert_eq!(harness.engine.sweep_abandoned(), 0);
    assert_eq!(harness.engine.active_count(), 0);
    assert!(harness.engine.is_memory_cached(&key));
    assert!(harness
        .events()
        .contains(&EngineEvent::AbandonedRecovered { count: 1 }));

    let again = lease(harness.load(text("forgotten")));
    assert_eq!(again.data_source(), DataSource::MemoryCache);
    assert_eq!(harness.fetches(), 1);
}

#[test]
fn trimming_recycles_cached_resources() {
    let harness = Harness::direct();
    let held = lease(harness.load(text("trim me")));
    let key = held.key().clone();
    harness.engine.release(held);
    assert!(harness.engine.is_memory_cached(&key));

    harness.engine.clear_memory();
    assert!(!harness.engine.is_memory_cached(&key));
    assert_eq!(harness.engine.memory_cache_size(), 0);
}

#[tokio::test]
async fn load_async_resolves_with_a_lease() -> Result<()> {
    let harness = Harness::direct();
    let lease = harness
        .engine
        .load_async(text("awaited"))
        .await
        .map_err(|e| anyhow::anyhow!("load failed: {e}"))?;
    assert_eq!(lease.get::<String>().map(String::as_str), Some("awaited"));
    harness.engine.release(lease);

    let error = harness
        .engine
        .load_async(text("awaited").decode_as::<u64>())
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected a failure"))?;
    assert!(matches!(*error, LoadError::NoPipeline { .. }));
    Ok(())
}

#[tokio::test]
async fn dropping_a_load_future_cancels_the_job() -> Result<()> {
    let mut harness = Harness::gated();
    let future = harness.engine.load_async(text("never awaited"));
    assert_eq!(harness.engine.job_count(), 1);

    drop(future);
    assert_eq!(harness.engine.job_count(), 0);
    harness.open_gate();
    assert!(harness
        .events()
        .iter()
        .any(|event| matches!(event, EngineEvent::JobCancelled { .. })));
    Ok(())
}

#[tokio::test]
async fn shutdown_resolves_pending_futures_as_cancelled() -> Result<()> {
    let mut harness = Harness::gated();
    let future = harness.engine.load_async(text("interrupted"));

    harness.engine.shutdown();
    harness.open_gate();
    let error = future
        .await
        .err()
        .ok_or_else(|| anyhow::anyhow!("expected a cancellation"))?;
    assert!(matches!(*error, LoadError::Cancelled));
    Ok(())
}
