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
use lode_core::cache::DiskCacheStrategy;
use lode_core::error::{BoxError, LoadError};
use lode_core::key::{Dimensions, Options};
use lode_core::model::ModelRef;
use lode_core::pipeline::{DataSource, Decoder, Fetcher, LoadData, ModelLoader, Priority};
use lode_core::resource::{BoxedResource, SimpleResource};
use lode_core::target::{ResultSink, SizeReadyCallback, Sizable};
use lode_data::MemoryBudgets;
use lode_lanes::ExecutorSet;
use lode_sdk::{
    EngineConfig, EngineContext, MemoryConfig, RequestDispatcher, RequestListener, RequestOptions,
    RequestState, SingleRequest, ThumbnailRequestCoordinator,
};
use std::borrow::Cow;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// --- Components: text fetched from "mem://" models ---

struct MemFetcher {
    url: String,
    fetches: Arc<AtomicUsize>,
}

impl Fetcher<Vec<u8>> for MemFetcher {
    fn id(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.url)
    }

    fn load_data(&self, _priority: Priority) -> Result<Vec<u8>, BoxError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let body = self.url.trim_start_matches("mem://");
        Ok(body.as_bytes().to_vec())
    }

    fn data_source(&self) -> DataSource {
        DataSource::Remote
    }
}

struct MemLoader {
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
            fetches: self.fetches.clone(),
        })))
    }
}

struct Utf8Decoder;

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
        let size = text.len();
        Ok(Some(SimpleResource::boxed(text, size)))
    }
}

// --- A target that records what it is told ---

#[derive(Debug, Clone, PartialEq)]
enum Seen {
    Started(Option<String>),
    Ready(String, DataSource),
    Failed(Option<String>),
    Cleared(Option<String>),
    SizeCallbackRemoved,
}

#[derive(Default)]
struct RecordingTarget {
    seen: RefCell<Vec<Seen>>,
    pending_size: RefCell<Option<SizeReadyCallback>>,
}

impl RecordingTarget {
    fn report_size(&self, dimensions: Dimensions) {
        let callback = self.pending_size.borrow_mut().take();
        if let Some(callback) = callback {
            callback(dimensions);
        }
    }

    fn seen(&self) -> Vec<Seen> {
        self.seen.borrow().clone()
    }
}

impl Sizable for RecordingTarget {
    fn get_size(&self, callback: SizeReadyCallback) {
        *self.pending_size.borrow_mut() = Some(callback);
    }

    fn remove_size_callback(&self, callback: &SizeReadyCallback) {
        let mut pending = self.pending_size.borrow_mut();
        if pending.as_ref().is_some_and(|known| Rc::ptr_eq(known, callback)) {
            *pending = None;
            self.seen.borrow_mut().push(Seen::SizeCallbackRemoved);
        }
    }
}

impl ResultSink<String> for RecordingTarget {
    fn on_load_started(&self, placeholder: Option<&String>) {
        self.seen.borrow_mut().push(Seen::Started(placeholder.cloned()));
    }

    fn on_resource_ready(&self, resource: &String, source: DataSource) {
        self.seen.borrow_mut().push(Seen::Ready(resource.clone(), source));
    }

    fn on_load_failed(&self, error_placeholder: Option<&String>) {
        self.seen.borrow_mut().push(Seen::Failed(error_placeholder.cloned()));
    }

    fn on_load_cleared(&self, placeholder: Option<&String>) {
        self.seen.borrow_mut().push(Seen::Cleared(placeholder.cloned()));
    }
}

// --- Harness ---

struct Harness {
    context: EngineContext,
    dispatcher: Rc<RequestDispatcher>,
    fetches: Arc<AtomicUsize>,
}

impl Harness {
    fn new() -> Result<Self> {
        let fetches = Arc::new(AtomicUsize::new(0));
        let loader_fetches = fetches.clone();
        let config = EngineConfig {
            memory: MemoryConfig::Explicit(MemoryBudgets {
                memory_cache_size: 1 << 20,
                pixel_pool_size: 1 << 20,
                array_pool_size: 1 << 16,
            }),
            sweep_interval_ms: None,
            disk_cache_size: None,
            default_strategy: DiskCacheStrategy::None,
            ..EngineConfig::default()
        };
        let context = EngineContext::builder(config)
            .with_executors(ExecutorSet::direct())
            .register(move |registry| {
                registry
                    .append_model_loader::<String, Vec<u8>, _>(MemLoader {
                        fetches: loader_fetches,
                    })
                    .append_decoder::<Vec<u8>, String, _>(Utf8Decoder);
            })
            .build()?;
        let dispatcher = context.dispatcher();
        Ok(Self {
            context,
            dispatcher,
            fetches,
        })
    }

    fn request(&self, body: &str, target: &Rc<RecordingTarget>, options: RequestOptions<String>) -> SingleRequest<String> {
        self.context.request::<String>(
            &self.dispatcher,
            format!("mem://{body}"),
            target.clone(),
            options,
        )
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

fn options() -> RequestOptions<String> {
    RequestOptions::new().strategy(DiskCacheStrategy::None)
}

#[test]
fn request_loads_once_the_size_is_known() -> Result<()> {
    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let request = harness.request("hello", &target, options().placeholder("…".to_string()));

    request.begin();
    assert_eq!(request.state(), RequestState::WaitingForSize);
    assert_eq!(target.seen(), vec![Seen::Started(Some("…".to_string()))]);
    assert!(request.key().is_none());

    target.report_size(Dimensions::new(64, 64));
    assert_eq!(request.state(), RequestState::Running);
    assert!(request.key().is_some());

    assert_eq!(harness.dispatcher.pump(), 1);
    assert!(request.is_complete());
    assert_eq!(
        target.seen().last(),
        Some(&Seen::Ready("hello".to_string(), DataSource::Remote))
    );
    Ok(())
}

#[test]
fn a_second_size_report_is_ignored() -> Result<()> {
    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let request = harness.request("twice", &target, options());

    request.begin();
    request.on_size_ready(Dimensions::new(10, 10));
    request.on_size_ready(Dimensions::new(20, 20));

    assert_eq!(harness.fetches(), 1);
    assert_eq!(harness.dispatcher.pump(), 1);
    assert!(request.is_complete());
    Ok(())
}

#[test]
fn clearing_twice_notifies_the_target_once() -> Result<()> {
    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let request = harness.request("cleared", &target, options().override_size(Dimensions::new(8, 8)));

    request.begin();
    harness.dispatcher.pump();
    let key = request.key().expect("the size was known");
    assert!(harness.context.engine().is_active(&key));

    request.clear();
    request.clear();

    let cleared = target
        .seen()
        .iter()
        .filter(|seen| matches!(seen, Seen::Cleared(_)))
        .count();
    assert_eq!(cleared, 1);
    assert!(request.is_cleared());
    assert!(harness.context.engine().is_memory_cached(&key));
    Ok(())
}

#[test]
fn cancelling_while_waiting_for_size_never_loads() -> Result<()> {
    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let request = harness.request("never", &target, options());

    request.begin();
    request.cancel();
    target.report_size(Dimensions::new(32, 32));

    assert_eq!(request.state(), RequestState::Cancelled);
    assert_eq!(harness.fetches(), 0);
    assert_eq!(harness.dispatcher.pump(), 0);
    assert_eq!(
        target.seen(),
        vec![Seen::Started(None), Seen::SizeCallbackRemoved]
    );
    Ok(())
}

#[test]
fn failures_show_the_error_placeholder() -> Result<()> {
    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let request = harness.context.request::<String>(
        &harness.dispatcher,
        "ftp://unsupported".to_string(),
        target.clone(),
        options()
            .override_size(Dimensions::new(8, 8))
            .error("broken".to_string()),
    );

    request.begin();
    harness.dispatcher.pump();

    assert!(request.is_failed());
    assert_eq!(target.seen().last(), Some(&Seen::Failed(Some("broken".to_string()))));
    Ok(())
}

#[test]
fn listeners_can_take_over_notification() -> Result<()> {
    struct Consume(RefCell<Vec<String>>);

    impl RequestListener<String> for Consume {
        fn on_resource_ready(
            &self,
            resource: &String,
            _model: &ModelRef,
            _source: DataSource,
            is_first_resource: bool,
        ) -> bool {
            assert!(is_first_resource);
            self.0.borrow_mut().push(resource.clone());
            true
        }

        fn on_load_failed(&self, _error: &LoadError, _model: &ModelRef, _first: bool) -> bool {
            false
        }
    }

    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let listener = Rc::new(Consume(RefCell::new(Vec::new())));
    let request = harness.request("observed", &target, options().override_size(Dimensions::new(8, 8)));
    request.add_listener(listener.clone());

    request.begin();
    harness.dispatcher.pump();

    assert_eq!(*listener.0.borrow(), vec!["observed".to_string()]);
    assert!(!target.seen().iter().any(|seen| matches!(seen, Seen::Ready(..))));
    Ok(())
}

#[test]
fn paused_requests_begin_on_resume() -> Result<()> {
    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let request = harness.request("later", &target, options().override_size(Dimensions::new(8, 8)));

    request.pause();
    request.begin();
    assert_eq!(request.state(), RequestState::Paused);
    assert_eq!(harness.fetches(), 0);

    request.resume();
    assert!(!request.is_paused());
    harness.dispatcher.pump();
    assert!(request.is_complete());
    assert_eq!(harness.fetches(), 1);
    Ok(())
}

#[test]
fn results_for_dropped_requests_are_released() -> Result<()> {
    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let request = harness.request("orphan", &target, options().override_size(Dimensions::new(8, 8)));

    request.begin();
    let key = request.key().expect("the size was known");
    drop(request);
    assert_eq!(harness.dispatcher.pump(), 1);

    assert!(!harness.context.engine().is_active(&key));
    assert!(harness.context.engine().is_memory_cached(&key));
    assert!(target.seen().iter().all(|seen| !matches!(seen, Seen::Ready(..))));
    Ok(())
}

#[test]
fn the_full_request_wins_over_its_thumbnail() -> Result<()> {
    let harness = Harness::new()?;
    let target = Rc::new(RecordingTarget::default());
    let sized = || options().override_size(Dimensions::new(8, 8));
    let coordinator = ThumbnailRequestCoordinator::new(
        harness.request("full", &target, sized()),
        harness.request("thumb", &target, sized()),
    );

    coordinator.begin();
    assert!(coordinator.thumbnail().is_running());
    assert_eq!(harness.dispatcher.pump(), 2);

    assert!(coordinator.full().is_complete());
    assert!(coordinator.thumbnail().is_cleared());
    let ready: Vec<_> = target
        .seen()
        .into_iter()
        .filter(|seen| matches!(seen, Seen::Ready(..)))
        .collect();
    assert_eq!(ready, vec![Seen::Ready("full".to_string(), DataSource::Remote)]);
    // The thumbnail clears silently; only the full request speaks for the target.
    assert!(!target.seen().iter().any(|seen| matches!(seen, Seen::Cleared(_))));

    // A thumbnail finishing after the full request is withheld.
    coordinator.thumbnail().begin();
    harness.dispatcher.pump();
    assert!(coordinator.thumbnail().is_complete());
    assert_eq!(
        target
            .seen()
            .iter()
            .filter(|seen| matches!(seen, Seen::Ready(..)))
            .count(),
        1
    );

    coordinator.clear();
    assert_eq!(
        target
            .seen()
            .iter()
            .filter(|seen| matches!(seen, Seen::Cleared(_)))
            .count(),
        1
    );
    Ok(())
}
