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

//! One load into one target.

use super::coordinator::RequestCoordinator;
use super::dispatcher::{Completable, RequestDispatcher, RequestId};
use super::options::RequestOptions;
use lode_agents::{LoadResult, LoadStatus, ResourceLease};
use lode_core::error::LoadError;
use lode_core::key::{Dimensions, Key};
use lode_core::model::ModelRef;
use lode_core::pipeline::DataSource;
use lode_core::target::{Cancellable, SizeReadyCallback, Target};
use lode_lanes::DirectExecutor;
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

/// Where a request is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Not begun.
    Created,
    /// Waiting for the target to report its size.
    WaitingForSize,
    /// A load is in flight.
    Running,
    /// The resource was delivered, or withheld by the coordinator.
    Complete,
    /// The load failed.
    Failed,
    /// Paused before a load could start.
    Paused,
    /// Cleared; the target was told to drop the result.
    Cleared,
    /// Cancelled without notifying the target.
    Cancelled,
}

/// Observes a request's outcome and may take over the target notification.
pub trait RequestListener<Z> {
    /// The resource is ready. Returning `true` skips the target.
    fn on_resource_ready(
        &self,
        _resource: &Z,
        _model: &ModelRef,
        _source: DataSource,
        _is_first_resource: bool,
    ) -> bool {
        false
    }

    /// The load failed. Returning `true` skips the target.
    fn on_load_failed(&self, _error: &LoadError, _model: &ModelRef, _is_first_resource: bool) -> bool {
        false
    }
}

struct RequestInner {
    state: RequestState,
    paused: bool,
    begun_while_paused: bool,
    size_callback: Option<SizeReadyCallback>,
    status: Option<LoadStatus>,
    lease: Option<ResourceLease>,
    key: Option<Key>,
    // Bumped per load; results for older loads are released unseen.
    ticket: u64,
}

struct RequestShared<Z: 'static> {
    id: RequestId,
    this: Weak<RequestShared<Z>>,
    dispatcher: Rc<RequestDispatcher>,
    model: ModelRef,
    target: Rc<dyn Target<Z>>,
    options: RequestOptions<Z>,
    listeners: RefCell<Vec<Rc<dyn RequestListener<Z>>>>,
    coordinator: RefCell<Option<Weak<dyn RequestCoordinator>>>,
    inner: RefCell<RequestInner>,
}

/// Loads one model into one target, on the dispatcher's thread.
///
/// Targets and listeners are always called with no internal borrow held, so
/// they may call back into the request. Results from the engine are applied
/// when the dispatcher is pumped.
pub struct SingleRequest<Z: 'static> {
    shared: Rc<RequestShared<Z>>,
}

impl<Z: 'static> Clone for SingleRequest<Z> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<Z: 'static> SingleRequest<Z> {
    /// Creates a request of `model` into `target`.
    pub fn new(
        dispatcher: &Rc<RequestDispatcher>,
        model: ModelRef,
        target: Rc<dyn Target<Z>>,
        options: RequestOptions<Z>,
    ) -> Self {
        let shared = Rc::new_cyclic(|this: &Weak<RequestShared<Z>>| {
            let completable: Weak<dyn Completable> = this.clone();
            RequestShared {
                id: dispatcher.register(completable),
                this: this.clone(),
                dispatcher: dispatcher.clone(),
                model,
                target,
                options,
                listeners: RefCell::new(Vec::new()),
                coordinator: RefCell::new(None),
                inner: RefCell::new(RequestInner {
                    state: RequestState::Created,
                    paused: false,
                    begun_while_paused: false,
                    size_callback: None,
                    status: None,
                    lease: None,
                    key: None,
                    ticket: 0,
                }),
            }
        });
        Self { shared }
    }

    /// Identity within the dispatcher.
    pub fn id(&self) -> RequestId {
        self.shared.id
    }

    /// The model being loaded.
    pub fn model(&self) -> &ModelRef {
        &self.shared.model
    }

    /// Current state.
    pub fn state(&self) -> RequestState {
        self.shared.state()
    }

    /// The key of the current or last load, once the size was known.
    pub fn key(&self) -> Option<Key> {
        self.shared.inner.borrow().key.clone()
    }

    /// Waiting for a size or a load.
    pub fn is_running(&self) -> bool {
        matches!(
            self.state(),
            RequestState::WaitingForSize | RequestState::Running
        )
    }

    /// Whether the request completed.
    pub fn is_complete(&self) -> bool {
        self.state() == RequestState::Complete
    }

    /// Whether the request failed.
    pub fn is_failed(&self) -> bool {
        self.state() == RequestState::Failed
    }

    /// Whether the request was cleared.
    pub fn is_cleared(&self) -> bool {
        self.state() == RequestState::Cleared
    }

    /// Whether [`SingleRequest::pause`] is in effect.
    pub fn is_paused(&self) -> bool {
        self.shared.inner.borrow().paused
    }

    /// Adds a listener, notified in insertion order.
    pub fn add_listener(&self, listener: Rc<dyn RequestListener<Z>>) {
        self.shared.listeners.borrow_mut().push(listener);
    }

    pub(crate) fn set_coordinator(&self, coordinator: Weak<dyn RequestCoordinator>) {
        *self.shared.coordinator.borrow_mut() = Some(coordinator);
    }

    /// Starts the request.
    ///
    /// With a size override, or a target that knows its size, the load is
    /// issued right away. A paused request remembers the call and begins on
    /// [`SingleRequest::resume`]. Beginning a completed request hands its
    /// resource to the target again.
    pub fn begin(&self) {
        self.shared.begin();
    }

    /// The target's size is known. Only the first call after
    /// [`SingleRequest::begin`] issues a load.
    pub fn on_size_ready(&self, dimensions: Dimensions) {
        self.shared.on_size_ready(dimensions);
    }

    /// Stops the request without notifying the target, releasing any
    /// delivered resource.
    pub fn cancel(&self) {
        self.shared.cancel();
    }

    /// Stops the request, tells the target to drop the result, and releases
    /// it. Clearing twice notifies the target once.
    pub fn clear(&self) {
        self.shared.clear();
    }

    /// Blocks new loads. A load already running is not cancelled.
    pub fn pause(&self) {
        self.shared.pause();
    }

    /// Lifts [`SingleRequest::pause`], beginning the request if it was begun
    /// while paused.
    pub fn resume(&self) {
        self.shared.resume();
    }
}

impl<Z: 'static> Cancellable for SingleRequest<Z> {
    fn cancel(&self) {
        SingleRequest::cancel(self);
    }
}

impl<Z: 'static> fmt::Debug for SingleRequest<Z> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleRequest")
            .field("id", &self.shared.id)
            .field("model", &self.shared.model)
            .field("state", &self.state())
            .finish()
    }
}

impl<Z: 'static> RequestShared<Z> {
    fn state(&self) -> RequestState {
        self.inner.borrow().state
    }

    fn coordinator(&self) -> Option<Rc<dyn RequestCoordinator>> {
        self.coordinator.borrow().as_ref().and_then(Weak::upgrade)
    }

    fn can_set_resource(&self) -> bool {
        self.coordinator()
            .map_or(true, |coordinator| coordinator.can_set_resource(self.id))
    }

    fn can_notify_status_changed(&self) -> bool {
        self.coordinator()
            .map_or(true, |coordinator| coordinator.can_notify_status_changed(self.id))
    }

    fn can_notify_cleared(&self) -> bool {
        self.coordinator()
            .map_or(true, |coordinator| coordinator.can_notify_cleared(self.id))
    }

    fn is_first_resource(&self) -> bool {
        self.coordinator()
            .map_or(true, |coordinator| !coordinator.is_any_resource_set())
    }

    fn size_callback(&self) -> SizeReadyCallback {
        let this = self.this.clone();
        Rc::new(move |dimensions| {
            if let Some(shared) = this.upgrade() {
                shared.on_size_ready(dimensions);
            }
        })
    }

    fn begin(&self) {
        let size_override = {
            let mut inner = self.inner.borrow_mut();
            match inner.state {
                RequestState::Created
                | RequestState::Cleared
                | RequestState::Failed
                | RequestState::Cancelled => {}
                RequestState::Paused => {
                    inner.begun_while_paused = true;
                    return;
                }
                RequestState::WaitingForSize | RequestState::Running => {
                    log::trace!("SingleRequest {:?}: already running", self.id);
                    return;
                }
                RequestState::Complete => {
                    drop(inner);
                    self.redeliver();
                    return;
                }
            }
            if inner.paused {
                inner.state = RequestState::Paused;
                inner.begun_while_paused = true;
                return;
            }
            inner.state = RequestState::WaitingForSize;
            self.options.size_override()
        };

        match size_override {
            Some(dimensions) => self.on_size_ready(dimensions),
            None => {
                let callback = self.size_callback();
                self.inner.borrow_mut().size_callback = Some(callback.clone());
                self.target.get_size(callback);
            }
        }

        let started = matches!(
            self.state(),
            RequestState::WaitingForSize | RequestState::Running
        );
        if started && self.can_notify_status_changed() {
            let placeholder = self.options.loading_placeholder();
            self.target.on_load_started(placeholder.as_deref());
        }
    }

    fn redeliver(&self) {
        let held = self
            .inner
            .borrow()
            .lease
            .as_ref()
            .map(|lease| lease.resource().clone());
        if let Some(resource) = held {
            if let Some(value) = resource.get::<Z>() {
                self.target.on_resource_ready(value, DataSource::MemoryCache);
            }
        }
    }

    fn on_size_ready(&self, dimensions: Dimensions) {
        let (spec, ticket) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state != RequestState::WaitingForSize {
                log::trace!("SingleRequest {:?}: ignoring size {dimensions}", self.id);
                return;
            }
            inner.state = RequestState::Running;
            inner.size_callback = None;
            inner.ticket += 1;
            let spec = self.options.load_spec(&self.model, dimensions);
            inner.key = Some(spec.key());
            (spec, inner.ticket)
        };
        log::debug!("SingleRequest {:?}: loading {:?} at {dimensions}", self.id, self.model);
        let callback = self.dispatcher.completion(self.id, ticket);
        let status = self
            .dispatcher
            .engine()
            .load(spec, callback, Arc::new(DirectExecutor));

        let mut inner = self.inner.borrow_mut();
        if inner.ticket == ticket && inner.state == RequestState::Running {
            inner.status = Some(status);
        } else {
            drop(inner);
            status.cancel();
        }
    }

    fn on_resource_ready(&self, lease: ResourceLease) {
        let engine = self.dispatcher.engine();
        if !lease.is::<Z>() {
            let error = LoadError::NonConforming {
                expected: std::any::type_name::<Z>(),
                actual: lease.payload_type_name(),
            };
            engine.release(lease);
            self.on_load_failed(Arc::new(error));
            return;
        }
        if !self.can_set_resource() {
            log::debug!("SingleRequest {:?}: coordinator withheld the result", self.id);
            engine.release(lease);
            self.inner.borrow_mut().state = RequestState::Complete;
            return;
        }

        let is_first_resource = self.is_first_resource();
        let resource = lease.resource().clone();
        let source = lease.data_source();
        {
            let mut inner = self.inner.borrow_mut();
            inner.state = RequestState::Complete;
            inner.lease = Some(lease);
        }
        if let Some(value) = resource.get::<Z>() {
            let listeners = self.listeners.borrow().clone();
            let mut consumed = false;
            for listener in &listeners {
                consumed |= listener.on_resource_ready(value, &self.model, source, is_first_resource);
            }
            if !consumed {
                self.target.on_resource_ready(value, source);
            }
        }
        log::debug!("SingleRequest {:?}: complete from {source:?}", self.id);
        if let Some(coordinator) = self.coordinator() {
            coordinator.on_request_success(self.id);
        }
    }

    fn on_load_failed(&self, error: Arc<LoadError>) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.state = RequestState::Failed;
            inner.status = None;
        }
        log::debug!("SingleRequest {:?}: load of {:?} failed: {error}", self.id, self.model);
        let is_first_resource = self.is_first_resource();
        let listeners = self.listeners.borrow().clone();
        let mut consumed = false;
        for listener in &listeners {
            consumed |= listener.on_load_failed(&error, &self.model, is_first_resource);
        }
        if !consumed && self.can_notify_status_changed() {
            let placeholder = self.options.failure_placeholder();
            self.target.on_load_failed(placeholder.as_deref());
        }
        if let Some(coordinator) = self.coordinator() {
            coordinator.on_request_failed(self.id);
        }
    }

    /// Moves to `state`, handing back what must be cancelled and released.
    fn stop(&self, state: RequestState) -> Option<Stopped> {
        let mut inner = self.inner.borrow_mut();
        if inner.state == state {
            return None;
        }
        inner.state = state;
        inner.begun_while_paused = false;
        Some(Stopped {
            status: inner.status.take(),
            size_callback: inner.size_callback.take(),
            lease: inner.lease.take(),
        })
    }

    fn cancel(&self) {
        if self.state() == RequestState::Cleared {
            return;
        }
        if let Some(stopped) = self.stop(RequestState::Cancelled) {
            let lease = stopped.abort(self.target.as_ref());
            if let Some(lease) = lease {
                self.dispatcher.engine().release(lease);
            }
            log::trace!("SingleRequest {:?}: cancelled", self.id);
        }
    }

    fn clear(&self) {
        let Some(stopped) = self.stop(RequestState::Cleared) else {
            return;
        };
        let lease = stopped.abort(self.target.as_ref());
        if self.can_notify_cleared() {
            let placeholder = self.options.loading_placeholder();
            self.target.on_load_cleared(placeholder.as_deref());
        }
        if let Some(lease) = lease {
            self.dispatcher.engine().release(lease);
        }
        log::trace!("SingleRequest {:?}: cleared", self.id);
    }

    fn pause(&self) {
        let pending_size = {
            let mut inner = self.inner.borrow_mut();
            inner.paused = true;
            match inner.state {
                RequestState::Created => {
                    inner.state = RequestState::Paused;
                    None
                }
                RequestState::WaitingForSize => {
                    inner.state = RequestState::Paused;
                    inner.begun_while_paused = true;
                    inner.size_callback.take()
                }
                _ => None,
            }
        };
        if let Some(callback) = pending_size {
            self.target.remove_size_callback(&callback);
        }
    }

    fn resume(&self) {
        let begin = {
            let mut inner = self.inner.borrow_mut();
            inner.paused = false;
            if inner.state != RequestState::Paused {
                return;
            }
            inner.state = RequestState::Created;
            std::mem::take(&mut inner.begun_while_paused)
        };
        if begin {
            self.begin();
        }
    }
}

impl<Z: 'static> Completable for RequestShared<Z> {
    fn complete(self: Rc<Self>, ticket: u64, result: LoadResult) {
        let current = {
            let mut inner = self.inner.borrow_mut();
            let current = inner.ticket == ticket && inner.state == RequestState::Running;
            if current {
                inner.status = None;
            }
            current
        };
        if !current {
            log::trace!("SingleRequest {:?}: dropping a stale result", self.id);
            if let Ok(lease) = result {
                self.dispatcher.engine().release(lease);
            }
            return;
        }
        match result {
            Ok(lease) => self.on_resource_ready(lease),
            Err(error) => self.on_load_failed(error),
        }
    }
}

impl<Z: 'static> Drop for RequestShared<Z> {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        if let Some(status) = inner.status.take() {
            status.cancel();
        }
        if let Some(lease) = inner.lease.take() {
            self.dispatcher.engine().release(lease);
        }
        self.dispatcher.unregister(self.id);
    }
}

struct Stopped {
    status: Option<LoadStatus>,
    size_callback: Option<SizeReadyCallback>,
    lease: Option<ResourceLease>,
}

impl Stopped {
    /// Cancels the load and forgets the size callback. The lease is left for
    /// the caller to release once the target no longer shows it.
    fn abort<Z>(self, target: &dyn Target<Z>) -> Option<ResourceLease> {
        if let Some(status) = self.status {
            status.cancel();
        }
        if let Some(callback) = self.size_callback {
            target.remove_size_callback(&callback);
        }
        self.lease
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineConfig, EngineContext, MemoryConfig};
    use lode_agents::LoadSpec;
    use lode_core::cache::DiskCacheStrategy;
    use lode_core::error::BoxError;
    use lode_core::key::Options;
    use lode_core::pipeline::{Decoder, Fetcher, LoadData, ModelLoader, Priority};
    use lode_core::resource::{BoxedResource, SimpleResource};
    use lode_core::target::{ResultSink, Sizable};
    use lode_data::MemoryBudgets;
    use lode_lanes::ExecutorSet;
    use std::borrow::Cow;
    use std::time::Duration;

    struct TextFetcher(String);

    impl Fetcher<Vec<u8>> for TextFetcher {
        fn id(&self) -> Cow<'_, str> {
            Cow::Borrowed(&self.0)
        }

        fn load_data(&self, _priority: Priority) -> Result<Vec<u8>, BoxError> {
            Ok(self.0.trim_start_matches("mem://").as_bytes().to_vec())
        }

        fn data_source(&self) -> DataSource {
            DataSource::Remote
        }
    }

    struct TextLoader;

    impl ModelLoader<String, Vec<u8>> for TextLoader {
        fn handles(&self, model: &String) -> bool {
            model.starts_with("mem://")
        }

        fn build_load_data(
            &self,
            model: &String,
            _dimensions: Dimensions,
            _options: &Options,
        ) -> Option<LoadData<Vec<u8>>> {
            Some(LoadData::new(Arc::new(TextFetcher(model.clone()))))
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

    #[derive(Default)]
    struct CountTarget {
        failed: RefCell<Vec<Option<u32>>>,
        ready: RefCell<Vec<u32>>,
    }

    impl Sizable for CountTarget {
        fn get_size(&self, callback: SizeReadyCallback) {
            callback(Dimensions::new(8, 8));
        }

        fn remove_size_callback(&self, _callback: &SizeReadyCallback) {}
    }

    impl ResultSink<u32> for CountTarget {
        fn on_load_started(&self, _placeholder: Option<&u32>) {}

        fn on_resource_ready(&self, resource: &u32, _source: DataSource) {
            self.ready.borrow_mut().push(*resource);
        }

        fn on_load_failed(&self, error_placeholder: Option<&u32>) {
            self.failed.borrow_mut().push(error_placeholder.copied());
        }

        fn on_load_cleared(&self, _placeholder: Option<&u32>) {}
    }

    fn text_context() -> EngineContext {
        let config = EngineConfig {
            memory: MemoryConfig::Explicit(MemoryBudgets {
                memory_cache_size: 1 << 16,
                pixel_pool_size: 1 << 16,
                array_pool_size: 1 << 12,
            }),
            sweep_interval_ms: None,
            disk_cache_size: None,
            default_strategy: DiskCacheStrategy::None,
            ..EngineConfig::default()
        };
        EngineContext::builder(config)
            .with_executors(ExecutorSet::direct())
            .register(|registry| {
                registry
                    .append_model_loader::<String, Vec<u8>, _>(TextLoader)
                    .append_decoder::<Vec<u8>, String, _>(Utf8Decoder);
            })
            .build()
            .expect("context builds")
    }

    #[test]
    fn a_result_of_the_wrong_type_fails_the_request_and_is_released() {
        let context = text_context();
        let dispatcher = context.dispatcher();
        let engine = context.engine().clone();

        let (sender, receiver) = flume::bounded(1);
        let spec = LoadSpec::for_model::<String>(ModelRef::new("mem://text".to_string()))
            .with_dimensions(Dimensions::new(8, 8))
            .with_strategy(DiskCacheStrategy::None);
        let _status = engine.load(
            spec,
            move |result| {
                let _ = sender.send(result);
            },
            Arc::new(DirectExecutor),
        );
        let lease = receiver
            .recv_timeout(Duration::from_secs(5))
            .expect("text load finishes")
            .expect("text loads");
        let text_key = lease.key().clone();
        assert_eq!(engine.active_count(), 1);

        let target = Rc::new(CountTarget::default());
        let request = context.request::<u32>(
            &dispatcher,
            "mem://text".to_string(),
            target.clone(),
            RequestOptions::new()
                .strategy(DiskCacheStrategy::None)
                .placeholder(1)
                .error(7),
        );
        request.begin();
        let ticket = request.shared.inner.borrow().ticket;
        assert!(request.is_running());

        request.shared.clone().complete(ticket, Ok(lease));

        assert!(request.is_failed());
        assert_eq!(*target.failed.borrow(), vec![Some(7)]);
        assert!(target.ready.borrow().is_empty());
        assert_eq!(engine.active_count(), 0);
        assert!(engine.is_memory_cached(&text_key));

        // The request's own load result arrives late and is dropped.
        dispatcher.pump();
        assert_eq!(target.failed.borrow().len(), 1);
    }
}
