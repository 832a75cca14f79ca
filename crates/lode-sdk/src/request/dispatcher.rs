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

//! Moves engine results onto the thread that owns the requests.

use ahash::AHashMap;
use lode_agents::{Engine, LoadResult};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Identifies a request within its dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

/// A request that can take an engine result.
pub(crate) trait Completable {
    fn complete(self: Rc<Self>, ticket: u64, result: LoadResult);
}

struct Completion {
    request: RequestId,
    ticket: u64,
    result: LoadResult,
}

/// Queues engine results and hands them to their requests when
/// [`RequestDispatcher::pump`] runs on the owning thread.
///
/// Requests, their targets and the dispatcher all live on that one thread;
/// only the queue's sender crosses threads.
pub struct RequestDispatcher {
    owner: ThreadId,
    engine: Engine,
    sender: flume::Sender<Completion>,
    inbox: flume::Receiver<Completion>,
    requests: RefCell<AHashMap<RequestId, Weak<dyn Completable>>>,
    next_id: Cell<u64>,
}

impl RequestDispatcher {
    /// A dispatcher owned by the calling thread.
    pub fn new(engine: Engine) -> Rc<Self> {
        let (sender, inbox) = flume::unbounded();
        Rc::new(Self {
            owner: thread::current().id(),
            engine,
            sender,
            inbox,
            requests: RefCell::new(AHashMap::new()),
            next_id: Cell::new(1),
        })
    }

    /// The engine requests load from.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    fn assert_owner(&self) {
        assert_eq!(
            thread::current().id(),
            self.owner,
            "RequestDispatcher used off its owning thread"
        );
    }

    pub(crate) fn register(&self, request: Weak<dyn Completable>) -> RequestId {
        self.assert_owner();
        let id = RequestId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.requests.borrow_mut().insert(id, request);
        id
    }

    pub(crate) fn unregister(&self, id: RequestId) {
        self.requests.borrow_mut().remove(&id);
    }

    /// A callback for one engine load that queues its result for `request`.
    pub(crate) fn completion(
        &self,
        request: RequestId,
        ticket: u64,
    ) -> impl FnOnce(LoadResult) + Send + 'static {
        let sender = self.sender.clone();
        move |result| {
            if sender
                .send(Completion {
                    request,
                    ticket,
                    result,
                })
                .is_err()
            {
                log::debug!("RequestDispatcher: gone, dropping the result for {request:?}");
            }
        }
    }

    /// Number of results waiting to be pumped.
    pub fn pending(&self) -> usize {
        self.inbox.len()
    }

    /// Delivers every queued result, in arrival order. Returns how many were
    /// handled.
    ///
    /// # Panics
    ///
    /// When called from a thread other than the one that created the
    /// dispatcher.
    pub fn pump(&self) -> usize {
        self.assert_owner();
        let mut handled = 0;
        while let Ok(completion) = self.inbox.try_recv() {
            self.deliver(completion);
            handled += 1;
        }
        handled
    }

    /// Waits up to `timeout` for a result, then pumps. Returns how many
    /// results were handled.
    pub fn pump_timeout(&self, timeout: Duration) -> usize {
        self.assert_owner();
        match self.inbox.recv_timeout(timeout) {
            Ok(completion) => {
                self.deliver(completion);
                1 + self.pump()
            }
            Err(_) => 0,
        }
    }

    fn deliver(&self, completion: Completion) {
        let Completion {
            request,
            ticket,
            result,
        } = completion;
        let target = self
            .requests
            .borrow()
            .get(&request)
            .and_then(Weak::upgrade);
        match target {
            Some(target) => target.complete(ticket, result),
            None => {
                log::trace!("RequestDispatcher: {request:?} is gone, releasing its result");
                if let Ok(lease) = result {
                    self.engine.release(lease);
                }
            }
        }
    }
}

impl fmt::Debug for RequestDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("owner", &self.owner)
            .field("requests", &self.requests.borrow().len())
            .field("pending", &self.pending())
            .finish()
    }
}
