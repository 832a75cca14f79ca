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

//! Coordination between requests that share a target.

use super::dispatcher::RequestId;
use super::single::SingleRequest;
use std::rc::Rc;

/// Decides whether a request may touch its target.
pub trait RequestCoordinator {
    /// Whether `request` may hand its resource to the target.
    fn can_set_resource(&self, request: RequestId) -> bool;

    /// Whether `request` may report start and failure to the target.
    fn can_notify_status_changed(&self, request: RequestId) -> bool;

    /// Whether `request` may tell the target it was cleared.
    fn can_notify_cleared(&self, request: RequestId) -> bool;

    /// Whether any coordinated request already delivered a resource.
    fn is_any_resource_set(&self) -> bool;

    /// `request` delivered its resource.
    fn on_request_success(&self, request: RequestId);

    /// `request` failed.
    fn on_request_failed(&self, request: RequestId);
}

/// Runs a full-size request and a cheaper thumbnail into the same target.
///
/// The thumbnail is shown until the full request completes and never
/// replaces it afterwards; only the full request reports failures and
/// clearing.
pub struct ThumbnailRequestCoordinator<Z: 'static> {
    full: SingleRequest<Z>,
    thumbnail: SingleRequest<Z>,
}

impl<Z: 'static> ThumbnailRequestCoordinator<Z> {
    /// Pairs `full` with `thumbnail`. Both must be freshly created.
    pub fn new(full: SingleRequest<Z>, thumbnail: SingleRequest<Z>) -> Rc<Self> {
        let coordinator = Rc::new(Self { full, thumbnail });
        let weak = Rc::downgrade(&coordinator);
        coordinator.full.set_coordinator(weak.clone());
        coordinator.thumbnail.set_coordinator(weak);
        coordinator
    }

    /// The full-size request.
    pub fn full(&self) -> &SingleRequest<Z> {
        &self.full
    }

    /// The thumbnail request.
    pub fn thumbnail(&self) -> &SingleRequest<Z> {
        &self.thumbnail
    }

    /// Starts the full request, then the thumbnail unless the full request
    /// already completed.
    pub fn begin(&self) {
        if !self.full.is_running() {
            self.full.begin();
        }
        if !self.full.is_complete() && !self.thumbnail.is_running() {
            self.thumbnail.begin();
        }
    }

    /// Clears the thumbnail, then the full request.
    pub fn clear(&self) {
        self.thumbnail.clear();
        self.full.clear();
    }

    /// Pauses both requests.
    pub fn pause(&self) {
        self.full.pause();
        self.thumbnail.pause();
    }

    /// Resumes both requests.
    pub fn resume(&self) {
        self.full.resume();
        self.thumbnail.resume();
    }

    /// Whether either request delivered a resource.
    pub fn is_complete(&self) -> bool {
        self.full.is_complete() || self.thumbnail.is_complete()
    }
}

impl<Z: 'static> RequestCoordinator for ThumbnailRequestCoordinator<Z> {
    fn can_set_resource(&self, request: RequestId) -> bool {
        request == self.full.id() || !self.full.is_complete()
    }

    fn can_notify_status_changed(&self, request: RequestId) -> bool {
        request == self.full.id() && !self.is_any_resource_set()
    }

    fn can_notify_cleared(&self, request: RequestId) -> bool {
        request == self.full.id()
    }

    fn is_any_resource_set(&self) -> bool {
        self.full.is_complete() || self.thumbnail.is_complete()
    }

    fn on_request_success(&self, request: RequestId) {
        if request == self.thumbnail.id() {
            return;
        }
        if !self.thumbnail.is_complete() {
            log::trace!("ThumbnailRequestCoordinator: full request done, dropping the thumbnail");
            self.thumbnail.clear();
        }
    }

    fn on_request_failed(&self, request: RequestId) {
        if request == self.full.id() {
            log::debug!("ThumbnailRequestCoordinator: full request failed");
        }
    }
}
