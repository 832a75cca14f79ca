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

//! One in-flight, deduplicated load.

use crate::resource::ResourceLease;
use lode_core::error::LoadError;
use lode_core::executor::Executor;
use lode_core::key::Key;
use lode_lanes::CancelToken;
use std::fmt;
use std::sync::{Arc, Mutex};

/// What a load callback receives.
pub type LoadResult = Result<ResourceLease, Arc<LoadError>>;

/// Receives the result of one load, exactly once.
pub type LoadCallback = Box<dyn FnOnce(LoadResult) + Send + 'static>;

/// Identifies one callback registered on a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u64);

impl CallbackId {
    /// The callback a job is created with.
    pub(crate) const FIRST: CallbackId = CallbackId(0);
}

/// Where a job is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Created, not yet submitted.
    Pending,
    /// Submitted to an executor.
    Running,
    /// A resource was delivered.
    Done,
    /// Every attempt failed.
    Failed,
    /// The last callback went away before the job finished.
    Cancelled,
}

impl JobStatus {
    /// Whether the job can no longer take callbacks.
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Cancelled)
    }
}

pub(crate) struct PendingCallback {
    pub(crate) callback: LoadCallback,
    pub(crate) executor: Arc<dyn Executor>,
}

struct JobState {
    status: JobStatus,
    callbacks: Vec<(CallbackId, PendingCallback)>,
    next_callback: u64,
}

/// The unit of work shared by every load of one key.
///
/// Callbacks are kept in registration order and notified in that order, each
/// on the executor it was registered with.
pub struct EngineJob {
    id: u64,
    key: Key,
    memory_cacheable: bool,
    only_retrieve_from_cache: bool,
    cancel: CancelToken,
    state: Mutex<JobState>,
}

impl EngineJob {
    /// Creates a pending job waiting on `first`, registered as
    /// [`CallbackId::FIRST`].
    pub(crate) fn new(
        id: u64,
        key: Key,
        memory_cacheable: bool,
        only_retrieve_from_cache: bool,
        first: PendingCallback,
    ) -> Self {
        Self {
            id,
            key,
            memory_cacheable,
            only_retrieve_from_cache,
            cancel: CancelToken::new(),
            state: Mutex::new(JobState {
                status: JobStatus::Pending,
                callbacks: vec![(CallbackId::FIRST, first)],
                next_callback: 1,
            }),
        }
    }

    /// Unique id within the engine.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The key being loaded.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Whether the result goes to the active set and memory cache.
    pub fn is_memory_cacheable(&self) -> bool {
        self.memory_cacheable
    }

    /// Whether the job may only read the disk cache.
    pub fn only_retrieve_from_cache(&self) -> bool {
        self.only_retrieve_from_cache
    }

    /// Current status.
    pub fn status(&self) -> JobStatus {
        crate::lock(&self.state).status
    }

    /// Number of callbacks still waiting.
    pub fn callback_count(&self) -> usize {
        crate::lock(&self.state).callbacks.len()
    }

    pub(crate) fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Adds a callback. Once the job has finished the callback is handed
    /// back.
    pub(crate) fn add_callback(
        &self,
        pending: PendingCallback,
    ) -> Result<CallbackId, PendingCallback> {
        let mut state = crate::lock(&self.state);
        if state.status.is_finished() {
            return Err(pending);
        }
        let id = CallbackId(state.next_callback);
        state.next_callback += 1;
        state.callbacks.push((id, pending));
        Ok(id)
    }

    /// Removes a callback. Removing the last one cancels the job; returns
    /// whether that happened.
    pub(crate) fn remove_callback(&self, id: CallbackId) -> bool {
        let mut state = crate::lock(&self.state);
        let before = state.callbacks.len();
        state.callbacks.retain(|(known, _)| *known != id);
        if state.callbacks.len() == before || !state.callbacks.is_empty() {
            return false;
        }
        if state.status.is_finished() {
            return false;
        }
        state.status = JobStatus::Cancelled;
        drop(state);
        self.cancel.cancel();
        log::debug!("EngineJob {} ({}): cancelled, no callbacks left", self.id, self.key);
        true
    }

    /// Cancels regardless of waiting callbacks, which are dropped unnotified.
    pub(crate) fn cancel_all(&self) {
        let mut state = crate::lock(&self.state);
        if state.status.is_finished() {
            return;
        }
        state.status = JobStatus::Cancelled;
        state.callbacks.clear();
        drop(state);
        self.cancel.cancel();
    }

    pub(crate) fn mark_running(&self) {
        let mut state = crate::lock(&self.state);
        if state.status == JobStatus::Pending {
            state.status = JobStatus::Running;
        }
    }

    /// Moves to `status` and takes the callbacks to notify. A cancelled job
    /// keeps its status and has nobody to notify.
    pub(crate) fn finish(&self, status: JobStatus) -> Vec<PendingCallback> {
        let mut state = crate::lock(&self.state);
        if state.status == JobStatus::Cancelled {
            return Vec::new();
        }
        state.status = status;
        std::mem::take(&mut state.callbacks)
            .into_iter()
            .map(|(_, pending)| pending)
            .collect()
    }
}

impl fmt::Debug for EngineJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = crate::lock(&self.state);
        f.debug_struct("EngineJob")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("status", &state.status)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}
