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

//! Handles for cancelling a load that is still waiting on its job.

use crate::engine::EngineInner;
use crate::job::{CallbackId, EngineJob, JobStatus};
use lode_core::target::Cancellable;
use std::fmt;
use std::sync::{Arc, Weak};

struct Binding {
    engine: Weak<EngineInner>,
    job: Arc<EngineJob>,
    callback: CallbackId,
}

/// Returned by [`crate::Engine::load`].
///
/// Loads answered from the active set or the memory cache are already
/// complete and get an unbound status. Cancelling is idempotent; cancelling
/// the last callback of a job cancels the job.
pub struct LoadStatus {
    binding: Option<Binding>,
}

impl LoadStatus {
    pub(crate) fn none() -> Self {
        Self { binding: None }
    }

    pub(crate) fn bound(engine: Weak<EngineInner>, job: Arc<EngineJob>, callback: CallbackId) -> Self {
        Self {
            binding: Some(Binding {
                engine,
                job,
                callback,
            }),
        }
    }

    /// Stops waiting. The callback will not be called unless the job already
    /// delivered.
    pub fn cancel(&self) {
        let Some(binding) = &self.binding else {
            return;
        };
        match binding.engine.upgrade() {
            Some(engine) => engine.remove_callback(&binding.job, binding.callback),
            None => {
                binding.job.remove_callback(binding.callback);
            }
        }
    }

    /// Status of the job this load waits on; `None` for cache hits.
    pub fn job_status(&self) -> Option<JobStatus> {
        self.binding.as_ref().map(|binding| binding.job.status())
    }

    /// Whether the load is waiting on a job.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }
}

impl Cancellable for LoadStatus {
    fn cancel(&self) {
        LoadStatus::cancel(self);
    }
}

impl fmt::Debug for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.binding {
            Some(binding) => f
                .debug_struct("LoadStatus")
                .field("job", &binding.job.id())
                .field("callback", &binding.callback)
                .finish(),
            None => f.write_str("LoadStatus(complete)"),
        }
    }
}
