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

//! # Lode Agents
//!
//! The engine that sits between requests and the decode pipeline. It
//! deduplicates concurrent loads of the same [`lode_core::key::Key`], keeps
//! resources with outstanding leases in an active set, parks unreferenced ones
//! in the memory cache, and recycles what neither tier keeps.

#![warn(missing_docs)]

pub mod active;
pub mod engine;
pub mod future;
pub mod job;
pub mod load;
pub mod metrics;
pub mod resource;
pub mod status;

pub use active::ActiveResources;
pub use engine::{Engine, EngineBuilder, ResourceMemoryCache};
pub use future::LoadFuture;
pub use job::{CallbackId, EngineJob, JobStatus, LoadCallback, LoadResult};
pub use load::LoadSpec;
pub use metrics::EngineMetrics;
pub use resource::{EngineResource, ResourceLease};
pub use status::LoadStatus;

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
