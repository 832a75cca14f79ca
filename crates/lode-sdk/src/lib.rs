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

//! # Lode SDK
//!
//! The public face of the loading engine. An [`EngineContext`] is built from
//! an [`EngineConfig`] and owns the engine, the frozen registry and the
//! buffer pools; requests created through it load models into targets on a
//! single owning thread.

#![warn(missing_docs)]

pub mod config;
pub mod context;
pub mod request;

pub use config::{ConfigError, EngineConfig, MemoryConfig};
pub use context::{EngineContext, EngineContextBuilder, MemoryCategory};
pub use request::{
    RequestCoordinator, RequestDispatcher, RequestId, RequestListener, RequestOptions,
    RequestState, SingleRequest, ThumbnailRequestCoordinator,
};

/// Everything needed to register components and issue requests.
pub mod prelude {
    pub use crate::{EngineConfig, EngineContext, RequestOptions, SingleRequest};
    pub use lode_agents::{Engine, LoadSpec, ResourceLease};
    pub use lode_core::cache::DiskCacheStrategy;
    pub use lode_core::key::{Dimensions, Options, Signature};
    pub use lode_core::pipeline::{DataSource, Decoder, Fetcher, ModelLoader, Transcoder};
    pub use lode_core::target::{ResultSink, Sizable, Target};
    pub use lode_lanes::RegistryBuilder;
}

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
