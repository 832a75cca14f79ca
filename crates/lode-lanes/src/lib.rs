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

//! # Lode Lanes
//!
//! The hot path of the loading engine. A frozen [`Registry`] knows which
//! model loaders, decoders, transcoders and encoders exist; a [`DecodeJob`]
//! walks the disk-cache and source stages for one key using the paths the
//! registry resolves, on the executors of an [`ExecutorSet`].

#![warn(missing_docs)]

pub mod decode_job;
pub mod erased;
pub mod executor;
pub mod metrics;
pub mod module;
pub mod path;
pub mod registry;
pub mod transform;
pub mod types;

pub use decode_job::{
    CancelToken, DecodeCallback, DecodeContext, DecodeJob, DecodeOutcome, DecodeSpec, Decoded,
    Stage,
};
pub use erased::{ErasedFetcher, ErasedLoadData};
pub use executor::{DirectExecutor, ExecutorSet, ExecutorSizes, SpawningExecutor, ThreadPoolExecutor};
pub use metrics::PipelineMetrics;
pub use module::{linked_modules, ComponentModule};
pub use path::{DecodePath, LoadPath};
pub use registry::{
    Registry, RegistryBuilder, BUCKET_ANIMATION, BUCKET_APPEND_ALL, BUCKET_BITMAP,
    BUCKET_BITMAP_DRAWABLE, BUCKET_PREPEND_ALL,
};
pub use transform::TransformationSet;
pub use types::{Bytes, ErasedData, ResourceType, TypeInfo};

use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
