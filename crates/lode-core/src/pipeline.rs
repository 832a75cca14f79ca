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

//! Capability traits for the pluggable load pipeline.
//!
//! A load flows through these stages:
//!
//! ```text
//! Model --ModelLoader--> Fetcher --load_data--> D --Decoder--> Resource<R>
//!       --Transformation*--> Resource<R> --Transcoder--> Resource<Z>
//! ```
//!
//! Source data `D` may be written to the disk cache with an [`Encoder`], and the
//! transformed `Resource<R>` with a [`ResourceEncoder`]. None of these traits
//! knows about scheduling or caching; the pipeline registry and decode job wire
//! them together.

use crate::error::BoxError;
use crate::key::{Dimensions, Options};
use crate::resource::{BoxedResource, Resource};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::io::Write;
use std::marker::PhantomData;
use std::sync::Arc;

/// Scheduling priority passed to fetchers.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Priority {
    /// Needed right now.
    Immediate,
    /// Visible soon.
    High,
    /// The default.
    #[default]
    Normal,
    /// Prefetching.
    Low,
}

/// Where the data for a delivered resource came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataSource {
    /// Local storage (file system, bundled assets).
    Local,
    /// A remote source (network).
    Remote,
    /// The disk cache entry holding unmodified source data.
    DataDiskCache,
    /// The disk cache entry holding a decoded and transformed resource.
    ResourceDiskCache,
    /// The in-memory caches (active resources or memory cache).
    MemoryCache,
}

/// Produces raw data of type `D` for one model.
///
/// Fetchers are driven from executor threads; [`Fetcher::cancel`] may be called
/// from any other thread while [`Fetcher::load_data`] is running.
pub trait Fetcher<D>: Send + Sync {
    /// Identity of the fetched data, used as the disk-cache source id.
    fn id(&self) -> Cow<'_, str>;

    /// Blocks until the data is available or loading failed.
    fn load_data(&self, priority: Priority) -> Result<D, BoxError>;

    /// Releases anything held by the last [`Fetcher::load_data`] call.
    fn cleanup(&self) {}

    /// Best-effort request to abort an in-progress [`Fetcher::load_data`].
    fn cancel(&self) {}

    /// Where the data comes from.
    fn data_source(&self) -> DataSource;
}

/// What a model loader produces for one model: a fetcher plus the cache ids
/// under which its data may also be stored.
pub struct LoadData<D> {
    /// The fetcher that will produce the data.
    pub fetcher: Arc<dyn Fetcher<D>>,
    /// Additional source ids to look up in the data disk cache.
    pub alternate_ids: Vec<String>,
}

impl<D> LoadData<D> {
    /// Creates load data with no alternate ids.
    pub fn new(fetcher: Arc<dyn Fetcher<D>>) -> Self {
        Self {
            fetcher,
            alternate_ids: Vec::new(),
        }
    }

    /// The primary source id.
    pub fn source_id(&self) -> String {
        self.fetcher.id().into_owned()
    }
}

/// Turns a model of type `M` into a fetcher of data `D`.
pub trait ModelLoader<M, D>: Send + Sync {
    /// Returns `true` if this loader may be able to load `model`.
    fn handles(&self, model: &M) -> bool;

    /// Builds the fetcher for `model`, or `None` if it cannot after all.
    fn build_load_data(
        &self,
        model: &M,
        dimensions: Dimensions,
        options: &Options,
    ) -> Option<LoadData<D>>;
}

/// Decodes raw data `D` into a resource of `R`.
pub trait Decoder<D, R>: Send + Sync {
    /// Cheaply checks whether this decoder understands `data`.
    fn handles(&self, data: &D, options: &Options) -> Result<bool, BoxError>;

    /// Decodes `data`, targeting `dimensions`. `Ok(None)` means "declined".
    fn decode(
        &self,
        data: &D,
        dimensions: Dimensions,
        options: &Options,
    ) -> Result<Option<BoxedResource<R>>, BoxError>;
}

/// Transforms a decoded resource (cropping, rounding...).
///
/// The identifier contributes to the [`crate::key::Key`], so it must encode
/// every parameter that changes the output.
pub trait Transformation<R>: Send + Sync {
    /// Stable identifier including parameters, e.g. `"RoundedCorners(8)"`.
    fn id(&self) -> String;

    /// Transforms `resource` to fit `dimensions`.
    ///
    /// Returns `Ok(None)` when the input is already correct. When a new resource
    /// is returned the caller recycles the original.
    fn transform(
        &self,
        resource: &dyn Resource<R>,
        dimensions: Dimensions,
    ) -> Result<Option<BoxedResource<R>>, BoxError>;
}

/// Writes source data `D` to a disk-cache sink.
pub trait Encoder<D>: Send + Sync {
    /// Encodes `data`; returns `false` if nothing usable was written.
    fn encode(&self, data: &D, sink: &mut dyn Write, options: &Options) -> bool;
}

/// Which version of a resource a [`ResourceEncoder`] wants to persist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EncodeStrategy {
    /// Persist the unmodified source data.
    Source,
    /// Persist the decoded and transformed resource.
    Transformed,
    /// Do not persist anything.
    None,
}

/// Writes a decoded resource to a disk-cache sink.
pub trait ResourceEncoder<R>: Send + Sync {
    /// Encodes `resource`; returns `false` if nothing usable was written.
    fn encode(&self, resource: &dyn Resource<R>, sink: &mut dyn Write, options: &Options) -> bool;

    /// Which version this encoder persists for the given options.
    fn encode_strategy(&self, options: &Options) -> EncodeStrategy;
}

/// Converts a resource of `R` into a resource of `Z`.
pub trait Transcoder<R, Z>: Send + Sync {
    /// Transcodes, taking ownership of the input.
    fn transcode(
        &self,
        resource: BoxedResource<R>,
        options: &Options,
    ) -> Result<BoxedResource<Z>, BoxError>;
}

/// The identity transcoder, used when the resource type is already the
/// requested type.
pub struct UnitTranscoder<R>(PhantomData<fn() -> R>);

impl<R> UnitTranscoder<R> {
    /// Creates the identity transcoder.
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<R> Default for UnitTranscoder<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> Transcoder<R, R> for UnitTranscoder<R> {
    fn transcode(
        &self,
        resource: BoxedResource<R>,
        _options: &Options,
    ) -> Result<BoxedResource<R>, BoxError> {
        Ok(resource)
    }
}
