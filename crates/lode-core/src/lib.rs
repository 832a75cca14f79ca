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

//! # Lode Core
//!
//! Foundational crate containing the keys, resource contracts and collaborator
//! interfaces that the rest of the loading engine is built on.
//!
//! Nothing in this crate knows how a load is scheduled or cached. It only
//! defines the "common language": what identifies a decoded artifact
//! ([`key::Key`]), what a decoded artifact is ([`resource::Resource`]), and
//! the capability traits that external codecs, fetchers and targets implement
//! ([`pipeline`], [`cache`], [`target`]).

#![warn(missing_docs)]

pub mod cache;
pub mod error;
pub mod event;
pub mod executor;
pub mod key;
pub mod model;
pub mod pipeline;
pub mod resource;
pub mod target;
pub mod telemetry;

pub use cache::{DiskCache, DiskCacheStrategy, DiskCacheWriter, TrimLevel};
pub use error::{BoxError, LoadError};
pub use event::{EngineEvent, EventBus};
pub use executor::{Executor, Task};
pub use key::{
    CacheKey, DataCacheKey, Dimensions, DiskKey, Key, OptionValue, Options, ResourceCacheKey,
    Signature,
};
pub use model::{Model, ModelRef};
pub use pipeline::{DataSource, Priority};
pub use resource::{BoxedResource, ErasedResource, Resource, SimpleResource};
pub use target::{Cancellable, ResultSink, Sizable, Target};
