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

//! Requests: the single-threaded layer between targets and the engine.
//!
//! A [`SingleRequest`] waits for its target's size, loads through the engine,
//! and hands the result to the target. Engine results arrive on worker
//! threads and are queued on a [`RequestDispatcher`]; they reach the request
//! when the owning thread calls [`RequestDispatcher::pump`].

mod coordinator;
mod dispatcher;
mod options;
mod single;

pub use coordinator::{RequestCoordinator, ThumbnailRequestCoordinator};
pub use dispatcher::{RequestDispatcher, RequestId};
pub use options::RequestOptions;
pub use single::{RequestListener, RequestState, SingleRequest};
