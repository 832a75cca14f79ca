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

//! Capabilities of the thing a request renders into.
//!
//! A target is split into two capabilities: [`Sizable`] reports how large the
//! result should be, [`ResultSink`] receives placeholders and results. Anything
//! implementing both is a [`Target`]. Targets live on the request's owning
//! thread, so none of these traits require `Send`.

use crate::key::Dimensions;
use crate::pipeline::DataSource;
use std::rc::Rc;

/// Called once the target knows its size.
pub type SizeReadyCallback = Rc<dyn Fn(Dimensions)>;

/// Reports the size a result should be decoded at.
pub trait Sizable {
    /// Calls `callback` with the size, now or later.
    ///
    /// Implementations that already know their size may call back
    /// synchronously from inside this method.
    fn get_size(&self, callback: SizeReadyCallback);

    /// Forgets a callback registered with [`Sizable::get_size`] that has not
    /// fired yet. Callbacks are compared by pointer.
    fn remove_size_callback(&self, callback: &SizeReadyCallback);
}

/// Receives placeholders and results of a request.
pub trait ResultSink<Z> {
    /// The load started; `placeholder` is shown until it finishes.
    fn on_load_started(&self, placeholder: Option<&Z>);

    /// The result is available.
    fn on_resource_ready(&self, resource: &Z, source: DataSource);

    /// The load failed; `error_placeholder` replaces whatever was shown.
    fn on_load_failed(&self, error_placeholder: Option<&Z>);

    /// The request was cleared; any previously delivered result must not be
    /// used anymore.
    fn on_load_cleared(&self, placeholder: Option<&Z>);
}

/// Something in flight that can be abandoned.
///
/// Cancelling is not an error: nothing is reported as failed, and cancelling
/// twice is a no-op.
pub trait Cancellable {
    /// Stops waiting for the result.
    fn cancel(&self);
}

/// A full request target.
pub trait Target<Z>: Sizable + ResultSink<Z> {}

impl<Z, T: Sizable + ResultSink<Z> + ?Sized> Target<Z> for T {}

/// A [`Sizable`] that always reports the same dimensions, synchronously.
#[derive(Debug, Clone, Copy)]
pub struct FixedSize(pub Dimensions);

impl Sizable for FixedSize {
    fn get_size(&self, callback: SizeReadyCallback) {
        callback(self.0);
    }

    fn remove_size_callback(&self, _callback: &SizeReadyCallback) {}
}
