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

//! Awaitable loads.

use crate::engine::{Engine, EngineInner};
use crate::job::LoadResult;
use crate::load::LoadSpec;
use crate::status::LoadStatus;
use lode_core::error::LoadError;
use lode_lanes::DirectExecutor;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::oneshot;

impl Engine {
    /// Loads `spec` and resolves with the lease.
    ///
    /// Dropping the future before it resolves cancels the load. A lease that
    /// arrives after that is released rather than leaked.
    pub fn load_async(&self, spec: LoadSpec) -> LoadFuture {
        let (sender, receiver) = oneshot::channel::<LoadResult>();
        let engine = Arc::downgrade(&self.inner);
        let on_result = engine.clone();
        let status = self.load(
            spec,
            move |result| {
                if let Err(Ok(lease)) = sender.send(result) {
                    if let Some(inner) = on_result.upgrade() {
                        inner.release(lease);
                    }
                }
            },
            Arc::new(DirectExecutor),
        );
        LoadFuture {
            receiver,
            status,
            engine,
            done: false,
        }
    }
}

/// Resolves when a load started by [`Engine::load_async`] finishes.
///
/// Resolves with [`LoadError::Cancelled`] when the engine drops the load
/// without delivering, for example on shutdown.
#[must_use = "futures do nothing unless polled; dropping this cancels the load"]
pub struct LoadFuture {
    receiver: oneshot::Receiver<LoadResult>,
    status: LoadStatus,
    engine: Weak<EngineInner>,
    done: bool,
}

impl LoadFuture {
    /// The underlying status, for inspection.
    pub fn status(&self) -> &LoadStatus {
        &self.status
    }
}

impl Future for LoadFuture {
    type Output = LoadResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let polled = Pin::new(&mut self.receiver).poll(cx);
        match polled {
            Poll::Pending => Poll::Pending,
            Poll::Ready(received) => {
                self.done = true;
                Poll::Ready(received.unwrap_or_else(|_| Err(Arc::new(LoadError::Cancelled))))
            }
        }
    }
}

impl Drop for LoadFuture {
    fn drop(&mut self) {
        if self.done {
            return;
        }
        self.status.cancel();
        self.receiver.close();
        if let Ok(Ok(lease)) = self.receiver.try_recv() {
            match self.engine.upgrade() {
                Some(inner) => inner.release(lease),
                None => drop(lease),
            }
        }
    }
}
