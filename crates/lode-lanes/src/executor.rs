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

//! Executors the pipelines run on.

use crossbeam_channel::{Receiver, Sender};
use lode_core::executor::{Executor, Task};
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// A fixed set of named worker threads fed from one queue.
///
/// A panicking task is logged and does not take its worker down.
pub struct ThreadPoolExecutor {
    name: String,
    threads: usize,
    sender: Mutex<Option<Sender<Task>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ThreadPoolExecutor {
    /// Spawns `threads` workers (at least one) named `lode-{name}-{index}`.
    pub fn new(name: &str, threads: usize) -> std::io::Result<Self> {
        let threads = threads.max(1);
        let (sender, receiver) = crossbeam_channel::unbounded::<Task>();
        let mut workers = Vec::with_capacity(threads);
        for index in 0..threads {
            let receiver = receiver.clone();
            let thread_name = format!("lode-{name}-{index}");
            let handle = thread::Builder::new()
                .name(thread_name.clone())
                .spawn(move || worker_loop(&thread_name, receiver))?;
            workers.push(handle);
        }
        log::debug!("ThreadPoolExecutor '{name}' started with {threads} thread(s).");
        Ok(Self {
            name: name.to_string(),
            threads,
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
        })
    }

    /// Number of worker threads.
    pub fn threads(&self) -> usize {
        self.threads
    }
}

fn worker_loop(thread_name: &str, receiver: Receiver<Task>) {
    while let Ok(task) = receiver.recv() {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(task)) {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            log::error!("{thread_name}: task panicked: {message}");
        }
    }
    log::trace!("{thread_name}: queue closed, exiting.");
}

impl Executor for ThreadPoolExecutor {
    fn execute(&self, task: Task) {
        // Dropping a task may schedule onto this executor, so never under the lock.
        let rejected = match crate::lock(&self.sender).as_ref() {
            Some(sender) => sender.send(task).err().map(|error| error.into_inner()),
            None => Some(task),
        };
        if let Some(task) = rejected {
            log::warn!("ThreadPoolExecutor '{}' is shut down, task dropped.", self.name);
            drop(task);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }

    /// Closes the queue, lets queued tasks finish and joins the workers.
    ///
    /// A worker calling this on its own pool is not joined.
    fn shutdown(&self) {
        if crate::lock(&self.sender).take().is_none() {
            return;
        }
        let workers = std::mem::take(&mut *crate::lock(&self.workers));
        let current = thread::current().id();
        for worker in workers {
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                log::error!("ThreadPoolExecutor '{}': a worker panicked.", self.name);
            }
        }
        log::debug!("ThreadPoolExecutor '{}' shut down.", self.name);
    }
}

impl Drop for ThreadPoolExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Runs every task on a new named thread. Used for loads that must never wait
/// behind other loads.
pub struct SpawningExecutor {
    name: String,
    spawned: AtomicUsize,
}

impl SpawningExecutor {
    /// Creates the executor.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            spawned: AtomicUsize::new(0),
        }
    }
}

impl Executor for SpawningExecutor {
    fn execute(&self, task: Task) {
        let index = self.spawned.fetch_add(1, Ordering::Relaxed);
        let thread_name = format!("lode-{}-{index}", self.name);
        let spawned = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                if catch_unwind(AssertUnwindSafe(task)).is_err() {
                    log::error!("{thread_name}: task panicked.");
                }
            });
        if let Err(e) = spawned {
            log::error!("SpawningExecutor '{}': failed to spawn: {e}", self.name);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Runs every task inline on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectExecutor;

impl Executor for DirectExecutor {
    fn execute(&self, task: Task) {
        task();
    }

    fn name(&self) -> &str {
        "direct"
    }
}

/// Worker counts for the threaded executors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSizes {
    /// Threads fetching and decoding from the source.
    pub source: usize,
    /// Threads reading and writing the disk cache.
    pub disk_cache: usize,
    /// Threads decoding animations.
    pub animation: usize,
}

impl Default for ExecutorSizes {
    fn default() -> Self {
        let cores = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            source: cores.min(4),
            disk_cache: 1,
            animation: if cores >= 4 { 2 } else { 1 },
        }
    }
}

/// The executors one engine schedules onto.
#[derive(Clone)]
pub struct ExecutorSet {
    /// Fetching and decoding from the source.
    pub source: Arc<dyn Executor>,
    /// Disk-cache reads and writes.
    pub disk_cache: Arc<dyn Executor>,
    /// Animated resources.
    pub animation: Arc<dyn Executor>,
    /// Loads that opted out of the bounded source pool.
    pub unlimited_source: Arc<dyn Executor>,
}

impl ExecutorSet {
    /// Thread pools of the given sizes.
    pub fn threaded(sizes: ExecutorSizes) -> std::io::Result<Self> {
        Ok(Self {
            source: Arc::new(ThreadPoolExecutor::new("source", sizes.source)?),
            disk_cache: Arc::new(ThreadPoolExecutor::new("disk-cache", sizes.disk_cache)?),
            animation: Arc::new(ThreadPoolExecutor::new("animation", sizes.animation)?),
            unlimited_source: Arc::new(SpawningExecutor::new("source-unlimited")),
        })
    }

    /// Every stage runs inline on the thread that started it.
    pub fn direct() -> Self {
        Self::uniform(Arc::new(DirectExecutor))
    }

    /// One executor for everything.
    pub fn uniform(executor: Arc<dyn Executor>) -> Self {
        Self {
            source: executor.clone(),
            disk_cache: executor.clone(),
            animation: executor.clone(),
            unlimited_source: executor,
        }
    }

    /// The executor the source stage runs on.
    pub fn active_source(&self, use_unlimited: bool, use_animation: bool) -> &Arc<dyn Executor> {
        if use_unlimited {
            &self.unlimited_source
        } else if use_animation {
            &self.animation
        } else {
            &self.source
        }
    }

    /// Shuts every executor down.
    pub fn shutdown(&self) {
        self.disk_cache.shutdown();
        self.source.shutdown();
        self.animation.shutdown();
        self.unlimited_source.shutdown();
    }
}
