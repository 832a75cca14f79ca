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

//! The task-execution abstraction used for pipelines and callback delivery.

/// A unit of work handed to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks, possibly on another thread.
///
/// Tasks submitted to the same executor from the same thread start in
/// submission order; there is no ordering guarantee across executors.
pub trait Executor: Send + Sync {
    /// Schedules `task`.
    fn execute(&self, task: Task);

    /// A short name used in log messages.
    fn name(&self) -> &str {
        "executor"
    }

    /// Stops accepting tasks and waits for running ones. Executors without
    /// threads of their own do nothing.
    fn shutdown(&self) {}
}
