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

//! Metric handles updated by the engine.

use lode_core::telemetry::MetricsResult;
use lode_telemetry::{CounterHandle, GaugeHandle, MetricsRegistry};

/// Handles for the `engine` and `memory_cache` namespaces.
#[derive(Debug, Clone)]
pub struct EngineMetrics {
    /// Calls to `Engine::load`.
    pub loads: CounterHandle,
    /// Loads served from the active set.
    pub active_hits: CounterHandle,
    /// Loads served from the memory cache.
    pub memory_hits: CounterHandle,
    /// New jobs.
    pub jobs_started: CounterHandle,
    /// Loads that attached to a running job.
    pub jobs_joined: CounterHandle,
    /// Jobs that ended in failure.
    pub jobs_failed: CounterHandle,
    /// Bytes held by the memory cache.
    pub memory_cache_bytes: GaugeHandle,
}

impl EngineMetrics {
    /// Registers (or re-attaches to) the engine metrics.
    pub fn new(registry: &MetricsRegistry) -> MetricsResult<Self> {
        Ok(Self {
            loads: registry.register_counter("engine", "loads", "Load requests")?,
            active_hits: registry.register_counter(
                "engine",
                "active_hits",
                "Loads served from active resources",
            )?,
            memory_hits: registry.register_counter(
                "engine",
                "memory_hits",
                "Loads served from the memory cache",
            )?,
            jobs_started: registry.register_counter("engine", "jobs_started", "Jobs started")?,
            jobs_joined: registry.register_counter(
                "engine",
                "jobs_joined",
                "Loads attached to an in-flight job",
            )?,
            jobs_failed: registry.register_counter("engine", "jobs_failed", "Jobs that failed")?,
            memory_cache_bytes: registry.register_gauge(
                "memory_cache",
                "bytes",
                "Bytes held by the memory cache",
                "bytes",
            )?,
        })
    }
}

pub(crate) fn bump(counter: Option<&CounterHandle>) {
    if let Some(counter) = counter {
        if let Err(e) = counter.increment() {
            log::warn!("Failed to update {}: {e}", counter.id());
        }
    }
}

pub(crate) fn record_bytes(gauge: Option<&GaugeHandle>, bytes: usize) {
    if let Some(gauge) = gauge {
        if let Err(e) = gauge.set(bytes as f64) {
            log::warn!("Failed to update {}: {e}", gauge.id());
        }
    }
}
