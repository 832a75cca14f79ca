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

//! Metric handles updated by decode jobs.

use lode_core::telemetry::MetricsResult;
use lode_telemetry::{CounterHandle, HistogramHandle, MetricsRegistry};

/// Handles for the `pipeline` metric namespace.
#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    /// Time spent decoding, transforming and transcoding, in milliseconds.
    pub decode_time: HistogramHandle,
    /// Loads served from the resource disk cache.
    pub resource_cache_hits: CounterHandle,
    /// Loads served from the data disk cache.
    pub data_cache_hits: CounterHandle,
    /// Fetches from the source.
    pub source_fetches: CounterHandle,
    /// Entries written to the disk cache.
    pub disk_writes: CounterHandle,
}

impl PipelineMetrics {
    /// Registers (or re-attaches to) the pipeline metrics.
    pub fn new(registry: &MetricsRegistry) -> MetricsResult<Self> {
        Ok(Self {
            decode_time: registry.register_histogram(
                "pipeline",
                "decode_time",
                "Time to decode, transform and transcode one resource",
                "ms",
                vec![1.0, 5.0, 16.0, 33.0, 100.0, 500.0],
            )?,
            resource_cache_hits: registry.register_counter(
                "pipeline",
                "resource_cache_hits",
                "Loads served from the resource disk cache",
            )?,
            data_cache_hits: registry.register_counter(
                "pipeline",
                "data_cache_hits",
                "Loads served from the data disk cache",
            )?,
            source_fetches: registry.register_counter(
                "pipeline",
                "source_fetches",
                "Data fetched from the source",
            )?,
            disk_writes: registry.register_counter(
                "pipeline",
                "disk_writes",
                "Entries written to the disk cache",
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
