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

//! # Lode Telemetry
//!
//! Counters, gauges and histograms for the loading engine, stored in a
//! pluggable backend, plus the logger bootstrap used by binaries and tests.

#![warn(missing_docs)]

pub mod metrics;
pub mod storage;
pub mod timer;

pub use metrics::{CounterHandle, GaugeHandle, HistogramHandle, MetricsRegistry};
pub use storage::{InMemoryBackend, MetricsBackend};
pub use timer::ScopedMetricTimer;

/// Installs `env_logger` with `info` as the default filter.
///
/// Safe to call several times; only the first call has an effect. `RUST_LOG`
/// overrides the default filter.
pub fn init_logging() {
    let result = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
    if result.is_ok() {
        log::debug!("Telemetry: logger initialised.");
    }
}
